//! Commit watching and per-pass orchestration.

pub mod docgen;
pub mod git;
pub mod pass;
pub mod poll;

pub use docgen::{DocGenerator, GeneratedDoc, OutlineGenerator, TokenUsage};
pub use git::{CommitSummary, GitCli, GitRepo};
pub use pass::{run_pass, FileOutcome, PassContext, PassReport};
pub use poll::run_watch;
