//! docwatch library.
//!
//! Decides, per file changed by a commit, whether generated API
//! documentation must be regenerated, and keeps the state that makes
//! repeated passes safe.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod watcher;

pub use error::Error;
