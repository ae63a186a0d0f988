//! Change-significance pipeline.
//!
//! `text_diff` classifies the raw line diff, `parser` reduces each side to a
//! [`StructuralSummary`], `structural_diff` compares the summaries and
//! `scorer` turns both signals into a [`SignificanceResult`].

pub mod parser;
pub mod policy;
pub mod scorer;
pub mod structural_diff;
pub mod summary;
pub mod text_diff;

pub use parser::parse;
pub use policy::ScoringPolicy;
pub use scorer::{
    score, score_in_context, score_or_skip, score_payload, Level, PrimaryType, ScoringContext,
    SignificanceResult,
};
pub use structural_diff::{compare, Severity, StructuralDelta};
pub use summary::StructuralSummary;
pub use text_diff::{classify, TextDiffResult};
