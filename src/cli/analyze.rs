//! Score the change between two files without touching the store.

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::analysis::{
    classify, compare, parse, score_or_skip, ScoringContext, ScoringPolicy, SignificanceResult,
    StructuralDelta, TextDiffResult,
};
use crate::config::Config;
use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub diff: TextDiffResult,
    pub delta: StructuralDelta,
    pub result: SignificanceResult,
}

/// Classify, compare and score `old` against `new`.
pub fn analyze_sources(policy: &ScoringPolicy, old: &str, new: &str) -> AnalyzeOutput {
    let diff = classify(old, new);
    let delta = match (parse(old), parse(new)) {
        (Ok(old), Ok(new)) => compare(&old, &new),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Parse failed, scoring text diff only");
            StructuralDelta::default()
        }
    };
    let result = score_or_skip(policy, &diff, &delta, &ScoringContext::default());
    AnalyzeOutput {
        diff,
        delta,
        result,
    }
}

/// Run the analyze command.
pub fn run(repo: &Path, old: &Path, new: &Path, json: bool) -> Result<(), Error> {
    let config = Config::load(repo)?;
    let old_source = std::fs::read_to_string(old).map_err(|e| Error::read(old, e))?;
    let new_source = std::fs::read_to_string(new).map_err(|e| Error::read(new, e))?;

    let output = analyze_sources(&config.scoring, &old_source, &new_source);
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let result = &output.result;
    let rec = &result.recommendation;
    println!("Score:      {}", result.score);
    println!(
        "Change:     {} (impact {}, relevance {})",
        result.classification.primary_type,
        result.classification.impact_level,
        result.classification.documentation_relevance
    );
    println!("Severity:   {}", output.delta.severity);
    println!(
        "Decision:   {} (confidence {:.2}, priority {})",
        if rec.should_regenerate {
            "regenerate"
        } else {
            "skip"
        },
        rec.confidence,
        rec.priority
    );
    for reason in &rec.reasons {
        println!("  - {}", reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_sources() {
        let output = analyze_sources(
            &ScoringPolicy::default(),
            "<?php class Foo {}",
            "<?php class Foo implements Bar {}",
        );
        assert!(output.diff.structural_changes);
        assert!(output.result.recommendation.should_regenerate);
    }

    #[test]
    fn test_unparseable_side_still_scores_text() {
        let output = analyze_sources(
            &ScoringPolicy::default(),
            "<?php\nfunction f() {\n    return 1;\n}\n",
            "<?php\nfunction f() {\n    return (1;\n}\n",
        );
        assert!(!output.delta.has_changes());
        assert!(output.diff.semantic_changes);
    }
}
