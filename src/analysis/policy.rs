//! Point values, bands and confidences used by the scorer.
//!
//! Every constant is configurable through the `[scoring]` table of the
//! config file; [`ScoringPolicy::default`] holds the stock values.

use serde::{Deserialize, Serialize};

use super::scorer::Level;

/// Extra points once the hunk count exceeds `above`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HunkBand {
    pub above: usize,
    pub points: i64,
}

/// Recommendation for scores at or above `min_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min_score: u32,
    pub confidence: f64,
    pub priority: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    // text flags
    pub structural_points: i64,
    pub semantic_points: i64,
    pub comments_points: i64,
    pub whitespace_points: i64,

    // structural delta
    pub namespace_points: i64,
    pub type_churn_points: i64,
    pub extends_points: i64,
    pub implements_points: i64,
    pub method_churn_points: i64,
    pub method_modified_points: i64,
    pub property_churn_points: i64,
    pub property_modified_points: i64,
    pub modifier_points: i64,
    pub interface_points: i64,
    pub function_points: i64,
    pub import_points: i64,
    pub major_severity_points: i64,
    pub minor_severity_points: i64,
    pub minimal_severity_points: i64,

    // documented-symbol bias
    pub documented_public_bonus: i64,
    pub undocumented_private_penalty: i64,

    // recommendation
    pub skip_confidence: f64,
    pub relevance_boost: f64,
    pub confidence_cap: f64,
    pub irrelevant_confidence: f64,
    pub formatting_confidence: f64,
    pub interface_confidence: f64,

    // Tables last so the struct serializes to valid TOML.
    /// Checked in order; the first matching band wins.
    pub hunk_bands: Vec<HunkBand>,
    /// Checked in order; the first band the score reaches wins.
    pub score_bands: Vec<ScoreBand>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            structural_points: 40,
            semantic_points: 25,
            comments_points: 5,
            whitespace_points: 1,
            hunk_bands: vec![
                HunkBand { above: 10, points: 15 },
                HunkBand { above: 5, points: 10 },
                HunkBand { above: 1, points: 5 },
            ],
            namespace_points: 20,
            type_churn_points: 15,
            extends_points: 20,
            implements_points: 15,
            method_churn_points: 10,
            method_modified_points: 8,
            property_churn_points: 5,
            property_modified_points: 3,
            modifier_points: 15,
            interface_points: 25,
            function_points: 20,
            import_points: 10,
            major_severity_points: 30,
            minor_severity_points: 15,
            minimal_severity_points: 5,
            documented_public_bonus: 10,
            undocumented_private_penalty: 10,
            score_bands: vec![
                ScoreBand {
                    min_score: 70,
                    confidence: 0.95,
                    priority: Level::High,
                },
                ScoreBand {
                    min_score: 40,
                    confidence: 0.75,
                    priority: Level::Medium,
                },
                ScoreBand {
                    min_score: 20,
                    confidence: 0.50,
                    priority: Level::Low,
                },
            ],
            skip_confidence: 0.85,
            relevance_boost: 0.2,
            confidence_cap: 0.95,
            irrelevant_confidence: 0.90,
            formatting_confidence: 0.95,
            interface_confidence: 0.90,
        }
    }
}

impl ScoringPolicy {
    pub fn hunk_points(&self, hunks: usize) -> i64 {
        self.hunk_bands
            .iter()
            .find(|band| hunks > band.above)
            .map_or(0, |band| band.points)
    }

    pub fn band_for(&self, score: u32) -> Option<&ScoreBand> {
        self.score_bands.iter().find(|band| score >= band.min_score)
    }
}
