//! Fuse text and structural signals into a regenerate/skip recommendation.
//!
//! Scoring is additive and clamped to 0..=100. The recommendation is then
//! produced by an ordered list of pure rules ([`RULES`]): the threshold band
//! first, then the overrides, each appending a reason when it fires.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::policy::ScoringPolicy;
use super::structural_diff::{Severity, StructuralDelta};
use super::text_diff::TextDiffResult;
use crate::error::Error;

/// Ordered none < low < medium < high scale used for impact, relevance and
/// priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::None => write!(f, "none"),
            Level::Low => write!(f, "low"),
            Level::Medium => write!(f, "medium"),
            Level::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryType {
    Formatting,
    Documentation,
    Structural,
    Semantic,
    Functional,
    Dependencies,
    #[default]
    Minor,
}

impl std::fmt::Display for PrimaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrimaryType::Formatting => "formatting",
            PrimaryType::Documentation => "documentation",
            PrimaryType::Structural => "structural",
            PrimaryType::Semantic => "semantic",
            PrimaryType::Functional => "functional",
            PrimaryType::Dependencies => "dependencies",
            PrimaryType::Minor => "minor",
        };
        write!(f, "{}", s)
    }
}

/// Kinds of change found in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Whitespace,
    Comments,
    Structural,
    Semantic,
    Namespace,
    Types,
    Members,
    Interfaces,
    Functions,
    Imports,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub primary_type: PrimaryType,
    pub categories: BTreeSet<ChangeCategory>,
    pub impact_level: Level,
    pub documentation_relevance: Level,
}

impl Classification {
    /// Record a category; levels only ever go up.
    fn raise(&mut self, category: ChangeCategory, impact: Level, relevance: Level) {
        self.categories.insert(category);
        self.impact_level = self.impact_level.max(impact);
        self.documentation_relevance = self.documentation_relevance.max(relevance);
    }

    pub fn touches_interfaces_or_namespace(&self) -> bool {
        self.categories.contains(&ChangeCategory::Interfaces)
            || self.categories.contains(&ChangeCategory::Namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recommendation {
    pub should_regenerate: bool,
    pub confidence: f64,
    pub priority: Level,
    /// One entry per rule that fired, in evaluation order.
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub score: u32,
    pub classification: Classification,
    pub recommendation: Recommendation,
}

impl SignificanceResult {
    /// Skip with zero confidence for input that could not be scored.
    pub fn cannot_score(reason: impl std::fmt::Display) -> Self {
        Self {
            recommendation: Recommendation {
                reasons: vec![format!("cannot score: {}", reason)],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Documented-symbol registry view for one file.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// Symbols that already have generated documentation.
    pub documented: BTreeSet<String>,
    /// Private members on either side of the change.
    pub private: BTreeSet<String>,
}

/// A recommendation rule.
pub type Rule = fn(&ScoringPolicy, SignificanceResult) -> SignificanceResult;

/// Rules in application order.
pub const RULES: &[Rule] = &[
    threshold_rule,
    relevance_high_rule,
    relevance_none_rule,
    formatting_rule,
    interface_rule,
];

/// Score with the stock policy and no registry context.
pub fn score(diff: &TextDiffResult, delta: &StructuralDelta) -> SignificanceResult {
    score_in_context(
        &ScoringPolicy::default(),
        diff,
        delta,
        &ScoringContext::default(),
    )
}

pub fn score_in_context(
    policy: &ScoringPolicy,
    diff: &TextDiffResult,
    delta: &StructuralDelta,
    ctx: &ScoringContext,
) -> SignificanceResult {
    // A whitespace-only text change cannot carry a structural one.
    let empty = StructuralDelta::default();
    let delta = if diff.whitespace_only { &empty } else { delta };

    let mut reasons = Vec::new();
    let mut points =
        text_points(policy, diff) + context_points(policy, delta, ctx, &mut reasons);
    if !diff.whitespace_only {
        points += delta_points(policy, delta);
    }

    let result = SignificanceResult {
        score: points.clamp(0, 100) as u32,
        classification: classify_change(diff, delta),
        recommendation: Recommendation {
            reasons,
            ..Default::default()
        },
    };
    RULES.iter().fold(result, |acc, rule| rule(policy, acc))
}

/// Validate both inputs, scoring them or returning a zero-confidence skip.
pub fn score_or_skip(
    policy: &ScoringPolicy,
    diff: &TextDiffResult,
    delta: &StructuralDelta,
    ctx: &ScoringContext,
) -> SignificanceResult {
    match diff.validate().and_then(|_| delta.validate()) {
        Ok(()) => score_in_context(policy, diff, delta, ctx),
        Err(e) => SignificanceResult::cannot_score(e),
    }
}

/// JSON input for [`score_payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePayload {
    pub diff: TextDiffResult,
    pub delta: StructuralDelta,
}

/// Score a serialized `{ "diff": .., "delta": .. }` payload.
pub fn score_payload(policy: &ScoringPolicy, payload: &str) -> SignificanceResult {
    match serde_json::from_str::<ScorePayload>(payload) {
        Ok(p) => score_or_skip(policy, &p.diff, &p.delta, &ScoringContext::default()),
        Err(e) => {
            SignificanceResult::cannot_score(Error::input(format!("malformed payload: {}", e)))
        }
    }
}

// ========== Points ==========

fn text_points(policy: &ScoringPolicy, diff: &TextDiffResult) -> i64 {
    let mut points = 0;
    if diff.structural_changes {
        points += policy.structural_points;
    }
    if diff.semantic_changes {
        points += policy.semantic_points;
    }
    if diff.comments_only {
        points += policy.comments_points;
    }
    if diff.whitespace_only {
        points += policy.whitespace_points;
    }
    points + policy.hunk_points(diff.change_counts.total)
}

/// Delta points plus the severity bonus. Callers skip this for
/// whitespace-only diffs.
fn delta_points(policy: &ScoringPolicy, delta: &StructuralDelta) -> i64 {
    let count = |n: usize| n as i64;
    let mut points = 0;

    if delta.namespace_changed {
        points += policy.namespace_points;
    }

    points += count(delta.types.churn()) * policy.type_churn_points;
    for ty in delta.types.modified.values() {
        if ty.extends_change.is_some() {
            points += policy.extends_points;
        }
        if ty.implements_changes.has_changes() {
            points += policy.implements_points;
        }
        if ty.modifier_change.is_some() {
            points += policy.modifier_points;
        }
        points += count(ty.methods_changes.churn()) * policy.method_churn_points;
        points += count(ty.methods_changes.modified.len()) * policy.method_modified_points;
        points += count(ty.properties_changes.churn()) * policy.property_churn_points;
        points += count(ty.properties_changes.modified.len()) * policy.property_modified_points;
    }

    if delta.interfaces.has_changes() {
        points += policy.interface_points;
    }
    if delta.functions.has_changes() {
        points += policy.function_points;
    }
    if delta.imports.has_changes() {
        points += policy.import_points;
    }

    points
        + match delta.severity {
            Severity::Major => policy.major_severity_points,
            Severity::Minor => policy.minor_severity_points,
            Severity::Minimal => policy.minimal_severity_points,
        }
}

fn context_points(
    policy: &ScoringPolicy,
    delta: &StructuralDelta,
    ctx: &ScoringContext,
    reasons: &mut Vec<String>,
) -> i64 {
    let touched = delta.touched_symbols();
    if touched.is_empty() {
        return 0;
    }

    let documented_public = touched
        .iter()
        .find(|s| ctx.documented.contains(*s) && !ctx.private.contains(*s));
    if let Some(symbol) = documented_public {
        reasons.push(format!("touches documented public symbol {}", symbol));
        return policy.documented_public_bonus;
    }

    let all_private = touched.iter().all(|s| ctx.private.contains(s));
    let none_documented = !touched.iter().any(|s| ctx.documented.contains(s));
    if all_private && none_documented {
        reasons.push("only undocumented private members changed".to_string());
        return -policy.undocumented_private_penalty;
    }
    0
}

// ========== Classification ==========

fn classify_change(diff: &TextDiffResult, delta: &StructuralDelta) -> Classification {
    use ChangeCategory as C;

    let mut cls = Classification::default();
    if diff.whitespace_only {
        cls.categories.insert(C::Whitespace);
        cls.primary_type = PrimaryType::Formatting;
        return cls;
    }

    if diff.comments_only {
        cls.raise(C::Comments, Level::Low, Level::Low);
    }
    if diff.structural_changes {
        cls.raise(C::Structural, Level::Medium, Level::Medium);
    }
    if diff.semantic_changes {
        cls.raise(C::Semantic, Level::Medium, Level::Low);
    }

    if delta.namespace_changed {
        cls.raise(C::Namespace, Level::High, Level::High);
    }
    if delta.types.churn() > 0 {
        cls.raise(C::Types, Level::High, Level::High);
    }
    for ty in delta.types.modified.values() {
        if ty.changes_hierarchy() || ty.modifier_change.is_some() {
            cls.raise(C::Types, Level::High, Level::High);
        }
        if ty.methods_changes.has_changes() {
            cls.raise(C::Members, Level::Medium, Level::Medium);
        } else if ty.properties_changes.has_changes() {
            cls.raise(C::Members, Level::Low, Level::Medium);
        }
    }
    if delta.interfaces.has_changes() || delta.implements_changed() {
        cls.raise(C::Interfaces, Level::High, Level::High);
    }
    if delta.functions.churn() > 0 {
        cls.raise(C::Functions, Level::Medium, Level::High);
    } else if !delta.functions.modified.is_empty() {
        cls.raise(C::Functions, Level::Medium, Level::Medium);
    }
    if delta.imports.has_changes() {
        cls.raise(C::Imports, Level::Low, Level::Low);
    }

    cls.primary_type = if diff.comments_only {
        PrimaryType::Documentation
    } else if diff.structural_changes {
        PrimaryType::Structural
    } else if diff.semantic_changes {
        PrimaryType::Semantic
    } else if delta.types.has_changes() || delta.interfaces.has_changes() || delta.namespace_changed
    {
        PrimaryType::Structural
    } else if delta.functions.has_changes() {
        PrimaryType::Functional
    } else if delta.imports.has_changes() {
        PrimaryType::Dependencies
    } else {
        PrimaryType::Minor
    };
    cls
}

// ========== Rules ==========

pub fn threshold_rule(policy: &ScoringPolicy, mut result: SignificanceResult) -> SignificanceResult {
    let rec = &mut result.recommendation;
    match policy.band_for(result.score) {
        Some(band) => {
            rec.should_regenerate = true;
            rec.confidence = band.confidence;
            rec.priority = band.priority;
            rec.reasons.push(format!(
                "score {} reaches the {} priority band",
                result.score, band.priority
            ));
        }
        None => {
            rec.should_regenerate = false;
            rec.confidence = policy.skip_confidence;
            rec.priority = Level::None;
            rec.reasons.push(format!(
                "score {} is below the regeneration threshold",
                result.score
            ));
        }
    }
    result
}

pub fn relevance_high_rule(
    policy: &ScoringPolicy,
    mut result: SignificanceResult,
) -> SignificanceResult {
    if result.classification.documentation_relevance != Level::High {
        return result;
    }
    let rec = &mut result.recommendation;
    if !rec.should_regenerate {
        rec.should_regenerate = true;
        rec.priority = rec.priority.max(Level::Medium);
    }
    rec.confidence = (rec.confidence + policy.relevance_boost).min(policy.confidence_cap);
    rec.reasons
        .push("high documentation relevance forces regeneration".to_string());
    result
}

pub fn relevance_none_rule(
    policy: &ScoringPolicy,
    mut result: SignificanceResult,
) -> SignificanceResult {
    if result.classification.documentation_relevance != Level::None {
        return result;
    }
    let rec = &mut result.recommendation;
    rec.should_regenerate = false;
    rec.confidence = policy.irrelevant_confidence;
    rec.priority = Level::None;
    rec.reasons
        .push("change has no documentation relevance".to_string());
    result
}

pub fn formatting_rule(policy: &ScoringPolicy, mut result: SignificanceResult) -> SignificanceResult {
    if result.classification.primary_type != PrimaryType::Formatting {
        return result;
    }
    let rec = &mut result.recommendation;
    rec.should_regenerate = false;
    rec.confidence = policy.formatting_confidence;
    rec.priority = Level::None;
    rec.reasons
        .push("formatting-only change never needs new docs".to_string());
    result
}

pub fn interface_rule(policy: &ScoringPolicy, mut result: SignificanceResult) -> SignificanceResult {
    if !result.classification.touches_interfaces_or_namespace() {
        return result;
    }
    let rec = &mut result.recommendation;
    rec.should_regenerate = true;
    rec.confidence = policy.interface_confidence;
    rec.priority = Level::High;
    rec.reasons
        .push("interface or namespace change forces regeneration".to_string());
    result
}
