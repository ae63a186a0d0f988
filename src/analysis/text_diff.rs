//! Line-level classification of a raw text change.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};

use crate::error::Error;

/// Changed-line tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeCounts {
    /// Number of changed line groups (hunks).
    pub total: usize,
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextDiffResult {
    pub whitespace_only: bool,
    pub comments_only: bool,
    pub structural_changes: bool,
    pub semantic_changes: bool,
    pub change_counts: ChangeCounts,
}

impl TextDiffResult {
    pub fn has_changes(&self) -> bool {
        self.change_counts.total > 0
    }

    /// Reject flag combinations [`classify`] can never produce.
    pub fn validate(&self) -> Result<(), Error> {
        if self.whitespace_only
            && (self.comments_only || self.structural_changes || self.semantic_changes)
        {
            return Err(Error::input(
                "whitespace_only diff must not carry other change flags",
            ));
        }
        let any_flag = self.whitespace_only
            || self.comments_only
            || self.structural_changes
            || self.semantic_changes;
        if any_flag && self.change_counts.total == 0 {
            return Err(Error::input("change flags set but no changed hunks counted"));
        }
        Ok(())
    }
}

static COMMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?://|#(?:$|[^\[])|/\*|\*)").unwrap());

// Lines that open or alter a declaration boundary.
static DECLARATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^\s*(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+\w")
            .unwrap(),
        Regex::new(r"(?i)\bfunction\s+&?\w+\s*\(").unwrap(),
        Regex::new(
            r"(?i)^\s*(?:(?:public|protected|private|static|var|readonly)\s+)+(?:[?\w\\|&]+\s+)?\$\w",
        )
        .unwrap(),
        Regex::new(r"(?i)^\s*(?:namespace|use)\s+[\w\\]").unwrap(),
        Regex::new(r"(?i)\b(?:extends|implements)\s+[\w\\]").unwrap(),
    ]
});

/// Changed lines of one hunk.
#[derive(Debug, Default)]
struct Hunk<'a> {
    old_lines: Vec<&'a str>,
    new_lines: Vec<&'a str>,
}

impl Hunk<'_> {
    fn is_empty(&self) -> bool {
        self.old_lines.is_empty() && self.new_lines.is_empty()
    }

    /// Identical once whitespace is normalized and blank lines dropped.
    fn is_whitespace_only(&self) -> bool {
        normalized_lines(&self.old_lines) == normalized_lines(&self.new_lines)
    }

    fn changed_lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.old_lines
            .iter()
            .chain(&self.new_lines)
            .copied()
            .filter(|l| !l.trim().is_empty())
    }
}

fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalized_lines(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .map(|l| normalize(l))
        .filter(|l| !l.is_empty())
        .collect()
}

pub fn is_comment_line(line: &str) -> bool {
    COMMENT_LINE.is_match(line)
}

pub fn is_declaration_line(line: &str) -> bool {
    DECLARATION_PATTERNS.iter().any(|p| p.is_match(line))
}

/// Classify the change from `old` to `new`.
pub fn classify(old: &str, new: &str) -> TextDiffResult {
    let diff = TextDiff::from_lines(old, new);
    let old_slices = diff.old_slices();
    let new_slices = diff.new_slices();

    let mut counts = ChangeCounts::default();
    let mut hunks: Vec<Hunk<'_>> = Vec::new();
    let mut current = Hunk::default();

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                if !current.is_empty() {
                    hunks.push(std::mem::take(&mut current));
                }
                continue;
            }
            DiffTag::Insert => counts.additions += new_range.len(),
            DiffTag::Delete => counts.deletions += old_range.len(),
            DiffTag::Replace => {
                let paired = old_range.len().min(new_range.len());
                counts.modifications += paired;
                counts.additions += new_range.len() - paired;
                counts.deletions += old_range.len() - paired;
            }
        }
        current.old_lines.extend_from_slice(&old_slices[old_range]);
        current.new_lines.extend_from_slice(&new_slices[new_range]);
    }
    if !current.is_empty() {
        hunks.push(current);
    }
    counts.total = hunks.len();

    let mut result = TextDiffResult {
        change_counts: counts,
        ..Default::default()
    };
    if hunks.is_empty() {
        return result;
    }

    let whitespace_only =
        hunks.iter().all(Hunk::is_whitespace_only) || normalize(old) == normalize(new);
    if whitespace_only {
        result.whitespace_only = true;
        return result;
    }

    let mut saw_comment = false;
    let mut saw_code = false;
    for hunk in hunks.iter().filter(|h| !h.is_whitespace_only()) {
        for line in hunk.changed_lines() {
            if is_comment_line(line) {
                saw_comment = true;
            } else if is_declaration_line(line) {
                saw_code = true;
                result.structural_changes = true;
            } else {
                saw_code = true;
                result.semantic_changes = true;
            }
        }
    }
    result.comments_only = saw_comment && !saw_code;
    result
}
