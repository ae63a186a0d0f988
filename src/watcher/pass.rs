//! One evaluation pass over the files changed since the last marker.
//!
//! Every candidate file ends in exactly one [`FileOutcome`]. Store failures
//! abort the pass; anything else is recorded against the file. The commit
//! marker is written only after the loop, so an aborted pass is re-run from
//! the same starting point next time.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::analysis::scorer::{score_or_skip, ScoringContext};
use crate::analysis::summary::StructuralSummary;
use crate::analysis::{compare, parse, text_diff, StructuralDelta};
use crate::config::Config;
use crate::db::{content_hash, ChangeAnalysis, Database};
use crate::error::Error;
use crate::watcher::docgen::DocGenerator;
use crate::watcher::git::GitRepo;

/// Everything a pass needs.
pub struct PassContext<'a> {
    pub repo_root: &'a Path,
    /// Commit-marker key.
    pub repository: &'a str,
    pub git: &'a dyn GitRepo,
    pub generator: &'a dyn DocGenerator,
    pub db: &'a Database,
    pub config: &'a Config,
    /// Regenerate every tracked file regardless of hashes and scores.
    pub force: bool,
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed {
        path: String,
        /// `None` when scoring was bypassed (new file or forced).
        score: Option<u32>,
        doc_path: PathBuf,
    },
    Skipped {
        path: String,
        reason: String,
    },
    Error {
        path: String,
        error: String,
    },
}

impl FileOutcome {
    pub fn path(&self) -> &str {
        match self {
            FileOutcome::Processed { path, .. }
            | FileOutcome::Skipped { path, .. }
            | FileOutcome::Error { path, .. } => path,
        }
    }

    fn skipped(path: &str, reason: impl Into<String>) -> Self {
        FileOutcome::Skipped {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Processed {
                path,
                score,
                doc_path,
            } => {
                write!(f, "processed  {} -> {}", path, doc_path.display())?;
                if let Some(score) = score {
                    write!(f, " (score {})", score)?;
                }
                Ok(())
            }
            FileOutcome::Skipped { path, reason } => write!(f, "skipped    {} ({})", path, reason),
            FileOutcome::Error { path, error } => write!(f, "error      {}: {}", path, error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub head: Option<String>,
    pub previous: Option<String>,
    pub outcomes: Vec<FileOutcome>,
    pub marker_advanced: bool,
}

impl PassReport {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn errors(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Error { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        write!(
            f,
            "{} files: {} processed, {} skipped, {} errors",
            self.outcomes.len(),
            self.processed(),
            self.skipped(),
            self.errors()
        )
    }
}

/// Run one pass.
pub fn run_pass(ctx: &PassContext<'_>) -> Result<PassReport, Error> {
    let Some(head) = ctx.git.current_commit()? else {
        info!("Repository has no commits yet");
        return Ok(PassReport::default());
    };
    let previous = ctx.db.last_processed_commit(ctx.repository)?;
    let mut report = PassReport {
        head: Some(head.clone()),
        previous: previous.clone(),
        ..Default::default()
    };

    if previous.as_deref() == Some(head.as_str()) && !ctx.force {
        debug!(commit = %head, "Already processed");
        return Ok(report);
    }

    let base = match previous.as_deref() {
        Some(from) if !ctx.force => {
            if ctx.git.has_commit(from)? {
                Some(from)
            } else {
                warn!(from, "Last processed commit no longer exists");
                None
            }
        }
        _ => None,
    };
    let candidates = match base {
        Some(from) => {
            let commits = ctx.git.commit_log(Some(from), &head)?;
            info!(from, to = %head, commits = commits.len(), "Evaluating commit range");
            ctx.git.changed_files(from, &head)?
        }
        None => {
            info!(to = %head, "Evaluating all tracked files");
            ctx.git.list_files()?
        }
    };
    let files: Vec<String> = candidates
        .into_iter()
        .filter(|f| ctx.config.watcher.matches(f))
        .collect();

    for rel in &files {
        let outcome = match evaluate_file(ctx, rel, base) {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => {
                error!(path = %rel, error = %e, "Store failure, aborting pass");
                return Err(e);
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "Failed to evaluate file");
                FileOutcome::Error {
                    path: rel.clone(),
                    error: e.to_string(),
                }
            }
        };
        info!("{}", outcome);
        report.outcomes.push(outcome);
    }

    ctx.db.set_last_processed_commit(ctx.repository, &head)?;
    report.marker_advanced = true;
    info!(
        commit = %head,
        processed = report.processed(),
        skipped = report.skipped(),
        errors = report.errors(),
        "Pass complete"
    );
    Ok(report)
}

/// Evaluate one file; `base` is the commit its old content is read from.
fn evaluate_file(
    ctx: &PassContext<'_>,
    rel: &str,
    base: Option<&str>,
) -> Result<FileOutcome, Error> {
    let abs = ctx.repo_root.join(rel);
    if !abs.exists() {
        return Ok(FileOutcome::skipped(rel, "deleted"));
    }

    // One read: the hash recorded is the hash of the text documented.
    let bytes = std::fs::read(&abs).map_err(|e| Error::read(&abs, e))?;
    let check = ctx.db.check_content(&abs, &bytes)?;
    let current_hash = check
        .current_hash
        .ok_or_else(|| Error::read(&abs, "no content hash"))?;
    if !check.needs_update && !ctx.force {
        return Ok(FileOutcome::skipped(rel, "unchanged"));
    }

    let source = String::from_utf8_lossy(&bytes);
    let new_summary = parse_or_warn(rel, &source);

    let old_source = match base {
        Some(rev) if !ctx.force && !check.is_new => ctx.git.read_file_at(rel, rev)?,
        _ => None,
    };

    let score = match old_source {
        Some(old) => {
            let analysis = analyze(
                ctx,
                &abs,
                &old,
                &source,
                new_summary.as_ref(),
                &current_hash,
            )?;
            if !analysis.recommendation.should_regenerate {
                let reason = analysis
                    .recommendation
                    .reasons
                    .last()
                    .cloned()
                    .unwrap_or_default();
                return Ok(FileOutcome::skipped(
                    rel,
                    format!("score {}: {}", analysis.score, reason),
                ));
            }
            Some(analysis.score)
        }
        None => None,
    };

    let doc = ctx.generator.generate(rel, &source)?;
    let doc_rel = ctx.config.docs.doc_path_for(rel);
    let doc_abs = ctx.repo_root.join(&doc_rel);
    if let Some(parent) = doc_abs.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&doc_abs, &doc.markdown)?;

    ctx.db
        .record_documentation(&abs, &current_hash, Some(doc_rel.to_string_lossy().as_ref()))?;
    if let Some(summary) = &new_summary {
        ctx.db
            .record_documented_symbols(&abs, &summary.symbol_names(), &current_hash)?;
    }
    if let Some(usage) = &doc.usage {
        ctx.db.record_token_usage(
            &usage.model,
            usage.input_tokens,
            usage.output_tokens,
            usage.cost,
            Some(abs.as_path()),
        )?;
    }

    Ok(FileOutcome::Processed {
        path: rel.to_string(),
        score,
        doc_path: doc_rel,
    })
}

/// Score old vs new content, reusing a cached analysis of the same pair.
fn analyze(
    ctx: &PassContext<'_>,
    abs: &Path,
    old: &str,
    new: &str,
    new_summary: Option<&StructuralSummary>,
    new_hash: &str,
) -> Result<ChangeAnalysis, Error> {
    let old_hash = content_hash(old.as_bytes());
    if let Some(cached) = ctx.db.cached_analysis(abs, &old_hash, new_hash)? {
        debug!(path = %abs.display(), "Using cached analysis");
        return Ok(cached);
    }

    let diff = text_diff::classify(old, new);
    let old_summary = parse_or_warn(&abs.to_string_lossy(), old);

    let mut private = BTreeSet::new();
    let delta = match (&old_summary, new_summary) {
        (Some(old_summary), Some(new_summary)) => {
            private.extend(old_summary.private_symbols());
            private.extend(new_summary.private_symbols());
            compare(old_summary, new_summary)
        }
        // Text classification still applies without structure.
        _ => StructuralDelta::default(),
    };
    let scoring_ctx = ScoringContext {
        documented: ctx.db.documented_symbol_names(abs)?,
        private,
    };
    let result = score_or_skip(&ctx.config.scoring, &diff, &delta, &scoring_ctx);
    debug!(
        path = %abs.display(),
        score = result.score,
        primary = %result.classification.primary_type,
        regenerate = result.recommendation.should_regenerate,
        "Scored change"
    );

    let analysis = ChangeAnalysis {
        file_path: abs.to_string_lossy().into_owned(),
        old_hash,
        new_hash: new_hash.to_string(),
        score: result.score,
        classification: result.classification,
        recommendation: result.recommendation,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    ctx.db.record_analysis(&analysis)?;
    Ok(analysis)
}

fn parse_or_warn(path: &str, source: &str) -> Option<StructuralSummary> {
    match parse(source) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!(path, error = %e, "Parse failed, skipping structural comparison");
            None
        }
    }
}
