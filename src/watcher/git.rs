//! Git access for the pass orchestrator.

use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::debug;

use crate::error::Error;

/// One entry of `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub hash: String,
    pub subject: String,
}

/// Read-only view of a repository's history.
///
/// Paths are relative to the repository root.
pub trait GitRepo {
    /// Hash of HEAD, or `None` for a repository with no commits.
    fn current_commit(&self) -> Result<Option<String>, Error>;

    /// Whether `rev` names a commit in this repository.
    fn has_commit(&self, rev: &str) -> Result<bool, Error>;

    /// Files that differ between two commits, deletions included.
    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>, Error>;

    /// Every tracked file at HEAD.
    fn list_files(&self) -> Result<Vec<String>, Error>;

    /// File content at a revision, or `None` if it did not exist there.
    fn read_file_at(&self, path: &str, rev: &str) -> Result<Option<String>, Error>;

    /// Commits reachable from `to` but not from `from`, newest first.
    fn commit_log(&self, from: Option<&str>, to: &str) -> Result<Vec<CommitSummary>, Error>;
}

/// [`GitRepo`] backed by the `git` command line.
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git(&self, args: &[&str]) -> Result<Output, Error> {
        debug!(args = ?args, "Running git");
        Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git: {}", e)))
    }

    fn git_ok(&self, args: &[&str]) -> Result<String, Error> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

impl GitRepo for GitCli {
    fn current_commit(&self) -> Result<Option<String>, Error> {
        let output = self.git(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if output.status.success() {
            let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok(Some(hash));
        }
        // --quiet exits 1 without output when HEAD is unborn
        if output.status.code() == Some(1) && output.stdout.is_empty() {
            return Ok(None);
        }
        Err(Error::Git(format!(
            "git rev-parse HEAD failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    fn has_commit(&self, rev: &str) -> Result<bool, Error> {
        let object = format!("{}^{{commit}}", rev);
        Ok(self.git(&["cat-file", "-e", &object])?.status.success())
    }

    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>, Error> {
        let stdout = self.git_ok(&["diff", "--name-only", "--no-renames", from, to])?;
        Ok(lines(&stdout))
    }

    fn list_files(&self) -> Result<Vec<String>, Error> {
        Ok(lines(&self.git_ok(&["ls-files"])?))
    }

    fn read_file_at(&self, path: &str, rev: &str) -> Result<Option<String>, Error> {
        let spec = format!("{}:{}", rev, path);
        let output = self.git(&["show", &spec])?;
        if !output.status.success() {
            debug!(path, rev, "File absent at revision");
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn commit_log(&self, from: Option<&str>, to: &str) -> Result<Vec<CommitSummary>, Error> {
        let range = match from {
            Some(from) => format!("{}..{}", from, to),
            None => to.to_string(),
        };
        let stdout = self.git_ok(&["log", "--format=%H%x09%s", "--max-count=100", &range])?;
        Ok(stdout
            .lines()
            .filter_map(|line| {
                let (hash, subject) = line.split_once('\t')?;
                Some(CommitSummary {
                    hash: hash.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }
}
