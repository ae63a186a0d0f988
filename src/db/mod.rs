//! SQLite tracking store.
//!
//! Holds the file hash ledger, commit markers, documented-symbol registry,
//! usage ledger and change-analysis cache. Every write is a single statement
//! or a transaction, so readers never see a half-applied update.

mod schema;

pub use schema::{
    init_db, ChangeAnalysis, CommitMarker, DocumentedSymbol, FileHashEntry, UsageEntry,
};

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Error;

/// BLAKE3 hex digest of file contents.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Result of [`Database::needs_documentation`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DocumentationCheck {
    pub needs_update: bool,
    /// No ledger entry exists for the path yet.
    pub is_new: bool,
    pub current_hash: Option<String>,
    pub last_hash: Option<String>,
    /// Set when the file could not be read.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StoreStats {
    pub tracked_files: u64,
    pub documented_symbols: u64,
    pub analyses_cached: u64,
    pub usage_entries: u64,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModelCost {
    pub model: String,
    pub calls: u64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CostStats {
    pub calls: u64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub by_model: Vec<ModelCost>,
}

/// Database connection wrapper.
///
/// The connection is not `Sync`; callers that share a store across threads
/// wrap it in a mutex.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the store at path.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        init_db(&conn)?;
        debug!(path = %path.display(), "Opened store");
        Ok(Self { conn })
    }

    /// Open in-memory database for testing.
    pub fn open_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========== File Hashes ==========

    /// Compare the file's current hash with the ledger.
    ///
    /// Unreadable files are reported through `error` rather than failing;
    /// only store failures return `Err`.
    pub fn needs_documentation(&self, path: &Path) -> Result<DocumentationCheck, Error> {
        match std::fs::read(path) {
            Ok(bytes) => self.check_content(path, &bytes),
            Err(e) => {
                let last_hash = self.file_entry(path)?.map(|e| e.last_hash);
                Ok(DocumentationCheck {
                    is_new: last_hash.is_none(),
                    last_hash,
                    error: Some(e.to_string()),
                    ..Default::default()
                })
            }
        }
    }

    /// Compare already-read file contents with the ledger.
    pub fn check_content(&self, path: &Path, bytes: &[u8]) -> Result<DocumentationCheck, Error> {
        let last_hash = self.file_entry(path)?.map(|e| e.last_hash);
        let is_new = last_hash.is_none();
        let current = content_hash(bytes);

        Ok(DocumentationCheck {
            needs_update: last_hash.as_deref() != Some(current.as_str()),
            is_new,
            current_hash: Some(current),
            last_hash,
            error: None,
        })
    }

    pub fn file_entry(&self, path: &Path) -> Result<Option<FileHashEntry>, Error> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM file_hashes WHERE path = ?1",
                [path_key(path)],
                FileHashEntry::from_row,
            )
            .optional()?)
    }

    pub fn file_entries(&self) -> Result<Vec<FileHashEntry>, Error> {
        let mut stmt = self.conn.prepare("SELECT * FROM file_hashes ORDER BY path")?;
        let rows = stmt.query_map([], FileHashEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Upsert the ledger entry after documentation was generated.
    pub fn record_documentation(
        &self,
        path: &Path,
        hash: &str,
        doc_path: Option<&str>,
    ) -> Result<(), Error> {
        self.conn.execute(
            r#"
            INSERT INTO file_hashes (path, last_hash, doc_path, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path) DO UPDATE SET
                last_hash = excluded.last_hash,
                doc_path = excluded.doc_path,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![path_key(path), hash, doc_path, now()],
        )?;
        Ok(())
    }

    /// Remove ledger entries (and their symbols) for files gone from disk.
    ///
    /// Usage ledger and commit markers are never touched.
    pub fn cleanup(&self) -> Result<usize, Error> {
        let tx = self.conn.unchecked_transaction()?;
        let missing: Vec<String> = {
            let mut stmt = tx.prepare("SELECT path FROM file_hashes")?;
            let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut missing = Vec::new();
            for path in paths {
                let path = path?;
                if !Path::new(&path).exists() {
                    missing.push(path);
                }
            }
            missing
        };

        for path in &missing {
            tx.execute("DELETE FROM file_hashes WHERE path = ?1", [path])?;
            tx.execute("DELETE FROM documented_symbols WHERE file_path = ?1", [path])?;
            debug!(path = %path, "Removed stale entry");
        }
        tx.commit()?;

        if !missing.is_empty() {
            info!(removed = missing.len(), "Cleaned up stale entries");
        }
        Ok(missing.len())
    }

    // ========== Commit Markers ==========

    pub fn last_processed_commit(&self, repository: &str) -> Result<Option<String>, Error> {
        Ok(self
            .conn
            .query_row(
                "SELECT commit_hash FROM commit_markers WHERE repository = ?1",
                [repository],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn commit_marker(&self, repository: &str) -> Result<Option<CommitMarker>, Error> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM commit_markers WHERE repository = ?1",
                [repository],
                CommitMarker::from_row,
            )
            .optional()?)
    }

    /// Advance the marker. Only called once a whole pass has finished.
    pub fn set_last_processed_commit(&self, repository: &str, hash: &str) -> Result<(), Error> {
        self.conn.execute(
            r#"
            INSERT INTO commit_markers (repository, commit_hash, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(repository) DO UPDATE SET
                commit_hash = excluded.commit_hash,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![repository, hash, now()],
        )?;
        Ok(())
    }

    // ========== Documented Symbols ==========

    /// Replace the registry for a file with `names`.
    ///
    /// Names already present keep their `first_documented_at`; names no
    /// longer present are dropped.
    pub fn record_documented_symbols(
        &self,
        path: &Path,
        names: &[String],
        hash: &str,
    ) -> Result<(), Error> {
        let key = path_key(path);
        let timestamp = now();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO documented_symbols
                    (file_path, symbol_name, first_documented_at, last_seen_hash)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(file_path, symbol_name) DO UPDATE SET
                    last_seen_hash = excluded.last_seen_hash
                "#,
            )?;
            for name in names {
                upsert.execute(rusqlite::params![key, name, timestamp, hash])?;
            }
        }
        tx.execute(
            "DELETE FROM documented_symbols WHERE file_path = ?1 AND last_seen_hash != ?2",
            [key.as_str(), hash],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn documented_symbols(&self, path: &Path) -> Result<Vec<DocumentedSymbol>, Error> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM documented_symbols WHERE file_path = ?1 ORDER BY symbol_name",
        )?;
        let rows = stmt.query_map([path_key(path)], DocumentedSymbol::from_row)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    pub fn documented_symbol_names(&self, path: &Path) -> Result<BTreeSet<String>, Error> {
        Ok(self
            .documented_symbols(path)?
            .into_iter()
            .map(|s| s.symbol_name)
            .collect())
    }

    // ========== Usage Ledger ==========

    /// Append a usage row and return its id.
    pub fn record_token_usage(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
        cost: f64,
        file_path: Option<&Path>,
    ) -> Result<i64, Error> {
        self.conn.execute(
            r#"
            INSERT INTO usage_ledger (model, input_tokens, output_tokens, cost, file_path, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                model,
                input_tokens,
                output_tokens,
                cost,
                file_path.map(path_key),
                now(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn usage_entries(&self) -> Result<Vec<UsageEntry>, Error> {
        let mut stmt = self.conn.prepare("SELECT * FROM usage_ledger ORDER BY id")?;
        let rows = stmt.query_map([], UsageEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // ========== Change Analyses ==========

    pub fn cached_analysis(
        &self,
        path: &Path,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<Option<ChangeAnalysis>, Error> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT * FROM change_analyses
                WHERE file_path = ?1 AND old_hash = ?2 AND new_hash = ?3
                "#,
                [path_key(path).as_str(), old_hash, new_hash],
                ChangeAnalysis::from_row,
            )
            .optional()?)
    }

    pub fn record_analysis(&self, analysis: &ChangeAnalysis) -> Result<(), Error> {
        self.conn.execute(
            r#"
            INSERT INTO change_analyses
                (file_path, old_hash, new_hash, score, classification, recommendation, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(file_path, old_hash, new_hash) DO UPDATE SET
                score = excluded.score,
                classification = excluded.classification,
                recommendation = excluded.recommendation,
                timestamp = excluded.timestamp
            "#,
            rusqlite::params![
                analysis.file_path,
                analysis.old_hash,
                analysis.new_hash,
                analysis.score,
                schema::to_json(&analysis.classification)?,
                schema::to_json(&analysis.recommendation)?,
                analysis.timestamp,
            ],
        )?;
        Ok(())
    }

    // ========== Stats ==========

    pub fn stats(&self) -> Result<StoreStats, Error> {
        let count = |table: &str| -> Result<u64, Error> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            tracked_files: count("file_hashes")?,
            documented_symbols: count("documented_symbols")?,
            analyses_cached: count("change_analyses")?,
            usage_entries: count("usage_ledger")?,
            last_updated: self
                .conn
                .query_row("SELECT MAX(updated_at) FROM file_hashes", [], |row| {
                    row.get(0)
                })?,
        })
    }

    pub fn cost_stats(&self) -> Result<CostStats, Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT model, COUNT(*), SUM(input_tokens), SUM(output_tokens), SUM(cost)
            FROM usage_ledger
            GROUP BY model
            ORDER BY SUM(cost) DESC, model
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ModelCost {
                model: row.get(0)?,
                calls: row.get::<_, i64>(1)? as u64,
                input_tokens: row.get(2)?,
                output_tokens: row.get(3)?,
                cost: row.get(4)?,
            })
        })?;

        let mut stats = CostStats::default();
        for row in rows {
            let model = row?;
            stats.calls += model.calls;
            stats.input_tokens += model.input_tokens;
            stats.output_tokens += model.output_tokens;
            stats.total_cost += model.cost;
            stats.by_model.push(model);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scorer::{Classification, Recommendation};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_new_file_needs_documentation() {
        let db = Database::open_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.php", "<?php class A {}");

        let check = db.needs_documentation(&path).unwrap();
        assert!(check.needs_update);
        assert!(check.is_new);
        assert!(check.last_hash.is_none());
        assert_eq!(
            check.current_hash.as_deref(),
            Some(content_hash(b"<?php class A {}").as_str())
        );
    }

    #[test]
    fn test_needs_documentation_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.php", "<?php class A {}");

        let first = db.needs_documentation(&path).unwrap();
        let second = db.needs_documentation(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_recorded_file_is_up_to_date_until_changed() {
        let db = Database::open_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.php", "v1");
        let hash = db.needs_documentation(&path).unwrap().current_hash.unwrap();
        db.record_documentation(&path, &hash, Some("docs/a.md"))
            .unwrap();

        let check = db.needs_documentation(&path).unwrap();
        assert!(!check.needs_update);
        assert!(!check.is_new);

        std::fs::write(&path, "v2").unwrap();
        let check = db.needs_documentation(&path).unwrap();
        assert!(check.needs_update);
        assert_eq!(check.last_hash.as_deref(), Some(hash.as_str()));

        // upsert, not a second row
        db.record_documentation(&path, "other", None).unwrap();
        assert_eq!(db.file_entries().unwrap().len(), 1);
        assert_eq!(db.file_entry(&path).unwrap().unwrap().last_hash, "other");
    }

    #[test]
    fn test_check_content_hashes_raw_bytes() {
        let db = Database::open_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.php");
        let bytes = b"<?php $s = '\xe9t\xe9';";
        std::fs::write(&path, bytes).unwrap();

        let check = db.check_content(&path, bytes).unwrap();
        assert_eq!(check.current_hash, Some(content_hash(bytes)));
        assert_eq!(check, db.needs_documentation(&path).unwrap());
    }

    #[test]
    fn test_unreadable_file_reports_error() {
        let db = Database::open_memory().unwrap();
        let check = db
            .needs_documentation(Path::new("/nonexistent/file.php"))
            .unwrap();
        assert!(!check.needs_update);
        assert!(check.current_hash.is_none());
        assert!(check.error.is_some());
    }

    #[test]
    fn test_commit_marker_per_repository() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.last_processed_commit("repo").unwrap(), None);

        db.set_last_processed_commit("repo", "abc").unwrap();
        db.set_last_processed_commit("repo", "def").unwrap();
        db.set_last_processed_commit("other", "123").unwrap();

        assert_eq!(
            db.last_processed_commit("repo").unwrap().as_deref(),
            Some("def")
        );
        assert_eq!(db.commit_marker("other").unwrap().unwrap().commit_hash, "123");
    }

    #[test]
    fn test_cleanup_removes_only_missing_files() {
        let db = Database::open_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.php", "a");
        let b = write(&dir, "b.php", "b");
        let c = write(&dir, "c.php", "c");
        for path in [&a, &b, &c] {
            db.record_documentation(path, "h", None).unwrap();
        }
        db.record_documented_symbols(&b, &["B".to_string()], "h")
            .unwrap();
        db.record_token_usage("model", 10, 20, 0.5, Some(b.as_path()))
            .unwrap();
        db.set_last_processed_commit("repo", "abc").unwrap();

        std::fs::remove_file(&b).unwrap();
        assert_eq!(db.cleanup().unwrap(), 1);

        let remaining: Vec<String> = db
            .file_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(remaining, vec![path_key(&a), path_key(&c)]);
        assert!(db.documented_symbols(&b).unwrap().is_empty());
        assert_eq!(db.usage_entries().unwrap().len(), 1);
        assert_eq!(
            db.last_processed_commit("repo").unwrap().as_deref(),
            Some("abc")
        );

        assert_eq!(db.cleanup().unwrap(), 0);
    }

    #[test]
    fn test_documented_symbols_keep_first_seen_and_prune() {
        let db = Database::open_memory().unwrap();
        let path = Path::new("/repo/a.php");
        db.record_documented_symbols(path, &["A".to_string(), "A::old".to_string()], "h1")
            .unwrap();
        let first = db.documented_symbols(path).unwrap();

        db.record_documented_symbols(path, &["A".to_string(), "A::new".to_string()], "h2")
            .unwrap();
        let second = db.documented_symbols(path).unwrap();

        let names: Vec<&str> = second.iter().map(|s| s.symbol_name.as_str()).collect();
        assert_eq!(names, vec!["A", "A::new"]);
        assert_eq!(second[0].first_documented_at, first[0].first_documented_at);
        assert_eq!(second[0].last_seen_hash, "h2");
    }

    #[test]
    fn test_usage_ledger_and_cost_stats() {
        let db = Database::open_memory().unwrap();
        db.record_token_usage("small", 100, 50, 0.25, None).unwrap();
        db.record_token_usage("large", 1000, 500, 2.0, Some(Path::new("/r/a.php")))
            .unwrap();
        db.record_token_usage("small", 100, 50, 0.25, None).unwrap();

        let stats = db.cost_stats().unwrap();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.input_tokens, 1200);
        assert_eq!(stats.output_tokens, 600);
        assert!((stats.total_cost - 2.5).abs() < 1e-9);
        assert_eq!(stats.by_model[0].model, "large");
        assert_eq!(stats.by_model[1].calls, 2);

        let entries = db.usage_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].id < entries[2].id);
    }

    #[test]
    fn test_analysis_cache() {
        let db = Database::open_memory().unwrap();
        let path = Path::new("/repo/a.php");
        assert!(db.cached_analysis(path, "o", "n").unwrap().is_none());

        let analysis = ChangeAnalysis {
            file_path: path_key(path),
            old_hash: "o".to_string(),
            new_hash: "n".to_string(),
            score: 42,
            classification: Classification::default(),
            recommendation: Recommendation {
                should_regenerate: true,
                confidence: 0.75,
                reasons: vec!["because".to_string()],
                ..Default::default()
            },
            timestamp: now(),
        };
        db.record_analysis(&analysis).unwrap();
        db.record_analysis(&analysis).unwrap();

        let cached = db.cached_analysis(path, "o", "n").unwrap().unwrap();
        assert_eq!(cached, analysis);
        assert_eq!(db.stats().unwrap().analyses_cached, 1);
    }

    #[test]
    fn test_stats_reflect_writes() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.stats().unwrap(), StoreStats::default());

        db.record_documentation(Path::new("/r/a.php"), "h", None)
            .unwrap();
        db.record_token_usage("m", 1, 1, 0.0, None).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.tracked_files, 1);
        assert_eq!(stats.usage_entries, 1);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_open_on_disk_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let db = Database::open(&path).unwrap();
        db.set_last_processed_commit("r", "x").unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(
            reopened.last_processed_commit("r").unwrap().as_deref(),
            Some("x")
        );
    }
}
