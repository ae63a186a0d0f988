//! Table definitions and row types for the tracking store.

use rusqlite::{Connection, Result, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::analysis::scorer::{Classification, Recommendation};
use crate::error::Error;

/// Create all tables.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    // file hash ledger
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS file_hashes (
            path        TEXT PRIMARY KEY,
            last_hash   TEXT NOT NULL,
            doc_path    TEXT,
            updated_at  TEXT NOT NULL
        );
        "#,
    )?;

    // last processed commit, one row per repository
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS commit_markers (
            repository   TEXT PRIMARY KEY,
            commit_hash  TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documented_symbols (
            file_path            TEXT NOT NULL,
            symbol_name          TEXT NOT NULL,
            first_documented_at  TEXT NOT NULL,
            last_seen_hash       TEXT NOT NULL,
            PRIMARY KEY (file_path, symbol_name)
        );
        "#,
    )?;

    // append-only
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS usage_ledger (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            model          TEXT NOT NULL,
            input_tokens   INTEGER NOT NULL,
            output_tokens  INTEGER NOT NULL,
            cost           REAL NOT NULL,
            file_path      TEXT,
            timestamp      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_usage_model ON usage_ledger(model);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS change_analyses (
            file_path       TEXT NOT NULL,
            old_hash        TEXT NOT NULL,
            new_hash        TEXT NOT NULL,
            score           INTEGER NOT NULL,
            classification  TEXT NOT NULL,
            recommendation  TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            PRIMARY KEY (file_path, old_hash, new_hash)
        );
        "#,
    )?;

    Ok(())
}

/// File hash ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHashEntry {
    pub path: String,
    pub last_hash: String,
    pub doc_path: Option<String>,
    pub updated_at: String,
}

impl FileHashEntry {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            path: row.get("path")?,
            last_hash: row.get("last_hash")?,
            doc_path: row.get("doc_path")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitMarker {
    pub repository: String,
    pub commit_hash: String,
    pub updated_at: String,
}

impl CommitMarker {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            repository: row.get("repository")?,
            commit_hash: row.get("commit_hash")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentedSymbol {
    pub file_path: String,
    pub symbol_name: String,
    pub first_documented_at: String,
    pub last_seen_hash: String,
}

impl DocumentedSymbol {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            symbol_name: row.get("symbol_name")?,
            first_documented_at: row.get("first_documented_at")?,
            last_seen_hash: row.get("last_seen_hash")?,
        })
    }
}

/// Usage ledger row. Never updated once written.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub id: i64,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
    pub file_path: Option<String>,
    pub timestamp: String,
}

impl UsageEntry {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            model: row.get("model")?,
            input_tokens: row.get("input_tokens")?,
            output_tokens: row.get("output_tokens")?,
            cost: row.get("cost")?,
            file_path: row.get("file_path")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

/// Cached scorer output for one (path, old hash, new hash) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeAnalysis {
    pub file_path: String,
    pub old_hash: String,
    pub new_hash: String,
    pub score: u32,
    pub classification: Classification,
    pub recommendation: Recommendation,
    pub timestamp: String,
}

impl ChangeAnalysis {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            old_hash: row.get("old_hash")?,
            new_hash: row.get("new_hash")?,
            score: row.get("score")?,
            classification: json_column(row, "classification")?,
            recommendation: json_column(row, "recommendation")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, name: &str) -> Result<T> {
    let text: String = row.get(name)?;
    serde_json::from_str(&text).map_err(|e| {
        let idx = row.as_ref().column_index(name).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    Ok(serde_json::to_string(value)?)
}
