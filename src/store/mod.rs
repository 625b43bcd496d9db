//! The label store abstraction (§4.C).
//!
//! `Store` is the capability interface the sequencer, query endpoint, and
//! broadcaster all depend on. Two implementations ship here: [`postgres`]
//! (the default, backing a running deployment) and [`memory`] (used by
//! tests and viable as a lightweight single-process deployment).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::labels::Label;

/// A label plus the monotonic id assigned to it at insertion (§3).
#[derive(Debug, Clone)]
pub struct StoredLabel {
    pub id: i64,
    pub label: Label,
}

/// Parameters for a historical query (§4.C, §4.F).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub uri_patterns: Vec<String>,
    pub sources: Vec<String>,
    pub after_id: i64,
    pub limit: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid uri pattern: {0}")]
    InvalidPattern(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Append-only label log, portable across database backends (Design
/// Note 2: "callback-based storage adapter" modeled as a trait object).
#[async_trait]
pub trait Store: Send + Sync {
    /// Run schema creation / journal-mode setup. Must complete before the
    /// service accepts traffic (§4.I).
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert a signed label, returning its newly assigned id. Must be
    /// atomic and the id must be durably visible to subsequent
    /// `query`/`scan` calls before this returns (§4.C invariant).
    async fn append(&self, label: &Label) -> Result<i64, StoreError>;

    /// Ascending-id query filtered by URI pattern, source, and cursor.
    async fn query(&self, params: &QueryParams) -> Result<Vec<StoredLabel>, StoreError>;

    /// Ascending-id scan of everything with `id > after_id`, used for
    /// subscription replay (§4.E).
    async fn scan(&self, after_id: i64) -> Result<Vec<StoredLabel>, StoreError>;

    /// The highest assigned id, or 0 if the store is empty.
    async fn max_id(&self) -> Result<i64, StoreError>;

    /// Release resources. A no-op for stores with nothing to release.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Normalize a caller-supplied URI pattern into a SQL `LIKE` pattern.
///
/// A pattern of exactly `*` means "no filter" (returns `None`). A `*`
/// anywhere except the final character is a client error. Otherwise `%`
/// and `_` in the literal portion are escaped so they match literally, and
/// a trailing `*` becomes an unescaped `%` prefix wildcard.
pub fn uri_pattern_to_like(pattern: &str) -> Result<Option<String>, StoreError> {
    if pattern == "*" {
        return Ok(None);
    }

    if let Some(star_pos) = pattern.find('*') {
        if star_pos != pattern.len() - 1 {
            return Err(StoreError::InvalidPattern(format!(
                "wildcard '*' only allowed at the end of a pattern, got: {pattern}"
            )));
        }
        let prefix = &pattern[..star_pos];
        Ok(Some(format!("{}%", escape_like(prefix))))
    } else {
        Ok(Some(escape_like(pattern)))
    }
}

fn escape_like(literal: &str) -> String {
    literal.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}


pub(crate) fn parse_cts(cts: &str) -> DateTime<Utc> {
    cts.parse().unwrap_or_else(|_| Utc::now())
}
