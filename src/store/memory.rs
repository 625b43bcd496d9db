//! An in-memory [`Store`] implementation.
//!
//! Used by the test suite so it needs no live Postgres, and viable as a
//! lightweight single-process deployment backend. Guarded by a single
//! mutex: the append path and the read paths all take the same lock,
//! giving append-broadcast atomicity for free (Design Note: "perform the
//! store append and subscriber enqueue under a single mutex").

use std::sync::Mutex;

use async_trait::async_trait;

use super::{uri_pattern_to_like, QueryParams, Store, StoreError, StoredLabel};
use crate::labels::Label;

#[derive(Default)]
pub struct InMemoryStore {
    labels: Mutex<Vec<StoredLabel>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(&self, label: &Label) -> Result<i64, StoreError> {
        let mut labels = self.labels.lock().expect("label store mutex poisoned");
        let id = labels.last().map(|l| l.id).unwrap_or(0) + 1;
        labels.push(StoredLabel {
            id,
            label: label.clone(),
        });
        Ok(id)
    }

    async fn query(&self, params: &QueryParams) -> Result<Vec<StoredLabel>, StoreError> {
        let like_patterns: Vec<Option<String>> = params
            .uri_patterns
            .iter()
            .map(|p| uri_pattern_to_like(p))
            .collect::<Result<_, _>>()?;

        let labels = self.labels.lock().expect("label store mutex poisoned");
        let matches = labels
            .iter()
            .filter(|row| row.id > params.after_id)
            .filter(|row| {
                like_patterns.is_empty()
                    || like_patterns
                        .iter()
                        .any(|p| p.as_deref().map_or(true, |pat| like_match(&row.label.uri, pat)))
            })
            .filter(|row| {
                params.sources.is_empty() || params.sources.iter().any(|s| s == &row.label.src)
            })
            .take(if params.limit > 0 {
                params.limit as usize
            } else {
                usize::MAX
            })
            .cloned()
            .collect();

        Ok(matches)
    }

    async fn scan(&self, after_id: i64) -> Result<Vec<StoredLabel>, StoreError> {
        let labels = self.labels.lock().expect("label store mutex poisoned");
        Ok(labels
            .iter()
            .filter(|row| row.id > after_id)
            .cloned()
            .collect())
    }

    async fn max_id(&self) -> Result<i64, StoreError> {
        let labels = self.labels.lock().expect("label store mutex poisoned");
        Ok(labels.last().map(|l| l.id).unwrap_or(0))
    }
}

/// Match `value` against a SQL-LIKE pattern produced by
/// [`uri_pattern_to_like`]: a literal string with `\%`, `\_`, `\\` escapes
/// and at most one trailing, unescaped `%` wildcard.
fn like_match(value: &str, pattern: &str) -> bool {
    let (literal, is_prefix) = match pattern.strip_suffix('%') {
        Some(prefix) if !prefix.ends_with('\\') => (prefix, true),
        _ => (pattern, false),
    };
    let unescaped = unescape_like(literal);

    if is_prefix {
        value.starts_with(&unescaped)
    } else {
        value == unescaped
    }
}

fn unescape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Draft;
    use k256::ecdsa::SigningKey;

    fn key() -> SigningKey {
        SigningKey::from_slice(&[0x11u8; 32]).unwrap()
    }

    fn label(src: &str, uri: &str, val: &str) -> Label {
        Draft::new(src, uri, val).sign(&key()).unwrap()
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let store = InMemoryStore::new();
        let id1 = store.append(&label("did:plc:a", "did:plc:x", "spam")).await.unwrap();
        let id2 = store.append(&label("did:plc:a", "did:plc:y", "spam")).await.unwrap();
        assert!(id1 < id2);
        assert_eq!(store.max_id().await.unwrap(), id2);
    }

    #[tokio::test]
    async fn scan_returns_ids_greater_than_cursor() {
        let store = InMemoryStore::new();
        store.append(&label("did:plc:a", "did:plc:x", "spam")).await.unwrap();
        let id2 = store.append(&label("did:plc:a", "did:plc:y", "spam")).await.unwrap();
        let rows = store.scan(0).await.unwrap();
        assert_eq!(rows.len(), 2);
        let rows = store.scan(id2 - 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id2);
    }

    #[tokio::test]
    async fn query_filters_by_wildcard_prefix() {
        let store = InMemoryStore::new();
        store.append(&label("did:plc:a", "did:plc:bbb", "spam")).await.unwrap();
        store.append(&label("did:plc:a", "did:plc:bbc", "spam")).await.unwrap();
        store.append(&label("did:plc:a", "did:plc:ccc", "spam")).await.unwrap();

        let params = QueryParams {
            uri_patterns: vec!["did:plc:bb*".to_string()],
            limit: 50,
            ..Default::default()
        };
        let rows = store.query(&params).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.label.uri.starts_with("did:plc:bb")));
    }

    #[tokio::test]
    async fn query_filters_by_source() {
        let store = InMemoryStore::new();
        store.append(&label("did:plc:a", "did:plc:x", "spam")).await.unwrap();
        store.append(&label("did:plc:b", "did:plc:y", "spam")).await.unwrap();

        let params = QueryParams {
            sources: vec!["did:plc:b".to_string()],
            limit: 50,
            ..Default::default()
        };
        let rows = store.query(&params).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label.src, "did:plc:b");
    }
}
