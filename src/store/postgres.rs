//! Postgres-backed [`Store`] implementation — the default deployment
//! backend, adapted from the reference schema in §4.C.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use super::{parse_cts, uri_pattern_to_like, QueryParams, Store, StoreError, StoredLabel};
use crate::labels::Label;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[derive(Debug, Clone, FromRow)]
struct LabelRow {
    id: i64,
    src: String,
    uri: String,
    cid: Option<String>,
    val: String,
    neg: bool,
    cts: chrono::DateTime<chrono::Utc>,
    exp: Option<chrono::DateTime<chrono::Utc>>,
    sig: Vec<u8>,
}

impl LabelRow {
    fn into_stored(self) -> StoredLabel {
        StoredLabel {
            id: self.id,
            label: Label {
                ver: 1,
                src: self.src,
                uri: self.uri,
                cid: self.cid,
                val: self.val,
                neg: if self.neg { Some(true) } else { None },
                cts: self.cts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                exp: self
                    .exp
                    .map(|e| e.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
                sig: bytes::Bytes::from(self.sig),
            },
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS labels (
                id BIGSERIAL PRIMARY KEY,
                src TEXT NOT NULL,
                uri TEXT NOT NULL,
                cid TEXT,
                val TEXT NOT NULL,
                neg BOOLEAN NOT NULL DEFAULT FALSE,
                cts TIMESTAMPTZ NOT NULL,
                exp TIMESTAMPTZ,
                sig BYTEA NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_uri ON labels(uri)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_src ON labels(src)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_val ON labels(val)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn append(&self, label: &Label) -> Result<i64, StoreError> {
        let cts = parse_cts(&label.cts);
        let exp = label.exp.as_deref().map(parse_cts);

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO labels (src, uri, cid, val, neg, cts, exp, sig)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&label.src)
        .bind(&label.uri)
        .bind(&label.cid)
        .bind(&label.val)
        .bind(label.neg.unwrap_or(false))
        .bind(cts)
        .bind(exp)
        .bind(label.sig.as_ref())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn query(&self, params: &QueryParams) -> Result<Vec<StoredLabel>, StoreError> {
        let like_patterns = params
            .uri_patterns
            .iter()
            .map(|p| uri_pattern_to_like(p))
            .collect::<Result<Vec<_>, _>>()?;
        // `None` entries mean "no filter" (the bare `*` pattern); if any
        // pattern is unconditional the whole OR-group is unconditional.
        let unconditional = like_patterns.iter().any(|p| p.is_none());
        let like_patterns: Vec<String> = like_patterns.into_iter().flatten().collect();

        let mut conditions = Vec::new();
        let mut binds_uri: Vec<String> = Vec::new();
        let mut param_idx = 1;

        if !unconditional && !like_patterns.is_empty() {
            let clauses: Vec<String> = like_patterns
                .iter()
                .map(|_| {
                    let idx = param_idx;
                    param_idx += 1;
                    format!("uri LIKE ${idx} ESCAPE '\\'")
                })
                .collect();
            conditions.push(format!("({})", clauses.join(" OR ")));
            binds_uri = like_patterns;
        }

        let mut binds_src: Vec<String> = Vec::new();
        if !params.sources.is_empty() {
            let placeholders: Vec<String> = params
                .sources
                .iter()
                .map(|_| {
                    let idx = param_idx;
                    param_idx += 1;
                    format!("${idx}")
                })
                .collect();
            conditions.push(format!("src IN ({})", placeholders.join(", ")));
            binds_src = params.sources.clone();
        }

        if params.after_id > 0 {
            conditions.push(format!("id > ${param_idx}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = if params.limit > 0 { params.limit } else { 50 };
        let sql = format!(
            "SELECT id, src, uri, cid, val, neg, cts, exp, sig FROM labels {where_clause} ORDER BY id ASC LIMIT {limit}"
        );

        let mut q = sqlx::query_as::<_, LabelRow>(&sql);
        for pattern in &binds_uri {
            q = q.bind(pattern);
        }
        for src in &binds_src {
            q = q.bind(src);
        }
        if params.after_id > 0 {
            q = q.bind(params.after_id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(LabelRow::into_stored).collect())
    }

    async fn scan(&self, after_id: i64) -> Result<Vec<StoredLabel>, StoreError> {
        let rows: Vec<LabelRow> = sqlx::query_as(
            r#"
            SELECT id, src, uri, cid, val, neg, cts, exp, sig
            FROM labels
            WHERE id > $1
            ORDER BY id ASC
            "#,
        )
        .bind(after_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LabelRow::into_stored).collect())
    }

    async fn max_id(&self) -> Result<i64, StoreError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM labels")
            .fetch_one(&self.pool)
            .await?;
        Ok(id.unwrap_or(0))
    }
}
