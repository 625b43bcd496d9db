//! `com.atproto.label.queryLabels` (§4.F).

use axum::extract::State;
use axum::Json;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::labels::Label;
use crate::state::AppState;
use crate::store::QueryParams as StoreQueryParams;

const DEFAULT_LIMIT: i64 = 50;
const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 250;

/// Raw query-string parameters. `uriPatterns`/`sources` bind to every
/// repeated occurrence of the key (`uriPatterns=a&uriPatterns=b`), matching
/// the atproto `queryLabels` contract. `limit`/`cursor` arrive as strings so
/// "absent" and "present but not an integer" can be told apart and the
/// latter surfaced as `InvalidRequest`, per §4.F.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParams {
    #[serde(default)]
    pub uri_patterns: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryLabelsResponse {
    pub cursor: String,
    pub labels: Vec<Label>,
}

pub async fn query_labels(
    State(state): State<AppState>,
    Query(params): Query<RawParams>,
) -> Result<Json<QueryLabelsResponse>, AppError> {
    let limit = match params.limit {
        None => DEFAULT_LIMIT,
        Some(raw) => {
            let parsed: i64 = raw
                .parse()
                .map_err(|_| AppError::InvalidRequest(format!("limit is not an integer: {raw}")))?;
            if !(MIN_LIMIT..=MAX_LIMIT).contains(&parsed) {
                return Err(AppError::InvalidRequest(format!(
                    "limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {parsed}"
                )));
            }
            parsed
        }
    };

    let cursor = match params.cursor {
        None => 0,
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::InvalidRequest(format!("cursor is not an integer: {raw}")))?,
    };

    let store_params = StoreQueryParams {
        uri_patterns: params.uri_patterns,
        sources: params.sources,
        after_id: cursor,
        limit,
    };

    let rows = state.store.query(&store_params).await?;
    let next_cursor = rows.last().map(|r| r.id).unwrap_or(0);

    Ok(Json(QueryLabelsResponse {
        cursor: next_cursor.to_string(),
        labels: rows.into_iter().map(|r| r.label).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_out_of_range_is_rejected() {
        let parsed: i64 = "0".parse().unwrap();
        assert!(!(MIN_LIMIT..=MAX_LIMIT).contains(&parsed));
    }

    #[test]
    fn raw_params_default_list_fields_to_empty() {
        let params: RawParams =
            serde_html_form::from_str("limit=50").expect("missing list params should default");
        assert!(params.uri_patterns.is_empty());
        assert!(params.sources.is_empty());
    }

    #[test]
    fn repeated_keys_bind_to_vec() {
        let params: RawParams =
            serde_html_form::from_str("uriPatterns=did:plc:a*&uriPatterns=did:plc:b*")
                .unwrap();
        assert_eq!(params.uri_patterns, vec!["did:plc:a*", "did:plc:b*"]);
    }
}
