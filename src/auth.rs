//! Bearer-token extraction and service-auth verification for protected
//! endpoints (§4.A, §4.G).

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::AppError;
use crate::state::AppState;

/// Extract and verify the caller's service-auth JWT, binding it to
/// `expected_lxm`. Returns the verified issuer DID.
pub async fn verify_bearer(
    headers: &HeaderMap,
    state: &AppState,
    expected_lxm: &str,
) -> Result<String, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthRequired("missing authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or(AppError::MissingJwt)?;

    let claims =
        crate::crypto::jwt::verify(token, &state.labeler_did, expected_lxm, &state.did_cache)
            .await?;

    Ok(claims.iss)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;

    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::crypto::did_resolver::DidCache;
    use crate::labels::LabelSigner;
    use crate::policy::SameAsLabelerPolicy;
    use crate::sequencer::Sequencer;
    use crate::store::memory::InMemoryStore;

    fn test_state() -> AppState {
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        let signer = LabelSigner::from_str_key(
            "1111111111111111111111111111111111111111111111111111111111111111",
            "did:web:labeler.example",
        )
        .unwrap();
        let broadcaster = Arc::new(Broadcaster::new(16));
        AppState {
            labeler_did: Arc::from("did:web:labeler.example"),
            sequencer: Arc::new(Sequencer::new(store.clone(), signer, broadcaster.clone())),
            store,
            broadcaster,
            did_cache: Arc::new(DidCache::new()),
            policy: Arc::new(SameAsLabelerPolicy::new("did:web:labeler.example")),
        }
    }

    #[tokio::test]
    async fn missing_authorization_header_is_auth_required() {
        let state = test_state();
        let headers = HeaderMap::new();
        let err = verify_bearer(&headers, &state, "tools.ozone.moderation.emitEvent")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AuthRequired");
    }

    #[tokio::test]
    async fn non_bearer_authorization_header_is_missing_jwt() {
        let state = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        let err = verify_bearer(&headers, &state, "tools.ozone.moderation.emitEvent")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MissingJwt");
    }
}
