//! `/xrpc/_health` (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct HealthOk {
    version: &'static str,
}

#[derive(Serialize)]
struct HealthErr {
    version: &'static str,
    error: String,
}

pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.max_id().await {
        Ok(_) => (StatusCode::OK, Json(HealthOk { version: VERSION })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthErr {
                version: VERSION,
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}
