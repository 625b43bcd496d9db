//! Unified error taxonomy for the labeler core.
//!
//! Every error surfaced to an HTTP caller or a WebSocket subscriber maps
//! through here, matching one kind string in the taxonomy. HTTP responses
//! carry `{error, message}`; WebSocket errors carry the same pair inside an
//! error frame (see [`crate::frame`]).

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use tracing::error;

/// Error kinds exposed on the wire, independent of transport.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    AuthRequired(String),

    #[error("missing or malformed authorization header")]
    MissingJwt,

    #[error("malformed jwt: {0}")]
    BadJwt(String),

    #[error("jwt has expired")]
    JwtExpired,

    #[error("jwt audience mismatch")]
    BadJwtAudience,

    #[error("jwt lexicon method mismatch")]
    BadJwtLexiconMethod,

    #[error("jwt signature verification failed: {0}")]
    BadJwtSignature(String),

    #[error("cursor exceeds current maximum id")]
    FutureCursor,

    #[error("subscriber could not keep up with the stream")]
    ConsumerTooSlow,

    #[error("method not implemented")]
    MethodNotImplemented,

    #[error("internal server error: {0}")]
    InternalServerError(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// The wire-level kind string, shared between HTTP JSON bodies and
    /// WebSocket error frames.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::AuthRequired(_) => "AuthRequired",
            AppError::MissingJwt => "MissingJwt",
            AppError::BadJwt(_) => "BadJwt",
            AppError::JwtExpired => "JwtExpired",
            AppError::BadJwtAudience => "BadJwtAudience",
            AppError::BadJwtLexiconMethod => "BadJwtLexiconMethod",
            AppError::BadJwtSignature(_) => "BadJwtSignature",
            AppError::FutureCursor => "FutureCursor",
            AppError::ConsumerTooSlow => "ConsumerTooSlow",
            AppError::MethodNotImplemented => "MethodNotImplemented",
            AppError::InternalServerError(_) => "InternalServerError",
            AppError::ServiceUnavailable(_) => "ServiceUnavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            AppError::MissingJwt => StatusCode::UNAUTHORIZED,
            AppError::BadJwt(_)
            | AppError::JwtExpired
            | AppError::BadJwtAudience
            | AppError::BadJwtLexiconMethod
            | AppError::BadJwtSignature(_) => StatusCode::UNAUTHORIZED,
            AppError::FutureCursor => StatusCode::BAD_REQUEST,
            AppError::ConsumerTooSlow => StatusCode::BAD_REQUEST,
            AppError::MethodNotImplemented => StatusCode::NOT_IMPLEMENTED,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(e: crate::store::StoreError) -> Self {
        match e {
            crate::store::StoreError::InvalidPattern(msg) => AppError::InvalidRequest(msg),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<crate::labels::LabelError> for AppError {
    fn from(e: crate::labels::LabelError) -> Self {
        AppError::InternalServerError(e.to_string())
    }
}

impl From<crate::sequencer::SequencerError> for AppError {
    fn from(e: crate::sequencer::SequencerError) -> Self {
        match e {
            crate::sequencer::SequencerError::Label(e) => e.into(),
            crate::sequencer::SequencerError::Store(e) => e.into(),
        }
    }
}

impl From<crate::crypto::jwt::JwtError> for AppError {
    fn from(e: crate::crypto::jwt::JwtError) -> Self {
        use crate::crypto::jwt::JwtError;
        match e {
            JwtError::Malformed(msg) => AppError::BadJwt(msg),
            JwtError::Expired => AppError::JwtExpired,
            JwtError::BadAudience => AppError::BadJwtAudience,
            JwtError::BadLexiconMethod => AppError::BadJwtLexiconMethod,
            JwtError::BadSignature(msg) => AppError::BadJwtSignature(msg),
            JwtError::Resolve(e) => AppError::BadJwtSignature(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(kind = self.kind(), error = %self, "request failed");
        let status = self.status();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
