//! `tools.ozone.moderation.emitEvent` (§4.G).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::AppError;
use crate::labels::now_iso8601;
use crate::state::AppState;

const LXM: &str = "tools.ozone.moderation.emitEvent";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEventLabel {
    #[serde(rename = "$type")]
    pub type_: String,
    #[serde(default)]
    pub create_label_vals: Vec<String>,
    #[serde(default)]
    pub negate_label_vals: Vec<String>,
}

/// The request body's subject, deserialized leniently: an unrecognized
/// `$type` must surface as `InvalidRequest` (§4.G step 5), not a generic
/// JSON-extractor rejection, so the `$type` tag is captured as a plain
/// string rather than dispatched by serde's enum tagging.
#[derive(Debug, Deserialize)]
pub struct RawSubject {
    #[serde(rename = "$type")]
    pub type_: String,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
}

pub enum Subject {
    RepoRef { did: String },
    StrongRef { uri: String, cid: String },
}

impl TryFrom<RawSubject> for Subject {
    type Error = AppError;

    fn try_from(raw: RawSubject) -> Result<Self, AppError> {
        match raw.type_.as_str() {
            "com.atproto.admin.defs#repoRef" => {
                let did = raw.did.ok_or_else(|| {
                    AppError::InvalidRequest("repoRef subject missing did".to_string())
                })?;
                Ok(Subject::RepoRef { did })
            }
            "com.atproto.repo.strongRef" => {
                let uri = raw.uri.ok_or_else(|| {
                    AppError::InvalidRequest("strongRef subject missing uri".to_string())
                })?;
                let cid = raw.cid.ok_or_else(|| {
                    AppError::InvalidRequest("strongRef subject missing cid".to_string())
                })?;
                Ok(Subject::StrongRef { uri, cid })
            }
            other => Err(AppError::InvalidRequest(format!(
                "unsupported subject $type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitEventRequest {
    pub event: ModEventLabel,
    pub subject: RawSubject,
    #[serde(default)]
    pub subject_blob_cids: Vec<String>,
    pub created_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitEventResponse {
    pub id: i64,
    pub event: ModEventLabelResponse,
    pub subject: SubjectResponse,
    pub subject_blob_cids: Vec<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEventLabelResponse {
    #[serde(rename = "$type")]
    pub type_: String,
    pub create_label_vals: Vec<String>,
    pub negate_label_vals: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "$type")]
pub enum SubjectResponse {
    #[serde(rename = "com.atproto.admin.defs#repoRef")]
    RepoRef { did: String },
    #[serde(rename = "com.atproto.repo.strongRef")]
    StrongRef { uri: String, cid: String },
}

pub async fn emit_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmitEventRequest>,
) -> Result<Json<EmitEventResponse>, AppError> {
    let issuer = auth::verify_bearer(&headers, &state, LXM).await?;

    if !state.policy.allows(&issuer).await {
        return Err(AppError::AuthRequired(format!(
            "{issuer} is not authorized to emit events on this labeler"
        )));
    }

    if request.event.type_ != "tools.ozone.moderation.defs#modEventLabel" {
        return Err(AppError::InvalidRequest(format!(
            "unsupported event type: {}",
            request.event.type_
        )));
    }

    if request.event.create_label_vals.is_empty() && request.event.negate_label_vals.is_empty() {
        return Err(AppError::InvalidRequest(
            "at least one of createLabelVals or negateLabelVals is required".to_string(),
        ));
    }

    let subject: Subject = request.subject.try_into()?;

    let (subject_uri, subject_cid) = match &subject {
        Subject::RepoRef { did } => (did.clone(), None),
        Subject::StrongRef { uri, cid } => (uri.clone(), Some(cid.clone())),
    };

    let stored = state
        .sequencer
        .create_labels(
            &subject_uri,
            subject_cid.as_deref(),
            request.event.create_label_vals.clone(),
            request.event.negate_label_vals.clone(),
        )
        .await?;

    let id = stored.first().map(|s| s.id).unwrap_or(0);

    Ok(Json(EmitEventResponse {
        id,
        event: ModEventLabelResponse {
            type_: request.event.type_,
            create_label_vals: request.event.create_label_vals,
            negate_label_vals: request.event.negate_label_vals,
        },
        subject: match subject {
            Subject::RepoRef { did } => SubjectResponse::RepoRef { did },
            Subject::StrongRef { uri, cid } => SubjectResponse::StrongRef { uri, cid },
        },
        subject_blob_cids: request.subject_blob_cids,
        created_by: request.created_by,
        created_at: now_iso8601(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_ref_subject_converts() {
        let raw = RawSubject {
            type_: "com.atproto.admin.defs#repoRef".to_string(),
            did: Some("did:plc:bbb".to_string()),
            uri: None,
            cid: None,
        };
        let subject: Subject = raw.try_into().unwrap();
        assert!(matches!(subject, Subject::RepoRef { did } if did == "did:plc:bbb"));
    }

    #[test]
    fn strong_ref_subject_converts() {
        let raw = RawSubject {
            type_: "com.atproto.repo.strongRef".to_string(),
            did: None,
            uri: Some("at://did:plc:bbb/app.bsky.feed.post/1".to_string()),
            cid: Some("bafycid".to_string()),
        };
        let subject: Subject = raw.try_into().unwrap();
        assert!(matches!(subject, Subject::StrongRef { uri, cid }
            if uri == "at://did:plc:bbb/app.bsky.feed.post/1" && cid == "bafycid"));
    }

    #[test]
    fn unknown_subject_type_is_invalid_request() {
        let raw = RawSubject {
            type_: "com.atproto.admin.defs#somethingElse".to_string(),
            did: None,
            uri: None,
            cid: None,
        };
        let err = Subject::try_from(raw).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[test]
    fn repo_ref_subject_missing_did_is_invalid_request() {
        let raw = RawSubject {
            type_: "com.atproto.admin.defs#repoRef".to_string(),
            did: None,
            uri: None,
            cid: None,
        };
        let err = Subject::try_from(raw).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }
}
