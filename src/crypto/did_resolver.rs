//! DID-document resolution with a TTL cache and forced-refresh support
//! (§4.A, §5, Design Note: "process-wide DID/key cache").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use super::didkey::{self, KeyType};

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DidResolveError {
    #[error("unsupported did method: {0}")]
    UnsupportedMethod(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("no atproto verification method found in did document")]
    NoAtprotoKey,

    #[error("invalid key encoding: {0}")]
    InvalidKey(#[from] didkey::DidKeyError),
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key_type: KeyType,
    pub pubkey: Vec<u8>,
}

#[derive(Deserialize)]
struct DidDocument {
    #[serde(rename = "verificationMethod", default)]
    verification_method: Vec<VerificationMethod>,
}

#[derive(Deserialize)]
struct VerificationMethod {
    id: String,
    #[serde(rename = "publicKeyMultibase")]
    public_key_multibase: Option<String>,
}

/// Mutex-guarded, TTL-expiring DID→key cache shared across the service.
pub struct DidCache {
    http: reqwest::Client,
    entries: Mutex<HashMap<String, (ResolvedKey, Instant)>>,
}

impl DidCache {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("failed to build did resolver http client"),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a DID to its `#atproto` signing key. Cached positive results
    /// are reused for up to [`CACHE_TTL`]; `force` bypasses and replaces
    /// the cached entry.
    pub async fn resolve(&self, did: &str, force: bool) -> Result<ResolvedKey, DidResolveError> {
        if !force {
            let entries = self.entries.lock().await;
            if let Some((key, expires_at)) = entries.get(did) {
                if Instant::now() < *expires_at {
                    return Ok(key.clone());
                }
            }
        }

        let key = self.fetch(did).await?;
        let mut entries = self.entries.lock().await;
        entries.insert(did.to_string(), (key.clone(), Instant::now() + CACHE_TTL));
        Ok(key)
    }

    async fn fetch(&self, did: &str) -> Result<ResolvedKey, DidResolveError> {
        let url = resolve_url(did)?;
        let doc: DidDocument = self.http.get(&url).send().await?.json().await?;

        let method = doc
            .verification_method
            .into_iter()
            .find(|m| m.id == format!("{did}#atproto") || m.id == "#atproto")
            .ok_or(DidResolveError::NoAtprotoKey)?;

        let multibase = method
            .public_key_multibase
            .ok_or(DidResolveError::NoAtprotoKey)?;

        let (key_type, pubkey) = didkey::decode(&format!("did:key:{multibase}"))?;
        Ok(ResolvedKey { key_type, pubkey })
    }
}

impl Default for DidCache {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_url(did: &str) -> Result<String, DidResolveError> {
    if let Some(id) = did.strip_prefix("did:plc:") {
        Ok(format!("https://plc.directory/did:plc:{id}"))
    } else if let Some(host) = did.strip_prefix("did:web:") {
        Ok(format!("https://{host}/.well-known/did.json"))
    } else {
        Err(DidResolveError::UnsupportedMethod(did.to_string()))
    }
}
