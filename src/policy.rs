//! Authorization policy for the emit endpoint (§4.G).
//!
//! Separated from [`crate::auth`] so deployments can authorize a wider set
//! of callers than "the labeler's own DID" without touching JWT
//! verification itself.

use async_trait::async_trait;

#[async_trait]
pub trait AuthPolicy: Send + Sync {
    /// Whether `did` (the JWT's verified issuer) may call the emit
    /// endpoint.
    async fn allows(&self, did: &str) -> bool;
}

/// The default policy: only the labeler may emit events against its own
/// log, matching a single-operator deployment.
pub struct SameAsLabelerPolicy {
    labeler_did: String,
}

impl SameAsLabelerPolicy {
    pub fn new(labeler_did: impl Into<String>) -> Self {
        Self {
            labeler_did: labeler_did.into(),
        }
    }
}

#[async_trait]
impl AuthPolicy for SameAsLabelerPolicy {
    async fn allows(&self, did: &str) -> bool {
        did == self.labeler_did
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_only_the_labeler_did() {
        let policy = SameAsLabelerPolicy::new("did:web:labeler.example");
        assert!(policy.allows("did:web:labeler.example").await);
        assert!(!policy.allows("did:plc:someoneelse").await);
    }
}
