//! ATProto label types, deterministic encoding, and signing.
//!
//! Labels are signed metadata tags applied to ATProto resources. This module
//! implements the com.atproto.label.defs#label schema: the deterministic
//! binary encoding used for signing (§4.B) and the display form used on the
//! wire.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use k256::ecdsa::{signature::Signer, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// ATProto label as defined in com.atproto.label.defs#label.
///
/// `sig` is always populated on a [`Label`] returned from any public
/// accessor — labels without a signature are represented as [`Draft`]
/// until they're signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub ver: i64,
    pub src: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    pub val: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neg: Option<bool>,
    pub cts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    #[serde(with = "sig_bytes")]
    pub sig: Bytes,
}

/// A label before it has been signed. Produced by the sequencer from a
/// caller-supplied draft, defaulting `src`/`cts` and stripping nullish
/// fields per §4.D.
#[derive(Debug, Clone)]
pub struct Draft {
    pub src: String,
    pub uri: String,
    pub cid: Option<String>,
    pub val: String,
    pub neg: Option<bool>,
    pub cts: String,
    pub exp: Option<String>,
}

impl Draft {
    pub fn new(src: impl Into<String>, uri: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            uri: uri.into(),
            cid: None,
            val: val.into(),
            neg: None,
            cts: now_iso8601(),
            exp: None,
        }
    }

    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    pub fn with_exp(mut self, exp: impl Into<String>) -> Self {
        self.exp = Some(exp.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.neg = Some(true);
        self
    }

    /// Sign this draft with a secp256k1 key, producing a complete [`Label`].
    ///
    /// 1. Encode the non-signature fields deterministically (DAG-CBOR,
    ///    canonical key order, no indefinite-length items).
    /// 2. Sign the SHA-256 digest of those bytes with low-S normalization.
    /// 3. Attach the raw 64-byte signature.
    pub fn sign(self, signing_key: &SigningKey) -> Result<Label, LabelError> {
        let payload = SignablePayload::from(&self);
        let cbor_bytes = serde_ipld_dagcbor::to_vec(&payload).map_err(LabelError::Encode)?;

        let signature: Signature = signing_key.sign(&cbor_bytes);
        let signature = signature.normalize_s().unwrap_or(signature);

        Ok(Label {
            ver: 1,
            src: self.src,
            uri: self.uri,
            cid: self.cid,
            val: self.val,
            neg: self.neg,
            cts: self.cts,
            exp: self.exp,
            sig: Bytes::copy_from_slice(&signature.to_bytes()),
        })
    }
}

pub fn now_iso8601() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// The deterministic, signature-free encoding of a label (§4.B, invariants
/// 4 and 6). Absent optional fields are omitted rather than nulled; `neg`
/// is only present when `true`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignablePayload<'a> {
    ver: i64,
    src: &'a str,
    uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cid: Option<&'a str>,
    val: &'a str,
    #[serde(skip_serializing_if = "is_not_true")]
    neg: Option<bool>,
    cts: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<&'a str>,
}

fn is_not_true(neg: &Option<bool>) -> bool {
    !matches!(neg, Some(true))
}

impl<'a> From<&'a Draft> for SignablePayload<'a> {
    fn from(d: &'a Draft) -> Self {
        Self {
            ver: 1,
            src: &d.src,
            uri: &d.uri,
            cid: d.cid.as_deref(),
            val: &d.val,
            neg: d.neg,
            cts: &d.cts,
            exp: d.exp.as_deref(),
        }
    }
}

impl<'a> From<&'a Label> for SignablePayload<'a> {
    fn from(l: &'a Label) -> Self {
        Self {
            ver: 1,
            src: &l.src,
            uri: &l.uri,
            cid: l.cid.as_deref(),
            val: &l.val,
            neg: l.neg,
            cts: &l.cts,
            exp: l.exp.as_deref(),
        }
    }
}

impl Label {
    /// Re-encode the non-signature fields and return the bytes that were
    /// signed over. Used by the self-check verify path and by tests.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, LabelError> {
        let payload = SignablePayload::from(self);
        serde_ipld_dagcbor::to_vec(&payload).map_err(LabelError::Encode)
    }

    /// Verify `sig` against `verifying_key` over the deterministic
    /// re-encoding of the other fields (invariant 6, testable property 2).
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), LabelError> {
        use k256::ecdsa::signature::Verifier;
        let bytes = self.signable_bytes()?;
        let signature = Signature::from_slice(&self.sig)
            .map_err(|e| LabelError::InvalidSignature(e.to_string()))?;
        verifying_key
            .verify(&bytes, &signature)
            .map_err(|e| LabelError::InvalidSignature(e.to_string()))
    }
}

/// Serializes `sig` as a raw CBOR byte string on binary (DAG-CBOR) wires
/// and as the IPLD `{ "$bytes": "<base64>" }` typed wrapper on
/// human-readable (JSON) wires, mirroring how IPLD bridges bytes into JSON.
mod sig_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    #[derive(Serialize, Deserialize)]
    struct BytesWrapper {
        #[serde(rename = "$bytes")]
        bytes: String,
    }

    pub fn serialize<S>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            BytesWrapper {
                bytes: STANDARD.encode(value.as_ref()),
            }
            .serialize(serializer)
        } else {
            serde_bytes::Bytes::new(value.as_ref()).serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let wrapper = BytesWrapper::deserialize(deserializer)?;
            let raw = STANDARD
                .decode(wrapper.bytes.as_bytes())
                .map_err(serde::de::Error::custom)?;
            Ok(Bytes::from(raw))
        } else {
            let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
            Ok(Bytes::from(buf.into_vec()))
        }
    }
}

/// Label-related errors.
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("failed to encode label: {0}")]
    Encode(#[from] serde_ipld_dagcbor::EncodeError<std::collections::TryReserveError>),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Holds the labeler's signing key and DID; the only component permitted
/// to produce signatures (§3 Ownership).
#[derive(Clone)]
pub struct LabelSigner {
    signing_key: SigningKey,
    labeler_did: String,
}

impl LabelSigner {
    /// Parse a 32-byte secp256k1 private key from hex or base64.
    ///
    /// Rejects any input presented as a `did:key:...` — that is a *public*
    /// key and can never be a valid signing key.
    pub fn from_str_key(raw_key: &str, labeler_did: impl Into<String>) -> Result<Self, LabelError> {
        if raw_key.starts_with("did:key:") {
            return Err(LabelError::InvalidKey(
                "signing key must be a raw private key, not a did:key public key".to_string(),
            ));
        }

        let key_bytes = hex::decode(raw_key).or_else(|_| {
            base64::engine::general_purpose::STANDARD
                .decode(raw_key)
                .map_err(|e| format!("not valid hex or base64: {e}"))
        });
        let key_bytes = key_bytes.map_err(LabelError::InvalidKey)?;

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| LabelError::InvalidKey(format!("invalid key bytes: {e}")))?;

        Ok(Self {
            signing_key,
            labeler_did: labeler_did.into(),
        })
    }

    pub fn did(&self) -> &str {
        &self.labeler_did
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    pub fn sign(&self, draft: Draft) -> Result<Label, LabelError> {
        draft.sign(&self.signing_key)
    }
}
