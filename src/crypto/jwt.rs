//! Service-auth JWT parsing and verification (§4.A, §4.G).
//!
//! Bearer tokens presented to the emit endpoint are signed by the caller's
//! atproto signing key, not by this service. Verification resolves `iss` to
//! a DID document, extracts its `#atproto` key, and checks the signature
//! with the algorithm named in the JWT header (ES256 for P-256, ES256K for
//! secp256k1). A signature failure is retried exactly once against a
//! force-refreshed DID document, covering the case where the caller rotated
//! keys since the document was last cached.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use k256::ecdsa::{signature::Verifier as _, Signature as K256Signature, VerifyingKey as K256VerifyingKey};
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use serde::Deserialize;

use super::did_resolver::{DidCache, DidResolveError};
use super::didkey::KeyType;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("malformed jwt: {0}")]
    Malformed(String),

    #[error("jwt has expired")]
    Expired,

    #[error("jwt audience mismatch")]
    BadAudience,

    #[error("jwt lexicon method mismatch")]
    BadLexiconMethod,

    #[error("jwt signature verification failed: {0}")]
    BadSignature(String),

    #[error("could not resolve issuer did: {0}")]
    Resolve(#[from] DidResolveError),
}

#[derive(Debug, Clone, Deserialize)]
struct JwtHeader {
    alg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub lxm: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

struct SplitJwt<'a> {
    header: JwtHeader,
    claims: Claims,
    signing_input: &'a str,
    signature: Vec<u8>,
}

fn split(token: &str) -> Result<SplitJwt<'_>, JwtError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::Malformed(
            "expected exactly three base64url segments".to_string(),
        ));
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;
    let header: JwtHeader =
        serde_json::from_slice(&header_bytes).map_err(|e| JwtError::Malformed(e.to_string()))?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&claims_bytes).map_err(|e| JwtError::Malformed(e.to_string()))?;

    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;

    let signing_input_len = header_b64.len() + 1 + payload_b64.len();
    let signing_input = &token[..signing_input_len];

    Ok(SplitJwt {
        header,
        claims,
        signing_input,
        signature,
    })
}

fn verify_with_key(parsed: &SplitJwt<'_>, key_type: KeyType, pubkey: &[u8]) -> Result<(), JwtError> {
    match (parsed.header.alg.as_str(), key_type) {
        ("ES256", KeyType::P256) => {
            let key = P256VerifyingKey::from_sec1_bytes(pubkey)
                .map_err(|e| JwtError::BadSignature(e.to_string()))?;
            let sig = P256Signature::from_slice(&parsed.signature)
                .map_err(|e| JwtError::BadSignature(e.to_string()))?;
            key.verify(parsed.signing_input.as_bytes(), &sig)
                .map_err(|e| JwtError::BadSignature(e.to_string()))
        }
        ("ES256K", KeyType::Secp256k1) => {
            let key = K256VerifyingKey::from_sec1_bytes(pubkey)
                .map_err(|e| JwtError::BadSignature(e.to_string()))?;
            let sig = K256Signature::from_slice(&parsed.signature)
                .map_err(|e| JwtError::BadSignature(e.to_string()))?;
            key.verify(parsed.signing_input.as_bytes(), &sig)
                .map_err(|e| JwtError::BadSignature(e.to_string()))
        }
        (alg, _) => Err(JwtError::BadSignature(format!(
            "algorithm {alg} does not match issuer's key type"
        ))),
    }
}

/// Verify a bearer token's signature and claims.
///
/// `expected_aud` is the labeler's own DID; `expected_lxm` is the lexicon
/// method the caller must have bound the token to.
pub async fn verify(
    token: &str,
    expected_aud: &str,
    expected_lxm: &str,
    did_cache: &DidCache,
) -> Result<Claims, JwtError> {
    let parsed = split(token)?;

    if parsed.claims.exp <= chrono::Utc::now().timestamp() {
        return Err(JwtError::Expired);
    }
    if parsed.claims.aud != expected_aud {
        return Err(JwtError::BadAudience);
    }
    if parsed.claims.lxm.as_deref() != Some(expected_lxm) {
        return Err(JwtError::BadLexiconMethod);
    }

    let resolved = did_cache.resolve(&parsed.claims.iss, false).await?;
    match verify_with_key(&parsed, resolved.key_type, &resolved.pubkey) {
        Ok(()) => return Ok(parsed.claims),
        Err(first_err) => {
            let refreshed = did_cache.resolve(&parsed.claims.iss, true).await?;
            verify_with_key(&parsed, refreshed.key_type, &refreshed.pubkey)
                .map_err(|_| first_err)?;
            Ok(parsed.claims)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use k256::ecdsa::{signature::Signer, SigningKey};
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn make_token(signing_key: &SigningKey, claims: serde_json::Value) -> String {
        let header = serde_json::json!({ "alg": "ES256K", "typ": "JWT" });
        let signing_input = format!("{}.{}", encode_segment(&header), encode_segment(&claims));
        let sig: K256Signature = signing_key.sign(signing_input.as_bytes());
        format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(sig.to_bytes())
        )
    }

    #[test]
    fn splits_and_parses_claims() {
        let key = SigningKey::from_slice(&[0x09u8; 32]).unwrap();
        let token = make_token(
            &key,
            serde_json::json!({
                "iss": "did:plc:abc",
                "aud": "did:web:labeler.example",
                "exp": 9_999_999_999i64,
                "lxm": "com.atproto.label.emitEvent",
            }),
        );
        let parsed = split(&token).unwrap();
        assert_eq!(parsed.claims.iss, "did:plc:abc");
        assert_eq!(parsed.header.alg, "ES256K");
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(split("not.enough").is_err());
        assert!(split("a.b.c.d").is_err());
    }

    #[test]
    fn verifies_signature_against_correct_key() {
        let key = SigningKey::from_slice(&[0x09u8; 32]).unwrap();
        let token = make_token(
            &key,
            serde_json::json!({
                "iss": "did:plc:abc",
                "aud": "did:web:labeler.example",
                "exp": 9_999_999_999i64,
                "lxm": "com.atproto.label.emitEvent",
            }),
        );
        let parsed = split(&token).unwrap();
        let pubkey = key.verifying_key().to_encoded_point(true);
        verify_with_key(&parsed, KeyType::Secp256k1, pubkey.as_bytes()).unwrap();
    }

    #[test]
    fn rejects_signature_from_wrong_key() {
        let key = SigningKey::from_slice(&[0x09u8; 32]).unwrap();
        let other = SigningKey::from_slice(&[0x0au8; 32]).unwrap();
        let token = make_token(
            &key,
            serde_json::json!({
                "iss": "did:plc:abc",
                "aud": "did:web:labeler.example",
                "exp": 9_999_999_999i64,
                "lxm": "com.atproto.label.emitEvent",
            }),
        );
        let parsed = split(&token).unwrap();
        let pubkey = other.verifying_key().to_encoded_point(true);
        assert!(verify_with_key(&parsed, KeyType::Secp256k1, pubkey.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn expired_and_wrong_audience_reports_expired() {
        // §4.A steps 3-4: exp is checked before aud, so a token that is both
        // expired and addressed to the wrong audience must fail as
        // `Expired`, not `BadAudience`.
        let key = SigningKey::from_slice(&[0x09u8; 32]).unwrap();
        let token = make_token(
            &key,
            serde_json::json!({
                "iss": "did:plc:abc",
                "aud": "did:web:someone-else.example",
                "exp": 1,
                "lxm": "com.atproto.label.emitEvent",
            }),
        );
        let did_cache = DidCache::new();
        let err = verify(
            &token,
            "did:web:labeler.example",
            "com.atproto.label.emitEvent",
            &did_cache,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JwtError::Expired));
    }
}
