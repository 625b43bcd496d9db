//! Wire framing for the subscription stream (§4.H).
//!
//! A frame is two deterministically-encoded CBOR objects concatenated: a
//! header naming the frame kind, followed by a body. Message frames carry
//! `{op: 1, t: "#labels"}` headers; error frames carry `{op: -1}` headers.
//! Both travel as a single binary WebSocket message (header bytes directly
//! followed by body bytes).

use serde::Serialize;

use crate::labels::Label;

#[derive(Serialize)]
struct MessageHeader {
    op: i8,
    t: &'static str,
}

#[derive(Serialize)]
struct ErrorHeader {
    op: i8,
}

#[derive(Serialize)]
struct LabelsBody {
    seq: i64,
    labels: Vec<Label>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_ipld_dagcbor::EncodeError<std::collections::TryReserveError>),
}

/// Encode a `#labels` message frame carrying a single sequence entry.
pub fn encode_labels(seq: i64, labels: Vec<Label>) -> Result<Vec<u8>, FrameError> {
    let header = MessageHeader {
        op: 1,
        t: "#labels",
    };
    let body = LabelsBody { seq, labels };
    concat_frame(&header, &body)
}

/// Encode an error frame.
pub fn encode_error(kind: &str, message: &str) -> Result<Vec<u8>, FrameError> {
    let header = ErrorHeader { op: -1 };
    let body = ErrorBody {
        error: kind,
        message,
    };
    concat_frame(&header, &body)
}

fn concat_frame<H: Serialize, B: Serialize>(header: &H, body: &B) -> Result<Vec<u8>, FrameError> {
    let mut out = serde_ipld_dagcbor::to_vec(header)?;
    out.extend(serde_ipld_dagcbor::to_vec(body)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Draft;
    use k256::ecdsa::SigningKey;

    fn key() -> SigningKey {
        SigningKey::from_slice(&[0x22u8; 32]).unwrap()
    }

    #[test]
    fn message_frame_is_nonempty_and_deterministic() {
        let label = Draft::new("did:plc:a", "did:plc:x", "spam")
            .sign(&key())
            .unwrap();
        let a = encode_labels(1, vec![label.clone()]).unwrap();
        let b = encode_labels(1, vec![label]).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn error_frame_encodes() {
        let bytes = encode_error("FutureCursor", "cursor exceeds current maximum id").unwrap();
        assert!(!bytes.is_empty());
    }
}
