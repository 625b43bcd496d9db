//! `did:key:z...` encoding and decoding.
//!
//! A `did:key` is a self-contained DID whose identifier is a multibase
//! (base58btc, `z`-prefixed) encoding of a multicodec-tagged public key.
//! Only the two curves atproto identity keys use are recognized here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    P256,
    Secp256k1,
}

impl KeyType {
    /// Multicodec varint prefix bytes, per §4.A.
    fn multicodec_prefix(self) -> [u8; 2] {
        match self {
            KeyType::P256 => [0x80, 0x24],
            KeyType::Secp256k1 => [0xe7, 0x01],
        }
    }

    fn from_prefix(prefix: [u8; 2]) -> Option<Self> {
        match prefix {
            [0x80, 0x24] => Some(KeyType::P256),
            [0xe7, 0x01] => Some(KeyType::Secp256k1),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DidKeyError {
    #[error("not a did:key: {0}")]
    NotDidKey(String),

    #[error("multibase prefix must be 'z' (base58btc): {0}")]
    UnsupportedMultibase(String),

    #[error("base58 decode failed: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("unrecognized multicodec key type")]
    UnrecognizedKeyType,

    #[error("key too short")]
    TooShort,
}

/// Encode a compressed SEC1 public key as a `did:key:z...` string.
pub fn encode(key_type: KeyType, compressed_pubkey: &[u8]) -> String {
    let prefix = key_type.multicodec_prefix();
    let mut bytes = Vec::with_capacity(2 + compressed_pubkey.len());
    bytes.extend_from_slice(&prefix);
    bytes.extend_from_slice(compressed_pubkey);
    format!("did:key:z{}", bs58::encode(bytes).into_string())
}

/// Decode a `did:key:z...` string into its key type and raw (compressed
/// SEC1) public key bytes.
pub fn decode(did_key: &str) -> Result<(KeyType, Vec<u8>), DidKeyError> {
    let multibase = did_key
        .strip_prefix("did:key:")
        .ok_or_else(|| DidKeyError::NotDidKey(did_key.to_string()))?;

    let b58 = multibase
        .strip_prefix('z')
        .ok_or_else(|| DidKeyError::UnsupportedMultibase(multibase.to_string()))?;

    let bytes = bs58::decode(b58).into_vec()?;
    if bytes.len() < 2 {
        return Err(DidKeyError::TooShort);
    }

    let prefix = [bytes[0], bytes[1]];
    let key_type = KeyType::from_prefix(prefix).ok_or(DidKeyError::UnrecognizedKeyType)?;

    Ok((key_type, bytes[2..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_secp256k1() {
        let pubkey = vec![0x02u8; 33];
        let did = encode(KeyType::Secp256k1, &pubkey);
        assert!(did.starts_with("did:key:z"));
        let (kind, decoded) = decode(&did).unwrap();
        assert_eq!(kind, KeyType::Secp256k1);
        assert_eq!(decoded, pubkey);
    }

    #[test]
    fn round_trips_p256() {
        let pubkey = vec![0x03u8; 33];
        let did = encode(KeyType::P256, &pubkey);
        let (kind, decoded) = decode(&did).unwrap();
        assert_eq!(kind, KeyType::P256);
        assert_eq!(decoded, pubkey);
    }

    #[test]
    fn rejects_non_did_key() {
        assert!(decode("did:plc:aaa").is_err());
    }

    #[test]
    fn rejects_unknown_multicodec() {
        let mut bytes = vec![0x00, 0x00];
        bytes.extend_from_slice(&[0u8; 33]);
        let did = format!("did:key:z{}", bs58::encode(bytes).into_string());
        assert!(matches!(decode(&did), Err(DidKeyError::UnrecognizedKeyType)));
    }
}
