//! Order limit and piece hash signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use strata_core::{MetainfoError, OrderLimit, PieceHash};

const ORDER_LIMIT_DOMAIN: &[u8] = b"strata/order-limit/v1";
const PIECE_HASH_DOMAIN: &[u8] = b"strata/piece-hash/v1";

/// Signature failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Record could not be encoded for signing
    #[error("unable to encode signed record: {0}")]
    Encoding(String),
    /// Signature bytes were not a valid Ed25519 signature
    #[error("malformed signature")]
    Malformed,
    /// Signature did not verify against the key
    #[error("signature verification failed")]
    Invalid,
}

impl From<SignatureError> for MetainfoError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Encoding(message) => MetainfoError::serialization(message),
            other => MetainfoError::invalid_argument(other.to_string()),
        }
    }
}

fn tagged(domain: &[u8], body: Vec<u8>) -> Vec<u8> {
    let mut message = Vec::with_capacity(domain.len() + body.len());
    message.extend_from_slice(domain);
    message.extend_from_slice(&body);
    message
}

fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    let signature = Signature::from_slice(signature).map_err(|_| SignatureError::Malformed)?;
    key.verify(message, &signature)
        .map_err(|_| SignatureError::Invalid)
}

fn order_limit_message(limit: &OrderLimit) -> Result<Vec<u8>, SignatureError> {
    let body = limit
        .signing_bytes()
        .map_err(|e| SignatureError::Encoding(e.to_string()))?;
    Ok(tagged(ORDER_LIMIT_DOMAIN, body))
}

fn piece_hash_message(hash: &PieceHash) -> Result<Vec<u8>, SignatureError> {
    let body = hash
        .signing_bytes()
        .map_err(|e| SignatureError::Encoding(e.to_string()))?;
    Ok(tagged(PIECE_HASH_DOMAIN, body))
}

/// Sign `limit` in place with the satellite key.
pub fn sign_order_limit(key: &SigningKey, limit: &mut OrderLimit) -> Result<(), SignatureError> {
    let message = order_limit_message(limit)?;
    limit.satellite_signature = key.sign(&message).to_bytes().to_vec();
    Ok(())
}

/// Check the satellite signature on `limit`.
pub fn verify_order_limit(key: &VerifyingKey, limit: &OrderLimit) -> Result<(), SignatureError> {
    let message = order_limit_message(limit)?;
    verify(key, &message, &limit.satellite_signature)
}

/// Sign `hash` in place with a storage node key.
pub fn sign_piece_hash(key: &SigningKey, hash: &mut PieceHash) -> Result<(), SignatureError> {
    let message = piece_hash_message(hash)?;
    hash.signature = key.sign(&message).to_bytes().to_vec();
    Ok(())
}

/// Check a storage node's signature on `hash`.
pub fn verify_piece_hash(key: &VerifyingKey, hash: &PieceHash) -> Result<(), SignatureError> {
    let message = piece_hash_message(hash)?;
    verify(key, &message, &hash.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_core::{NodeId, PieceAction, PieceId, SerialNumber};

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn piece_hash() -> PieceHash {
        PieceHash {
            piece_id: PieceId::from_bytes([5; 32]),
            hash: vec![1, 2, 3],
            piece_size: 256,
            timestamp: Utc::now(),
            signature: Vec::new(),
        }
    }

    #[test]
    fn test_piece_hash_signature() {
        let node = key(1);
        let mut hash = piece_hash();
        sign_piece_hash(&node, &mut hash).unwrap();
        assert!(verify_piece_hash(&node.verifying_key(), &hash).is_ok());

        // another node's key
        assert_eq!(
            verify_piece_hash(&key(2).verifying_key(), &hash),
            Err(SignatureError::Invalid)
        );

        // tampered size
        hash.piece_size = 512;
        assert_eq!(
            verify_piece_hash(&node.verifying_key(), &hash),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_missing_signature_is_malformed() {
        let hash = piece_hash();
        assert_eq!(
            verify_piece_hash(&key(1).verifying_key(), &hash),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_order_limit_signature() {
        let satellite = key(9);
        let now = Utc::now();
        let mut limit = OrderLimit {
            serial_number: SerialNumber::from_bytes([1; 16]),
            satellite_id: NodeId::from_bytes([2; 32]),
            storage_node_id: NodeId::from_bytes([3; 32]),
            piece_id: PieceId::from_bytes([4; 32]),
            limit: 1024,
            action: PieceAction::Put,
            piece_expiration: None,
            order_expiration: now,
            order_creation: now,
            satellite_signature: Vec::new(),
        };
        sign_order_limit(&satellite, &mut limit).unwrap();
        assert!(verify_order_limit(&satellite.verifying_key(), &limit).is_ok());

        limit.limit = 1 << 40;
        assert!(verify_order_limit(&satellite.verifying_key(), &limit).is_err());
    }
}
