//! Strongly typed identifiers for projects, nodes, pieces and orders.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use uuid::Uuid;

use crate::{MetainfoError, Result};

/// Identifier for a customer project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    /// Create a new random project identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw UUID bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl From<Uuid> for ProjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Identifier for a value-attribution partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(Uuid);

impl PartnerId {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a partner id from its raw 16-byte form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|e| MetainfoError::invalid_argument(format!("invalid partner id: {e}")))
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Identifier for a storage node, the hash of its public identity key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Create a node identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a node identifier from a public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the all-zero identifier.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &hex::encode(self.0)[..12])
    }
}

/// Identifier of a single stored piece.
///
/// Remote segments carry only a root piece id; the id of the piece held by
/// a specific node is derived from the root, the node id and the piece
/// number so the pointer does not have to store one id per piece.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PieceId([u8; 32]);

impl PieceId {
    /// Create a piece id from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a new random piece id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Raw piece id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Derive the id of piece `piece_num` stored on `node`.
    ///
    /// HMAC-SHA512 keyed by the root id over `node ‖ be32(piece_num)`,
    /// truncated to 32 bytes.
    pub fn derive(&self, node: &NodeId, piece_num: u16) -> PieceId {
        // HMAC accepts keys of any length, construction cannot fail
        let mut mac = match <Hmac<Sha512> as Mac>::new_from_slice(&self.0) {
            Ok(mac) => mac,
            Err(_) => unreachable!("hmac key of any length is valid"),
        };
        mac.update(node.as_bytes());
        mac.update(&u32::from(piece_num).to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let mut derived = [0u8; 32];
        derived.copy_from_slice(&digest[..32]);
        PieceId(derived)
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceId({})", &hex::encode(self.0)[..12])
    }
}

/// Serial number of an order limit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SerialNumber([u8; 16]);

impl SerialNumber {
    /// Create a serial number from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a new random serial number.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Raw serial bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_id_derivation_is_deterministic() {
        let root = PieceId::from_bytes([7u8; 32]);
        let node = NodeId::from_bytes([1u8; 32]);

        assert_eq!(root.derive(&node, 3), root.derive(&node, 3));
        assert_ne!(root.derive(&node, 3), root.derive(&node, 4));
        assert_ne!(
            root.derive(&node, 3),
            root.derive(&NodeId::from_bytes([2u8; 32]), 3)
        );
        assert!(!root.derive(&node, 0).is_zero());
    }

    #[test]
    fn test_node_id_from_public_key() {
        let a = NodeId::from_public_key(&[1u8; 32]);
        let b = NodeId::from_public_key(&[2u8; 32]);
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(NodeId::default().is_zero());
    }

    #[test]
    fn test_project_id_display_is_hyphenated() {
        let id = ProjectId::from_uuid(Uuid::nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_partner_id_from_slice() {
        let uuid = Uuid::new_v4();
        let partner = PartnerId::from_slice(uuid.as_bytes()).unwrap();
        assert_eq!(partner.as_uuid(), &uuid);
        assert!(PartnerId::from_slice(&[1, 2, 3]).is_err());
    }
}
