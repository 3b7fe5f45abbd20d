//! Order limits and piece hashes.
//!
//! An order limit is the satellite's signed authorization for one node to
//! perform one action on one piece. A piece hash is the node's signed
//! receipt for a stored piece. Signing lives in `strata-signature`; this
//! module only defines the records and their canonical signing bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NodeId, PieceId, Result, SerialNumber};

/// Action an order limit authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceAction {
    /// Upload a piece
    Put,
    /// Download a piece
    Get,
    /// Delete a piece
    Delete,
    /// Download a piece for repair
    GetRepair,
    /// Upload a repaired piece
    PutRepair,
}

/// Satellite-signed authorization for a single piece action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimit {
    /// Unique serial, also used to correlate legacy segment creation
    pub serial_number: SerialNumber,
    /// Satellite that issued the limit
    pub satellite_id: NodeId,
    /// Node allowed to act on the piece
    pub storage_node_id: NodeId,
    /// Derived id of the piece
    pub piece_id: PieceId,
    /// Maximum bytes the action may transfer
    pub limit: i64,
    /// Authorized action
    pub action: PieceAction,
    /// When the stored piece may be discarded
    pub piece_expiration: Option<DateTime<Utc>>,
    /// When the order can no longer be settled
    pub order_expiration: DateTime<Utc>,
    /// When the limit was created
    pub order_creation: DateTime<Utc>,
    /// Satellite signature over [`OrderLimit::signing_bytes`]
    pub satellite_signature: Vec<u8>,
}

#[derive(Serialize)]
struct UnsignedOrderLimit<'a> {
    serial_number: &'a SerialNumber,
    satellite_id: &'a NodeId,
    storage_node_id: &'a NodeId,
    piece_id: &'a PieceId,
    limit: i64,
    action: PieceAction,
    piece_expiration: &'a Option<DateTime<Utc>>,
    order_expiration: &'a DateTime<Utc>,
    order_creation: &'a DateTime<Utc>,
}

impl OrderLimit {
    /// Canonical bytes covered by the satellite signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = UnsignedOrderLimit {
            serial_number: &self.serial_number,
            satellite_id: &self.satellite_id,
            storage_node_id: &self.storage_node_id,
            piece_id: &self.piece_id,
            limit: self.limit,
            action: self.action,
            piece_expiration: &self.piece_expiration,
            order_expiration: &self.order_expiration,
            order_creation: &self.order_creation,
        };
        Ok(bincode::serialize(&unsigned)?)
    }
}

/// Network address of a storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeAddress {
    /// `host:port` the node listens on
    pub address: String,
}

impl NodeAddress {
    /// Create an address from a `host:port` string.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// An order limit together with where to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedOrderLimit {
    /// The signed limit
    pub limit: OrderLimit,
    /// Address of the node named in the limit
    pub storage_node_address: NodeAddress,
}

/// Node-signed receipt for a stored piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceHash {
    /// Id of the stored piece
    pub piece_id: PieceId,
    /// Content hash of the piece
    pub hash: Vec<u8>,
    /// Bytes stored
    pub piece_size: i64,
    /// When the node produced the receipt
    pub timestamp: DateTime<Utc>,
    /// Node signature over [`PieceHash::signing_bytes`]
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct UnsignedPieceHash<'a> {
    piece_id: &'a PieceId,
    hash: &'a [u8],
    piece_size: i64,
    timestamp: &'a DateTime<Utc>,
}

impl PieceHash {
    /// Canonical bytes covered by the node signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = UnsignedPieceHash {
            piece_id: &self.piece_id,
            hash: &self.hash,
            piece_size: self.piece_size,
            timestamp: &self.timestamp,
        };
        Ok(bincode::serialize(&unsigned)?)
    }
}
