//! Segment pointer records.
//!
//! One pointer is stored per segment path. The pointer at the LAST index
//! additionally carries the object's stream metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MetainfoError, NodeId, PieceHash, PieceId, RedundancyScheme, Result};

/// Where a segment's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerKind {
    /// Data stored inside the pointer
    Inline,
    /// Data erasure coded across storage nodes
    Remote,
}

/// One piece of a remote segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePiece {
    /// Position of the piece in the erasure output
    pub piece_num: u16,
    /// Node holding the piece
    pub node_id: NodeId,
    /// Node receipt, present only until commit validation
    pub hash: Option<PieceHash>,
}

/// Piece map of a remote segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSegment {
    /// Root from which every piece id is derived
    pub root_piece_id: PieceId,
    /// Erasure scheme the pieces were produced with
    pub redundancy: RedundancyScheme,
    /// Stored pieces
    pub remote_pieces: Vec<RemotePiece>,
}

/// Durable metadata record for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    /// Inline or remote
    pub kind: PointerKind,
    /// Segment content, inline pointers only
    pub inline_segment: Vec<u8>,
    /// Piece map, remote pointers only
    pub remote: Option<RemoteSegment>,
    /// Plaintext-equivalent size of the segment
    pub segment_size: i64,
    /// When the segment was committed
    pub creation_date: DateTime<Utc>,
    /// When the segment expires, `None` for never
    pub expiration_date: Option<DateTime<Utc>>,
    /// Encrypted client metadata
    pub metadata: Vec<u8>,
    /// Whether piece hashes were checked at commit time
    pub piece_hashes_verified: bool,
}

/// Bytes a pointer accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceUsed {
    /// Declared segment size
    pub segment_size: i64,
    /// Bytes stored across all pieces
    pub total_stored: i64,
}

impl Pointer {
    /// Inline pointer holding `data`.
    pub fn inline(
        data: Vec<u8>,
        creation_date: DateTime<Utc>,
        expiration_date: Option<DateTime<Utc>>,
        metadata: Vec<u8>,
    ) -> Self {
        Self {
            kind: PointerKind::Inline,
            segment_size: data.len() as i64,
            inline_segment: data,
            remote: None,
            creation_date,
            expiration_date,
            metadata,
            piece_hashes_verified: false,
        }
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a stored pointer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| MetainfoError::internal(format!("unable to decode pointer: {e}")))
    }

    /// Remote pieces, empty for inline pointers.
    pub fn pieces(&self) -> &[RemotePiece] {
        self.remote
            .as_ref()
            .map(|remote| remote.remote_pieces.as_slice())
            .unwrap_or_default()
    }

    /// Declared segment size and bytes stored across pieces.
    ///
    /// Remote storage is estimated as `segment_size / k` per piece.
    pub fn space_used(&self) -> SpaceUsed {
        match (self.kind, &self.remote) {
            (PointerKind::Inline, _) => {
                let size = self.inline_segment.len() as i64;
                SpaceUsed {
                    segment_size: size,
                    total_stored: size,
                }
            }
            (PointerKind::Remote, Some(remote)) => {
                let piece_size = self.segment_size / i64::from(remote.redundancy.required.max(1));
                SpaceUsed {
                    segment_size: self.segment_size,
                    total_stored: piece_size * remote.remote_pieces.len() as i64,
                }
            }
            (PointerKind::Remote, None) => SpaceUsed::default(),
        }
    }

    /// True when the stored bytes exceed `(segment_size / k) · n`.
    ///
    /// Pieces beyond the scheme's total can only come from a client and
    /// node agreeing to over-report.
    pub fn exceeds_redundancy_bound(&self) -> bool {
        let Some(remote) = self.remote.as_ref().filter(|_| self.kind == PointerKind::Remote)
        else {
            return false;
        };
        let redundancy = &remote.redundancy;
        let bound = (self.segment_size as f64 / f64::from(redundancy.required))
            * f64::from(redundancy.total);
        self.space_used().total_stored as f64 > bound
    }
}

/// Per-segment encryption key material.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment content key, encrypted with the derived object key
    pub encrypted_key: Vec<u8>,
    /// Nonce used to encrypt the content key
    pub key_nonce: Vec<u8>,
}

impl SegmentMeta {
    /// Encode into a pointer's metadata field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from a pointer's metadata field.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Object-level metadata held by the LAST pointer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamMeta {
    /// Client-encrypted stream info
    pub encrypted_stream_info: Vec<u8>,
    /// Cipher suite identifier
    pub encryption_type: i32,
    /// Encryption block size
    pub encryption_block_size: i32,
    /// Key material of the LAST segment
    pub last_segment_meta: Option<SegmentMeta>,
    /// Segment count including LAST, zero when the client did not disclose it
    pub number_of_segments: i64,
}

impl StreamMeta {
    /// Encode into the LAST pointer's metadata field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the LAST pointer's metadata field.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_pointer(segment_size: i64, pieces: u16) -> Pointer {
        let scheme = RedundancyScheme::reed_solomon(4, 6, 8, 10, 256);
        Pointer {
            kind: PointerKind::Remote,
            inline_segment: Vec::new(),
            remote: Some(RemoteSegment {
                root_piece_id: PieceId::from_bytes([1; 32]),
                redundancy: scheme,
                remote_pieces: (0..pieces)
                    .map(|num| RemotePiece {
                        piece_num: num,
                        node_id: NodeId::from_bytes([num as u8 + 1; 32]),
                        hash: None,
                    })
                    .collect(),
            }),
            segment_size,
            creation_date: Utc::now(),
            expiration_date: None,
            metadata: Vec::new(),
            piece_hashes_verified: false,
        }
    }

    #[test]
    fn test_inline_space_used() {
        let pointer = Pointer::inline(vec![0; 100], Utc::now(), None, Vec::new());
        assert_eq!(
            pointer.space_used(),
            SpaceUsed {
                segment_size: 100,
                total_stored: 100
            }
        );
        assert!(!pointer.exceeds_redundancy_bound());
    }

    #[test]
    fn test_remote_space_used() {
        let pointer = remote_pointer(1000, 8);
        assert_eq!(
            pointer.space_used(),
            SpaceUsed {
                segment_size: 1000,
                total_stored: 250 * 8
            }
        );
        assert!(!pointer.exceeds_redundancy_bound());
    }

    #[test]
    fn test_redundancy_bound_violation() {
        // 12 pieces of a 10-piece scheme
        let pointer = remote_pointer(1000, 12);
        assert!(pointer.exceeds_redundancy_bound());
    }

    #[test]
    fn test_pointer_bytes() {
        let pointer = remote_pointer(1000, 3);
        let decoded = Pointer::from_bytes(&pointer.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, pointer);
        assert!(Pointer::from_bytes(b"garbage").is_err());
    }
}
