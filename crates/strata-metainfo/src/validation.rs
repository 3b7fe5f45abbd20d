//! Request validation.
//!
//! Pure checks on client-supplied values. Every failure is an
//! `InvalidArgument` unless the caller decides otherwise.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use strata_core::{
    MetainfoError, NodeId, OrderLimit, Pointer, PointerKind, RedundancyScheme, RemotePiece, Result,
    RsConfig,
};
use strata_signature::{verify_piece_hash, PeerIdentity};

use crate::collaborators::OrderLimits;

/// Check a bucket name against the naming rules.
///
/// 3 to 63 bytes of dot-separated labels made of lowercase letters, digits
/// and hyphens; labels cannot start or end with a hyphen; the whole name
/// cannot look like an IPv4 address.
pub fn validate_bucket(bucket: &[u8]) -> Result<()> {
    if bucket.is_empty() {
        return Err(MetainfoError::invalid_argument("no bucket specified"));
    }
    if bucket.len() < 3 || bucket.len() > 63 {
        return Err(MetainfoError::invalid_argument(
            "bucket name must be at least 3 and no more than 63 characters long",
        ));
    }
    for label in bucket.split(|b| *b == b'.') {
        validate_bucket_label(label)?;
    }
    if is_ipv4(bucket) {
        return Err(MetainfoError::invalid_argument(
            "bucket name cannot be formatted as an IP address",
        ));
    }
    Ok(())
}

fn validate_bucket_label(label: &[u8]) -> Result<()> {
    let (Some(first), Some(last)) = (label.first(), label.last()) else {
        return Err(MetainfoError::invalid_argument(
            "bucket label cannot be empty",
        ));
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(MetainfoError::invalid_argument(
            "bucket label must start with a lowercase letter or number",
        ));
    }
    if *last == b'-' {
        return Err(MetainfoError::invalid_argument(
            "bucket label cannot start or end with a hyphen",
        ));
    }
    if label
        .iter()
        .any(|b| !b.is_ascii_lowercase() && !b.is_ascii_digit() && *b != b'-')
    {
        return Err(MetainfoError::invalid_argument(
            "bucket name must contain only lowercase letters, numbers or hyphens",
        ));
    }
    Ok(())
}

fn is_ipv4(bucket: &[u8]) -> bool {
    let parts: Vec<&[u8]> = bucket.split(|b| *b == b'.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            std::str::from_utf8(part)
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .is_some()
        })
}

/// Check a client-supplied redundancy scheme.
///
/// The scheme must be well formed. With `enforce` set it must also match the
/// satellite's configured scheme exactly.
pub fn validate_redundancy(scheme: &RedundancyScheme, required: &RsConfig, enforce: bool) -> Result<()> {
    scheme.validate()?;
    if !enforce {
        return Ok(());
    }

    let want = required.scheme();
    if want.share_size != scheme.share_size
        || want.total != scheme.total
        || want.required != scheme.required
        || want.repair != scheme.repair
        || want.success != scheme.success
    {
        return Err(MetainfoError::invalid_argument(format!(
            "provided redundancy scheme parameters not allowed: want [{}, {}, {}, {}, {}] got [{}, {}, {}, {}, {}]",
            want.required,
            want.repair,
            want.success,
            want.total,
            want.share_size,
            scheme.required,
            scheme.repair,
            scheme.success,
            scheme.total,
            scheme.share_size,
        )));
    }
    Ok(())
}

/// Why a single piece's hash was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceHashError {
    /// Upload result carried no hash
    #[error("no piece hash, removing from pointer {node} ({piece_num})")]
    Missing {
        /// Node that uploaded the piece
        node: NodeId,
        /// Piece number
        piece_num: u16,
    },
    /// Node signature did not verify
    #[error("piece hash signature could not be verified for node {node}: {reason}")]
    Signature {
        /// Node that uploaded the piece
        node: NodeId,
        /// Verification failure
        reason: String,
    },
    /// Hash was signed too long ago
    #[error("piece hash timestamp is too old ({timestamp}), removing from pointer {node} (num: {piece_num})")]
    TooOld {
        /// Signing time
        timestamp: DateTime<Utc>,
        /// Node that uploaded the piece
        node: NodeId,
        /// Piece number
        piece_num: u16,
    },
    /// Hash covers a different piece than the order limit
    #[error("piece hash pieceID ({hash_piece_id}) doesn't match limit pieceID ({limit_piece_id}). NodeID: {node}, PieceNum: {piece_num}")]
    PieceIdMismatch {
        /// Piece id in the hash
        hash_piece_id: strata_core::PieceId,
        /// Piece id in the order limit
        limit_piece_id: strata_core::PieceId,
        /// Node that uploaded the piece
        node: NodeId,
        /// Piece number
        piece_num: u16,
    },
    /// Node reports more bytes than it was allowed to store
    #[error("piece hash PieceSize ({piece_size}) is larger than order limit ({limit}). NodeID: {node}, PieceNum: {piece_num}")]
    TooLarge {
        /// Reported size
        piece_size: i64,
        /// Allowed size
        limit: i64,
        /// Node that uploaded the piece
        node: NodeId,
        /// Piece number
        piece_num: u16,
    },
}

/// Check a storage node's receipt for one piece.
pub fn validate_piece_hash(
    piece: &RemotePiece,
    limit: &OrderLimit,
    peer: &PeerIdentity,
    now: DateTime<Utc>,
    expiration: Duration,
) -> std::result::Result<(), PieceHashError> {
    let Some(hash) = piece.hash.as_ref() else {
        return Err(PieceHashError::Missing {
            node: piece.node_id,
            piece_num: piece.piece_num,
        });
    };

    verify_piece_hash(&peer.verifying_key, hash).map_err(|e| PieceHashError::Signature {
        node: piece.node_id,
        reason: e.to_string(),
    })?;

    if hash.timestamp < now - expiration {
        return Err(PieceHashError::TooOld {
            timestamp: hash.timestamp,
            node: piece.node_id,
            piece_num: piece.piece_num,
        });
    }

    if limit.piece_id != hash.piece_id {
        return Err(PieceHashError::PieceIdMismatch {
            hash_piece_id: hash.piece_id,
            limit_piece_id: limit.piece_id,
            node: piece.node_id,
            piece_num: piece.piece_num,
        });
    }
    if limit.limit < hash.piece_size {
        return Err(PieceHashError::TooLarge {
            piece_size: hash.piece_size,
            limit: limit.limit,
            node: piece.node_id,
            piece_num: piece.piece_num,
        });
    }
    Ok(())
}

/// Bounds a committed pointer must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerPolicy {
    /// Largest accepted encrypted segment size
    pub max_segment_size: i64,
    /// Longest accepted delay between order creation and commit
    pub max_commit_interval: Duration,
}

/// Structural checks on a pointer about to be committed.
///
/// Remote pointers must carry one original order limit per erasure share,
/// and each piece must match its limit: satellite signature, freshness,
/// derived piece id, storage node. Piece numbers and nodes are unique.
pub async fn validate_pointer(
    pointer: &Pointer,
    original_limits: &[Option<OrderLimit>],
    orders: &dyn OrderLimits,
    policy: &PointerPolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    if pointer.kind == PointerKind::Inline {
        if pointer.remote.is_some() {
            return Err(MetainfoError::invalid_argument(
                "pointer type is INLINE but remote segment is set",
            ));
        }
        return Ok(());
    }

    let Some(remote) = pointer.remote.as_ref() else {
        return Err(MetainfoError::invalid_argument(
            "no remote segment specified",
        ));
    };
    if remote.remote_pieces.is_empty() {
        return Err(MetainfoError::invalid_argument(
            "no remote segment pieces specified",
        ));
    }
    remote.redundancy.validate()?;

    if original_limits.is_empty() {
        return Err(MetainfoError::invalid_argument("no order limits"));
    }
    if original_limits.len() != usize::from(remote.redundancy.total) {
        return Err(MetainfoError::invalid_argument(
            "invalid no order limit for piece",
        ));
    }

    if pointer.segment_size > policy.max_segment_size || pointer.segment_size < 0 {
        return Err(MetainfoError::invalid_argument(format!(
            "segment size {} is out of range, maximum allowed is {}",
            pointer.segment_size, policy.max_segment_size
        )));
    }

    let mut piece_nums = HashSet::new();
    let mut node_ids = HashSet::new();
    for piece in &remote.remote_pieces {
        let Some(slot) = original_limits.get(usize::from(piece.piece_num)) else {
            return Err(MetainfoError::invalid_argument("invalid piece number"));
        };
        let Some(limit) = slot.as_ref() else {
            return Err(MetainfoError::invalid_argument(
                "empty order limit for piece",
            ));
        };

        orders
            .verify_order_limit_signature(limit)
            .await
            .map_err(|e| {
                MetainfoError::invalid_argument(format!(
                    "order limit signature verification failed: {}",
                    e.message()
                ))
            })?;

        if now - limit.order_creation > policy.max_commit_interval {
            return Err(MetainfoError::invalid_argument(format!(
                "Segment not committed before max commit interval of {} minutes.",
                policy.max_commit_interval.num_minutes()
            )));
        }

        let derived = remote.root_piece_id.derive(&piece.node_id, piece.piece_num);
        if limit.piece_id.is_zero() || limit.piece_id != derived {
            return Err(MetainfoError::invalid_argument(
                "invalid order limit piece id",
            ));
        }
        if piece.node_id != limit.storage_node_id {
            return Err(MetainfoError::invalid_argument(
                "piece NodeID != order limit NodeID",
            ));
        }

        if !piece_nums.insert(piece.piece_num) {
            return Err(MetainfoError::invalid_argument(format!(
                "piece num {} is duplicated",
                piece.piece_num
            )));
        }
        if !node_ids.insert(piece.node_id) {
            return Err(MetainfoError::invalid_argument(format!(
                "node id {} for piece num {} is duplicated",
                piece.node_id, piece.piece_num
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ed25519_dalek::SigningKey;
    use strata_core::{PieceHash, PieceId, StatusCode};
    use strata_signature::{sign_piece_hash, FullIdentity};

    #[test]
    fn test_valid_bucket_names() {
        for name in ["abc", "photos", "my-bucket", "a.b.c", "123", "bucket.2024", "x1-y2.z3"] {
            assert!(validate_bucket(name.as_bytes()).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        let long = "a".repeat(64);
        for name in [
            "",
            "ab",
            long.as_str(),
            "Photos",
            "-abc",
            "abc-",
            "a..b",
            ".abc",
            "ab_c",
            "abc-.def",
            "192.168.1.1",
        ] {
            let err = validate_bucket(name.as_bytes()).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::InvalidArgument, "{name}");
        }
    }

    #[test]
    fn test_ip_like_but_not_ip_is_allowed() {
        assert!(validate_bucket(b"192.168.1.300").is_ok());
        assert!(validate_bucket(b"1.2.3").is_ok());
    }

    #[test]
    fn test_validate_redundancy() {
        let config = RsConfig::development();
        let matching = config.scheme();
        assert!(validate_redundancy(&matching, &config, true).is_ok());

        let other = RedundancyScheme::reed_solomon(2, 3, 4, 5, 256);
        assert!(validate_redundancy(&other, &config, false).is_ok());
        let err = validate_redundancy(&other, &config, true).unwrap_err();
        assert!(err.message().contains("not allowed"));

        let broken = RedundancyScheme::reed_solomon(5, 3, 4, 5, 256);
        assert!(validate_redundancy(&broken, &config, false).is_err());
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn fixture() -> (FullIdentity, RemotePiece, OrderLimit) {
        let node = FullIdentity::from_signing_key(SigningKey::from_bytes(&[7; 32]));
        let piece_id = PieceId::from_bytes([9; 32]);
        let mut hash = PieceHash {
            piece_id,
            hash: vec![0xAB; 32],
            piece_size: 256,
            timestamp: t0(),
            signature: Vec::new(),
        };
        sign_piece_hash(&node.signing_key, &mut hash).unwrap();
        let piece = RemotePiece {
            piece_num: 2,
            node_id: node.id,
            hash: Some(hash),
        };
        let limit = OrderLimit {
            serial_number: strata_core::SerialNumber::from_bytes([1; 16]),
            satellite_id: NodeId::from_bytes([1; 32]),
            storage_node_id: node.id,
            piece_id,
            limit: 512,
            action: strata_core::PieceAction::Put,
            piece_expiration: None,
            order_expiration: t0() + Duration::days(1),
            order_creation: t0(),
            satellite_signature: Vec::new(),
        };
        (node, piece, limit)
    }

    #[test]
    fn test_piece_hash_accepted() {
        let (node, piece, limit) = fixture();
        assert!(validate_piece_hash(&piece, &limit, &node.peer(), t0(), Duration::hours(24)).is_ok());
    }

    #[test]
    fn test_piece_hash_rejections() {
        let (node, piece, limit) = fixture();
        let peer = node.peer();
        let day = Duration::hours(24);

        let mut missing = piece.clone();
        missing.hash = None;
        assert!(matches!(
            validate_piece_hash(&missing, &limit, &peer, t0(), day),
            Err(PieceHashError::Missing { piece_num: 2, .. })
        ));

        let stranger = FullIdentity::from_signing_key(SigningKey::from_bytes(&[8; 32])).peer();
        assert!(matches!(
            validate_piece_hash(&piece, &limit, &stranger, t0(), day),
            Err(PieceHashError::Signature { .. })
        ));

        assert!(matches!(
            validate_piece_hash(&piece, &limit, &peer, t0() + Duration::hours(25), day),
            Err(PieceHashError::TooOld { .. })
        ));

        let mut other_piece = limit.clone();
        other_piece.piece_id = PieceId::from_bytes([3; 32]);
        assert!(matches!(
            validate_piece_hash(&piece, &other_piece, &peer, t0(), day),
            Err(PieceHashError::PieceIdMismatch { .. })
        ));

        let mut small = limit.clone();
        small.limit = 100;
        let err = validate_piece_hash(&piece, &small, &peer, t0(), day).unwrap_err();
        assert!(err.to_string().contains("is larger than order limit (100)"));
    }
}
