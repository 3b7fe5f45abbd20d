//! Piece validation engine.
//!
//! Decides which uploaded pieces of a remote segment may be kept. A piece
//! survives only if its node is known, it has an order limit and its hash
//! validates. The survivors must agree on a single piece size matching the
//! erasure arithmetic, and there must be at least `success` of them.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use strata_core::{
    calc_piece_size, MetainfoError, NodeId, OrderLimit, Pointer, PointerKind, RemotePiece, Result,
};
use strata_signature::PeerIdentity;

use crate::collaborators::PeerIdentities;
use crate::validation::validate_piece_hash;

/// A piece dropped during validation and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPiece {
    /// Node that uploaded the piece
    pub node_id: NodeId,
    /// Piece number
    pub piece_num: u16,
    /// Human readable reason
    pub reason: String,
}

/// Replace a remote pointer's pieces with the ones that validate.
///
/// Inline pointers pass through untouched. On failure the pointer is left
/// unchanged and the error lists every rejected piece.
pub async fn filter_valid_pieces(
    pointer: &mut Pointer,
    original_limits: &[Option<OrderLimit>],
    identities: &dyn PeerIdentities,
    hash_expiration: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    if pointer.kind != PointerKind::Remote {
        return Ok(());
    }
    let Some(remote) = pointer.remote.as_ref() else {
        return Ok(());
    };

    let node_ids: Vec<NodeId> = remote.remote_pieces.iter().map(|p| p.node_id).collect();
    let peers = identities.batch_get(&node_ids).await.map_err(|e| {
        tracing::error!(error = %e, "retrieving nodes peer identities");
        MetainfoError::internal("retrieving nodes peer identities")
    })?;
    let peers: HashMap<NodeId, PeerIdentity> = peers.into_iter().map(|p| (p.id, p)).collect();

    let valid = select_valid_pieces(pointer, original_limits, &peers, hash_expiration, now)?;
    if let Some(remote) = pointer.remote.as_mut() {
        remote.remote_pieces = valid;
    }
    Ok(())
}

/// The pieces of `pointer` that pass validation against known `peers`.
pub fn select_valid_pieces(
    pointer: &Pointer,
    original_limits: &[Option<OrderLimit>],
    peers: &HashMap<NodeId, PeerIdentity>,
    hash_expiration: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<RemotePiece>> {
    let Some(remote) = pointer.remote.as_ref() else {
        return Ok(Vec::new());
    };
    let redundancy = &remote.redundancy;
    if redundancy.required == 0 || redundancy.total == 0 {
        return Err(MetainfoError::invalid_argument(
            "invalid redundancy strategy; MinReq and/or Total are invalid",
        ));
    }

    let mut valid: Vec<RemotePiece> = Vec::with_capacity(remote.remote_pieces.len());
    let mut invalid: Vec<InvalidPiece> = Vec::new();
    let mut last_piece_size = 0i64;
    let mut all_sizes_valid = true;

    for piece in &remote.remote_pieces {
        let reject = |reason: String| InvalidPiece {
            node_id: piece.node_id,
            piece_num: piece.piece_num,
            reason,
        };

        let Some(peer) = peers.get(&piece.node_id) else {
            tracing::warn!(node_id = %piece.node_id, "Identity chain unknown for node");
            invalid.push(reject("Identity chain unknown for node".to_owned()));
            continue;
        };
        let Some(limit) = original_limits
            .get(usize::from(piece.piece_num))
            .and_then(Option::as_ref)
        else {
            invalid.push(reject(
                "No order limit for validating the piece hash".to_owned(),
            ));
            continue;
        };
        if let Err(err) = validate_piece_hash(piece, limit, peer, now, hash_expiration) {
            tracing::warn!(error = %err, "Problem validating piece hash. Pieces removed from pointer");
            invalid.push(reject(err.to_string()));
            continue;
        }

        let piece_size = piece.hash.as_ref().map_or(0, |h| h.piece_size);
        if piece_size <= 0 || (last_piece_size > 0 && last_piece_size != piece_size) {
            all_sizes_valid = false;
            break;
        }
        last_piece_size = piece_size;
        valid.push(piece.clone());
    }

    if !all_sizes_valid {
        return Err(MetainfoError::invalid_argument(
            "all pieces needs to have the same size",
        ));
    }

    // an empty upload result has no size to compare against
    if !valid.is_empty() {
        let expected = calc_piece_size(pointer.segment_size, redundancy);
        if expected != last_piece_size {
            return Err(MetainfoError::invalid_argument(format!(
                "expected piece size is different from provided ({expected} != {last_piece_size})"
            )));
        }
    }

    let count = valid.len();
    let received = remote.remote_pieces.len();
    if count <= usize::from(redundancy.repair) && count < usize::from(redundancy.success) {
        return Err(MetainfoError::invalid_argument(format!(
            "Number of valid pieces ({count}) is less than or equal to the repair threshold ({}). Found {received} invalid pieces{}",
            redundancy.repair,
            describe_invalid(&invalid)
        )));
    }
    if count < usize::from(redundancy.success) {
        return Err(MetainfoError::invalid_argument(format!(
            "Number of valid pieces ({count}) is less than the success threshold ({}). Found {received} invalid pieces{}",
            redundancy.success,
            describe_invalid(&invalid)
        )));
    }

    Ok(valid)
}

fn describe_invalid(invalid: &[InvalidPiece]) -> String {
    if invalid.is_empty() {
        return String::new();
    }
    let mut out = String::from(". Invalid Pieces:");
    for piece in invalid {
        let _ = write!(
            out,
            "\nNodeID: {}, PieceNum: {}, Reason: {}",
            piece.node_id, piece.piece_num, piece.reason
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ed25519_dalek::SigningKey;
    use strata_core::{
        PieceAction, PieceHash, PieceId, RedundancyScheme, RemoteSegment, SerialNumber, StatusCode,
    };
    use strata_signature::{sign_piece_hash, FullIdentity};

    const SEGMENT_SIZE: i64 = 1000;
    const PIECE_SIZE: i64 = 256;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    struct Upload {
        nodes: Vec<FullIdentity>,
        limits: Vec<Option<OrderLimit>>,
        pointer: Pointer,
    }

    impl Upload {
        /// 4/6/8/10 segment with `stored` pieces, each `piece_size` bytes.
        fn new(stored: u16, piece_size: i64) -> Self {
            let scheme = RedundancyScheme::reed_solomon(4, 6, 8, 10, 256);
            let root = PieceId::from_bytes([0x42; 32]);
            let nodes: Vec<FullIdentity> = (0..scheme.total)
                .map(|i| FullIdentity::from_signing_key(SigningKey::from_bytes(&[i as u8 + 1; 32])))
                .collect();

            let limits = nodes
                .iter()
                .enumerate()
                .map(|(num, node)| {
                    Some(OrderLimit {
                        serial_number: SerialNumber::from_bytes([num as u8; 16]),
                        satellite_id: NodeId::from_bytes([0xEE; 32]),
                        storage_node_id: node.id,
                        piece_id: root.derive(&node.id, num as u16),
                        limit: 1024,
                        action: PieceAction::Put,
                        piece_expiration: None,
                        order_expiration: t0() + Duration::days(7),
                        order_creation: t0(),
                        satellite_signature: Vec::new(),
                    })
                })
                .collect::<Vec<_>>();

            let pieces = (0..stored)
                .map(|num| {
                    let node = &nodes[usize::from(num)];
                    let mut hash = PieceHash {
                        piece_id: root.derive(&node.id, num),
                        hash: vec![num as u8; 32],
                        piece_size,
                        timestamp: t0(),
                        signature: Vec::new(),
                    };
                    sign_piece_hash(&node.signing_key, &mut hash).unwrap();
                    RemotePiece {
                        piece_num: num,
                        node_id: node.id,
                        hash: Some(hash),
                    }
                })
                .collect();

            let pointer = Pointer {
                kind: PointerKind::Remote,
                inline_segment: Vec::new(),
                remote: Some(RemoteSegment {
                    root_piece_id: root,
                    redundancy: scheme,
                    remote_pieces: pieces,
                }),
                segment_size: SEGMENT_SIZE,
                creation_date: t0(),
                expiration_date: None,
                metadata: Vec::new(),
                piece_hashes_verified: false,
            };

            Self {
                nodes,
                limits,
                pointer,
            }
        }

        fn peers(&self) -> HashMap<NodeId, PeerIdentity> {
            self.nodes.iter().map(|n| (n.id, n.peer())).collect()
        }

        fn select(&self) -> Result<Vec<RemotePiece>> {
            select_valid_pieces(
                &self.pointer,
                &self.limits,
                &self.peers(),
                Duration::hours(24),
                t0() + Duration::minutes(5),
            )
        }
    }

    #[test]
    fn test_success_threshold_met() {
        let upload = Upload::new(8, PIECE_SIZE);
        let valid = upload.select().unwrap();
        assert_eq!(valid.len(), 8);
    }

    #[test]
    fn test_below_success_threshold() {
        let upload = Upload::new(7, PIECE_SIZE);
        let err = upload.select().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
        assert!(err
            .message()
            .starts_with("Number of valid pieces (7) is less than the success threshold (8)"));
    }

    #[test]
    fn test_at_repair_threshold() {
        let upload = Upload::new(6, PIECE_SIZE);
        let err = upload.select().unwrap_err();
        assert!(err
            .message()
            .starts_with("Number of valid pieces (6) is less than or equal to the repair threshold (6)"));
    }

    #[test]
    fn test_wrong_piece_size_rejected() {
        let upload = Upload::new(8, 512);
        let err = upload.select().unwrap_err();
        assert_eq!(
            err.message(),
            "expected piece size is different from provided (256 != 512)"
        );
    }

    #[test]
    fn test_mixed_sizes_rejected() {
        let mut upload = Upload::new(9, PIECE_SIZE);
        let node = upload.nodes[3].clone();
        let remote = upload.pointer.remote.as_mut().unwrap();
        let hash = remote.remote_pieces[3].hash.as_mut().unwrap();
        hash.piece_size = 128;
        sign_piece_hash(&node.signing_key, hash).unwrap();

        let err = upload.select().unwrap_err();
        assert_eq!(err.message(), "all pieces needs to have the same size");
    }

    #[test]
    fn test_invalid_pieces_are_dropped_and_listed() {
        let mut upload = Upload::new(10, PIECE_SIZE);
        let remote = upload.pointer.remote.as_mut().unwrap();
        remote.remote_pieces[0].hash = None;
        remote.remote_pieces[1].hash.as_mut().unwrap().piece_size = PIECE_SIZE - 1;
        upload.limits[2] = None;

        let err = upload.select().unwrap_err();
        let message = err.message();
        assert!(message.contains("Number of valid pieces (7)"));
        assert!(message.contains("Invalid Pieces:"));
        assert!(message.contains("PieceNum: 0, Reason: no piece hash"));
        assert!(message.contains("PieceNum: 1, Reason: piece hash signature could not be verified"));
        assert!(message.contains("PieceNum: 2, Reason: No order limit for validating the piece hash"));
    }

    #[test]
    fn test_unknown_node_dropped() {
        let upload = Upload::new(10, PIECE_SIZE);
        let mut peers = upload.peers();
        peers.remove(&upload.nodes[4].id);

        let valid = select_valid_pieces(
            &upload.pointer,
            &upload.limits,
            &peers,
            Duration::hours(24),
            t0(),
        )
        .unwrap();
        assert_eq!(valid.len(), 9);
        assert!(valid.iter().all(|p| p.piece_num != 4));
    }

    #[test]
    fn test_stale_hashes_dropped() {
        let upload = Upload::new(10, PIECE_SIZE);
        let err = select_valid_pieces(
            &upload.pointer,
            &upload.limits,
            &upload.peers(),
            Duration::hours(24),
            t0() + Duration::hours(25),
        )
        .unwrap_err();
        assert!(err.message().contains("piece hash timestamp is too old"));
    }

    #[test]
    fn test_inline_pointer_untouched() {
        let pointer = Pointer::inline(vec![1; 10], t0(), None, Vec::new());
        let valid = select_valid_pieces(&pointer, &[], &HashMap::new(), Duration::hours(1), t0())
            .unwrap();
        assert!(valid.is_empty());
    }
}
