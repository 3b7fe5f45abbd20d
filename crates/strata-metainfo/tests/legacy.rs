//! Pointer-level operations of the first protocol version.

use std::sync::Arc;

use chrono::Duration;
use strata_core::{
    calc_piece_size, AddressedOrderLimit, OrderLimit, PhysicalClock, PieceAction, PieceId, Pointer,
    PointerKind, RemotePiece, RemoteSegment, StatusCode,
};
use strata_metainfo::messages::{
    CommitSegmentRequestOld, CreateSegmentRequestOld, ListSegmentsRequestOld, SegmentLocation,
};
use strata_metainfo::CreateRequests;
use strata_testkit::TestNetwork;

const SEGMENT_SIZE: i64 = 1000;

fn location(network: &TestNetwork, path: &str, segment: i64) -> SegmentLocation {
    SegmentLocation {
        header: network.header(),
        bucket: b"legacy".to_vec(),
        path: path.as_bytes().to_vec(),
        segment,
    }
}

async fn create_segment(
    network: &TestNetwork,
    path: &str,
) -> (Vec<AddressedOrderLimit>, PieceId) {
    let created = network
        .endpoint
        .create_segment_old(CreateSegmentRequestOld {
            location: location(network, path, -1),
            redundancy: network.endpoint.config().rs.scheme(),
            max_encrypted_segment_size: SEGMENT_SIZE,
            expiration: None,
        })
        .await
        .unwrap();
    (created.addressed_limits, created.root_piece_id)
}

/// The pointer a client builds after uploading to every node.
fn uploaded_pointer(
    network: &TestNetwork,
    limits: &[AddressedOrderLimit],
    root_piece_id: PieceId,
) -> (Pointer, Vec<Option<OrderLimit>>) {
    let scheme = network.endpoint.config().rs.scheme();
    let piece_size = calc_piece_size(SEGMENT_SIZE, &scheme);
    let remote_pieces = network
        .upload_results(limits, piece_size)
        .into_iter()
        .map(|result| RemotePiece {
            piece_num: result.piece_num,
            node_id: result.node_id,
            hash: result.hash,
        })
        .collect();

    let pointer = Pointer {
        kind: PointerKind::Remote,
        inline_segment: Vec::new(),
        remote: Some(RemoteSegment {
            root_piece_id,
            redundancy: scheme,
            remote_pieces,
        }),
        segment_size: SEGMENT_SIZE,
        creation_date: network.clock.now(),
        expiration_date: None,
        metadata: b"stream".to_vec(),
        piece_hashes_verified: false,
    };
    let original_limits = limits.iter().map(|a| Some(a.limit.clone())).collect();
    (pointer, original_limits)
}

#[tokio::test]
async fn test_remote_segment_lifecycle() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;

    let (limits, root_piece_id) = create_segment(&network, "file").await;
    assert_eq!(limits.len(), 10);
    assert_eq!(network.endpoint.create_requests().len(), 1);

    let (pointer, original_limits) = uploaded_pointer(&network, &limits, root_piece_id);
    let stored = network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: location(&network, "file", -1),
            pointer,
            original_limits,
        })
        .await
        .unwrap();
    assert_eq!(stored.pieces().len(), 10);
    assert!(stored.pieces().iter().all(|piece| piece.hash.is_none()));
    assert!(stored.piece_hashes_verified);
    assert!(network.endpoint.create_requests().is_empty());
    assert_eq!(network.usage.stored(network.project_id), SEGMENT_SIZE);

    let info = network
        .endpoint
        .segment_info_old(location(&network, "file", -1))
        .await
        .unwrap();
    assert_eq!(info, stored);

    let download = network
        .endpoint
        .download_segment_old(location(&network, "file", -1))
        .await
        .unwrap();
    assert_eq!(download.addressed_limits.len(), 10);
    assert!(download
        .addressed_limits
        .iter()
        .all(|addressed| addressed.limit.action == PieceAction::Get));

    let listed = network
        .endpoint
        .list_segments_old(ListSegmentsRequestOld {
            header: network.header(),
            bucket: b"legacy".to_vec(),
            recursive: true,
            ..ListSegmentsRequestOld::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].path, b"file");
    assert!(!listed.more);

    let deleted = network
        .endpoint
        .delete_segment_old(location(&network, "file", -1))
        .await
        .unwrap();
    assert_eq!(deleted.addressed_limits.len(), 10);
    assert!(deleted
        .addressed_limits
        .iter()
        .all(|addressed| addressed.limit.action == PieceAction::Delete));

    let err = network
        .endpoint
        .segment_info_old(location(&network, "file", -1))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NotFound);
}

#[tokio::test]
async fn test_commit_must_match_create_request() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;
    let (limits, root_piece_id) = create_segment(&network, "file").await;

    let (mut pointer, original_limits) = uploaded_pointer(&network, &limits, root_piece_id);
    pointer.expiration_date = Some(network.clock.now() + Duration::days(1));

    let err = network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: location(&network, "file", -1),
            pointer,
            original_limits,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Internal);
    assert!(err.message().contains("expiration"));

    // the creation stays available for a correct commit
    assert_eq!(network.endpoint.create_requests().len(), 1);
}

#[tokio::test]
async fn test_commit_without_create_request_is_rejected() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;
    let (limits, root_piece_id) = create_segment(&network, "file").await;
    network
        .endpoint
        .create_requests()
        .remove(&limits[0].limit.serial_number);

    let (pointer, original_limits) = uploaded_pointer(&network, &limits, root_piece_id);
    let err = network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: location(&network, "file", -1),
            pointer,
            original_limits,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Internal);
}

#[tokio::test]
async fn test_commit_rejects_forged_order_limit() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;
    let (limits, root_piece_id) = create_segment(&network, "file").await;

    let (pointer, mut original_limits) = uploaded_pointer(&network, &limits, root_piece_id);
    if let Some(Some(limit)) = original_limits.get_mut(3) {
        limit.limit *= 2;
    }

    let err = network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: location(&network, "file", -1),
            pointer,
            original_limits,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Internal);
    assert!(err.message().contains("signature"));
}

#[tokio::test]
async fn test_inline_segment_records_bandwidth() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;

    let pointer = Pointer::inline(b"inline data".to_vec(), network.clock.now(), None, Vec::new());
    network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: location(&network, "small", -1),
            pointer,
            original_limits: Vec::new(),
        })
        .await
        .unwrap();

    let download = network
        .endpoint
        .download_segment_old(location(&network, "small", -1))
        .await
        .unwrap();
    assert_eq!(download.pointer.inline_segment, b"inline data");
    assert!(download.addressed_limits.is_empty());

    let traffic = network.orders.inline_traffic(network.project_id, b"legacy");
    assert_eq!(traffic.put, 11);
    assert_eq!(traffic.get, 11);

    let deleted = network
        .endpoint
        .delete_segment_old(location(&network, "small", -1))
        .await
        .unwrap();
    assert!(deleted.addressed_limits.is_empty());
}

#[tokio::test]
async fn test_create_segment_rejects_past_expiration() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;

    let err = network
        .endpoint
        .create_segment_old(CreateSegmentRequestOld {
            location: location(&network, "file", -1),
            redundancy: network.endpoint.config().rs.scheme(),
            max_encrypted_segment_size: SEGMENT_SIZE,
            expiration: Some(network.clock.now() - Duration::minutes(1)),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_endpoints_share_a_creation_table() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;
    let shared = Arc::new(CreateRequests::new(16, Duration::hours(48)));
    let front = network.endpoint.clone().with_create_requests(shared.clone());
    let back = network.endpoint.clone().with_create_requests(shared.clone());

    let created = front
        .create_segment_old(CreateSegmentRequestOld {
            location: location(&network, "file", -1),
            redundancy: network.endpoint.config().rs.scheme(),
            max_encrypted_segment_size: SEGMENT_SIZE,
            expiration: None,
        })
        .await
        .unwrap();
    assert_eq!(shared.len(), 1);
    assert!(network.endpoint.create_requests().is_empty());

    let (pointer, original_limits) =
        uploaded_pointer(&network, &created.addressed_limits, created.root_piece_id);
    back.commit_segment_old(CommitSegmentRequestOld {
        location: location(&network, "file", -1),
        pointer,
        original_limits,
    })
    .await
    .unwrap();
    assert!(shared.is_empty());
}

#[tokio::test]
async fn test_create_segment_rejects_out_of_range_size() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;

    for max_encrypted_segment_size in [i64::MAX, -1] {
        let err = network
            .endpoint
            .create_segment_old(CreateSegmentRequestOld {
                location: location(&network, "file", -1),
                redundancy: network.endpoint.config().rs.scheme(),
                max_encrypted_segment_size,
                expiration: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }
    assert!(network.endpoint.create_requests().is_empty());
}

#[tokio::test]
async fn test_commit_with_malformed_bucket_is_invalid_argument() {
    let network = TestNetwork::new(10);
    network.create_bucket("legacy").await;
    let (limits, root_piece_id) = create_segment(&network, "file").await;
    let (pointer, original_limits) = uploaded_pointer(&network, &limits, root_piece_id);

    let err = network
        .endpoint
        .commit_segment_old(CommitSegmentRequestOld {
            location: SegmentLocation {
                bucket: b"Not_A_Bucket".to_vec(),
                ..location(&network, "file", -1)
            },
            pointer,
            original_limits,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    assert_eq!(network.endpoint.create_requests().len(), 1);
}
