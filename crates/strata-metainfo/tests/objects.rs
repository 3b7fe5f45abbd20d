//! Object lifecycle against an in-memory satellite.

use chrono::Duration;
use strata_core::{
    ByteSize, MetainfoConfig, PhysicalClock, PieceDeletionConfig, StatusCode, StreamMeta,
};
use strata_metainfo::messages::{
    BeginObjectRequest, BeginSegmentRequest, CommitObjectRequest, GetObjectRequest,
    ListObjectsRequest, ObjectListItem, SegmentPosition,
};
use strata_metainfo::RequestHeader;
use strata_store::CipherSuite;
use strata_testkit::{SegmentSpec, TestNetwork};

fn get_request(network: &TestNetwork, bucket: &str, path: &str) -> GetObjectRequest {
    GetObjectRequest {
        header: network.header(),
        bucket: bucket.as_bytes().to_vec(),
        encrypted_path: path.as_bytes().to_vec(),
        version: 0,
    }
}

fn list_request(network: &TestNetwork, bucket: &str, recursive: bool) -> ListObjectsRequest {
    ListObjectsRequest {
        header: network.header(),
        bucket: bucket.as_bytes().to_vec(),
        recursive,
        ..ListObjectsRequest::default()
    }
}

fn paths(items: &[ObjectListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| String::from_utf8_lossy(&item.encrypted_path).into_owned())
        .collect()
}

#[tokio::test]
async fn test_remote_object_round_trip() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    network
        .upload_object(
            b"photos",
            b"cat.jpg",
            &[SegmentSpec::Remote(1000), SegmentSpec::Remote(1000)],
        )
        .await;

    let info = network
        .endpoint
        .get_object(get_request(&network, "photos", "cat.jpg"))
        .await
        .unwrap();

    assert_eq!(info.version, -1);
    assert_eq!(info.bucket, b"photos");
    assert_eq!(info.redundancy, Some(network.endpoint.config().rs.scheme()));
    assert_eq!(info.encryption.cipher_suite, CipherSuite::AesGcm);
    assert_eq!(info.encryption.block_size, 1024);

    let meta = StreamMeta::from_bytes(&info.encrypted_metadata).unwrap();
    assert_eq!(meta.number_of_segments, 2);
    assert_eq!(network.usage.stored(network.project_id), 2000);
}

#[tokio::test]
async fn test_inline_object_carries_satellite_redundancy() {
    let network = TestNetwork::new(10);
    network.create_bucket("notes").await;
    network
        .upload_object(b"notes", b"todo.txt", &[SegmentSpec::Inline(b"hello".to_vec())])
        .await;

    let info = network
        .endpoint
        .get_object(get_request(&network, "notes", "todo.txt"))
        .await
        .unwrap();

    assert_eq!(info.redundancy, Some(network.endpoint.config().rs.scheme()));
    assert_eq!(
        network.orders.inline_traffic(network.project_id, b"notes").put,
        5
    );
    assert!(network.deleter.calls().is_empty());
}

#[tokio::test]
async fn test_get_missing_object_is_not_found() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;

    let err = network
        .endpoint
        .get_object(get_request(&network, "photos", "missing"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NotFound);
}

#[tokio::test]
async fn test_unknown_api_key_is_unauthenticated() {
    let network = TestNetwork::new(10);
    let mut request = get_request(&network, "photos", "cat.jpg");
    request.header = RequestHeader::with_api_key(b"someone-else".to_vec());

    let err = network.endpoint.get_object(request).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Unauthenticated);
}

#[tokio::test]
async fn test_invalid_bucket_name_is_rejected() {
    let network = TestNetwork::new(10);

    let err = network
        .endpoint
        .get_object(get_request(&network, "Not_A_Bucket", "cat.jpg"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_list_objects_collapses_prefixes() {
    let network = TestNetwork::new(10);
    network.create_bucket("docs").await;
    for path in ["a.txt", "b/c.txt", "b/d.txt"] {
        network
            .upload_object(b"docs", path.as_bytes(), &[SegmentSpec::Inline(b"x".to_vec())])
            .await;
    }

    let flat = network
        .endpoint
        .list_objects(list_request(&network, "docs", false))
        .await
        .unwrap();
    assert_eq!(paths(&flat.items), ["a.txt", "b/"]);
    assert!(!flat.items[0].is_prefix);
    assert!(flat.items[1].is_prefix);
    assert_eq!(flat.items[1].created_at, None);
    assert!(!flat.more);

    let deep = network
        .endpoint
        .list_objects(list_request(&network, "docs", true))
        .await
        .unwrap();
    assert_eq!(paths(&deep.items), ["a.txt", "b/c.txt", "b/d.txt"]);
    assert!(deep.items.iter().all(|item| item.created_at.is_some()));
}

#[tokio::test]
async fn test_list_objects_pages() {
    let network = TestNetwork::new(10);
    network.create_bucket("docs").await;
    for path in ["1", "2", "3"] {
        network
            .upload_object(b"docs", path.as_bytes(), &[SegmentSpec::Inline(b"x".to_vec())])
            .await;
    }

    let mut request = list_request(&network, "docs", true);
    request.limit = 2;
    let first = network.endpoint.list_objects(request.clone()).await.unwrap();
    assert_eq!(paths(&first.items), ["1", "2"]);
    assert!(first.more);

    request.encrypted_cursor = b"2".to_vec();
    let second = network.endpoint.list_objects(request).await.unwrap();
    assert_eq!(paths(&second.items), ["3"]);
    assert!(!second.more);
}

#[tokio::test]
async fn test_begin_object_rejects_past_expiration() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;

    let err = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            version: 0,
            expires_at: Some(network.clock.now() - Duration::hours(1)),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_begin_object_replaces_existing_object() {
    let config = MetainfoConfig {
        piece_deletion: PieceDeletionConfig {
            success_threshold: 1.0,
            ..PieceDeletionConfig::default()
        },
        ..MetainfoConfig::default()
    };
    let network = TestNetwork::with_config(config, 10);
    network.create_bucket("photos").await;
    network
        .upload_object(b"photos", b"cat.jpg", &[SegmentSpec::Remote(1000)])
        .await;
    assert!(network.deleter.calls().is_empty());

    network
        .upload_object(b"photos", b"cat.jpg", &[SegmentSpec::Remote(1000)])
        .await;

    // the first upload's pieces went to every node
    assert_eq!(network.deleter.calls().len(), 10);
    assert_eq!(network.usage.stored(network.project_id), 1000);
}

#[tokio::test]
async fn test_commit_object_rejects_oversized_metadata() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    let begin = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            ..BeginObjectRequest::default()
        })
        .await
        .unwrap();

    let err = network
        .endpoint
        .commit_object(CommitObjectRequest {
            header: network.header(),
            stream_id: begin.stream_id,
            encrypted_metadata: vec![0; 2049],
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_commit_object_without_segments_is_not_found() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    let begin = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            ..BeginObjectRequest::default()
        })
        .await
        .unwrap();

    let meta = StreamMeta {
        number_of_segments: 1,
        ..StreamMeta::default()
    };
    let err = network
        .endpoint
        .commit_object(CommitObjectRequest {
            header: network.header(),
            stream_id: begin.stream_id,
            encrypted_metadata: meta.to_bytes().unwrap(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NotFound);
}

#[tokio::test]
async fn test_stream_id_expires() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    let begin = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            ..BeginObjectRequest::default()
        })
        .await
        .unwrap();

    network.clock.advance(Duration::hours(25));

    let err = network
        .endpoint
        .begin_segment(BeginSegmentRequest {
            header: network.header(),
            stream_id: begin.stream_id,
            position: SegmentPosition::new(0),
            max_order_limit: 1000,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Unauthenticated);
}

#[tokio::test]
async fn test_storage_limit_blocks_new_segments() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    network.usage.set_storage_limit(Some(ByteSize::new(0)));

    let begin = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            ..BeginObjectRequest::default()
        })
        .await
        .unwrap();

    let err = network
        .endpoint
        .begin_segment(BeginSegmentRequest {
            header: network.header(),
            stream_id: begin.stream_id,
            position: SegmentPosition::new(0),
            max_order_limit: 1000,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ResourceExhausted);
}

#[tokio::test]
async fn test_commit_object_rejects_negative_segment_count() {
    let network = TestNetwork::new(10);
    network.create_bucket("photos").await;
    let begin = network
        .endpoint
        .begin_object(BeginObjectRequest {
            header: network.header(),
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            ..BeginObjectRequest::default()
        })
        .await
        .unwrap();

    for count in [i64::MIN, -5] {
        let meta = StreamMeta {
            number_of_segments: count,
            ..StreamMeta::default()
        };
        let err = network
            .endpoint
            .commit_object(CommitObjectRequest {
                header: network.header(),
                stream_id: begin.stream_id.clone(),
                encrypted_metadata: meta.to_bytes().unwrap(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument, "{count}");
    }
}
