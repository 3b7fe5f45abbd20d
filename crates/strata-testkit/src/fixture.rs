//! A satellite endpoint wired to in-memory collaborators and storage nodes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use strata_core::{
    calc_piece_size, AddressedOrderLimit, MetainfoConfig, NodeAddress, NodeId, PhysicalClock,
    PieceHash, PieceId, ProjectId, SegmentMeta, StreamMeta,
};
use strata_metainfo::messages::{
    BeginObjectRequest, BeginSegmentRequest, CommitObjectRequest, CommitSegmentRequest,
    CreateBucketRequest, MakeInlineSegmentRequest, SegmentPieceUploadResult, SegmentPosition,
};
use strata_metainfo::{Collaborators, Endpoint, RequestHeader, SelectedNode};
use strata_signature::{sign_piece_hash, FullIdentity, StreamId, TokenAuthority};
use strata_store::{
    Bucket, CipherSuite, EncryptionParameters, MemoryBucketStore, MemoryKeyValueStore,
    PointerStore,
};

use crate::clock::ControllableClock;
use crate::mocks::{
    MockAttributions, MockAuthorizer, MockIdentities, MockOrders, MockOverlay, MockPartners,
    MockPieceDeleter, MockUsage,
};

/// API key registered for [`TestNetwork::project_id`].
pub const TEST_API_KEY: &[u8] = b"test-api-key";

/// Nonce length clients use for segment keys.
pub const KEY_NONCE_LEN: usize = 24;

/// A storage node that can sign piece hashes.
#[derive(Debug, Clone)]
pub struct TestNode {
    /// Keys of the node
    pub identity: FullIdentity,
    /// How the overlay reports the node
    pub selected: SelectedNode,
}

impl TestNode {
    /// Node id.
    pub fn id(&self) -> NodeId {
        self.identity.id
    }

    /// Receipt for a piece, signed by this node.
    pub fn sign_piece_hash(
        &self,
        piece_id: PieceId,
        piece_size: i64,
        timestamp: DateTime<Utc>,
    ) -> PieceHash {
        let mut hash = PieceHash {
            piece_id,
            hash: piece_id.as_bytes()[..16].to_vec(),
            piece_size,
            timestamp,
            signature: Vec::new(),
        };
        sign_piece_hash(&self.identity.signing_key, &mut hash).unwrap();
        hash
    }
}

/// One segment of an object uploaded with [`TestNetwork::upload_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentSpec {
    /// Remote segment of the given encrypted size
    Remote(i64),
    /// Inline segment with the given content
    Inline(Vec<u8>),
}

/// Endpoint plus every mock behind it.
pub struct TestNetwork {
    /// Endpoint under test
    pub endpoint: Endpoint,
    /// Clock every component reads
    pub clock: ControllableClock,
    /// Satellite signing identity
    pub satellite: FullIdentity,
    /// Storage nodes known to the overlay
    pub nodes: Vec<TestNode>,
    /// Project of [`TEST_API_KEY`]
    pub project_id: ProjectId,
    /// API keys
    pub authorizer: Arc<MockAuthorizer>,
    /// Node selection
    pub overlay: Arc<MockOverlay>,
    /// Order limits
    pub orders: Arc<MockOrders>,
    /// Usage accounting
    pub usage: Arc<MockUsage>,
    /// Node identities
    pub identities: Arc<MockIdentities>,
    /// Attribution table
    pub attributions: Arc<MockAttributions>,
    /// Partner registry
    pub partners: Arc<MockPartners>,
    /// Piece deletion requests
    pub deleter: Arc<MockPieceDeleter>,
    /// Bucket records
    pub buckets: Arc<MemoryBucketStore>,
}

impl std::fmt::Debug for TestNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestNetwork")
            .field("satellite", &self.satellite.id)
            .field("nodes", &self.nodes.len())
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl TestNetwork {
    /// Default configuration with `node_count` storage nodes.
    pub fn new(node_count: usize) -> Self {
        Self::with_config(MetainfoConfig::default(), node_count)
    }

    /// Custom configuration with `node_count` storage nodes.
    pub fn with_config(config: MetainfoConfig, node_count: usize) -> Self {
        crate::logging::init_test_logging();

        let clock = ControllableClock::fixed();
        let shared_clock: Arc<ControllableClock> = Arc::new(clock.clone());
        let satellite = FullIdentity::generate(&mut OsRng);

        let nodes: Vec<TestNode> = (0..node_count)
            .map(|i| {
                let identity = FullIdentity::generate(&mut OsRng);
                let selected = SelectedNode {
                    id: identity.id,
                    address: NodeAddress::new(format!("127.0.0.1:{}", 28967 + i)),
                };
                TestNode { identity, selected }
            })
            .collect();

        let authorizer = Arc::new(MockAuthorizer::new());
        let overlay = Arc::new(MockOverlay::new(
            nodes.iter().map(|node| node.selected.clone()).collect(),
        ));
        let orders = Arc::new(MockOrders::new(
            satellite.signing_key.clone(),
            shared_clock.clone(),
        ));
        let identities = Arc::new(MockIdentities::new());
        for node in &nodes {
            orders.register_node(&node.selected);
            identities.register(node.identity.peer());
        }
        let usage = Arc::new(MockUsage::new());
        let attributions = Arc::new(MockAttributions::new());
        let partners = Arc::new(MockPartners::new());
        let deleter = Arc::new(MockPieceDeleter::new());
        let buckets = Arc::new(MemoryBucketStore::new());

        let project_id = ProjectId::new();
        authorizer.add_key(TEST_API_KEY, project_id);

        let collaborators = Collaborators {
            authorizer: authorizer.clone(),
            overlay: overlay.clone(),
            orders: orders.clone(),
            usage: usage.clone(),
            identities: identities.clone(),
            attributions: attributions.clone(),
            partners: partners.clone(),
            piece_deleter: deleter.clone(),
        };

        let tokens = TokenAuthority::new(satellite.signing_key.clone(), config.token_validity());
        let endpoint = Endpoint::new(
            config,
            PointerStore::new(Arc::new(MemoryKeyValueStore::new())),
            buckets.clone(),
            tokens,
            collaborators,
            shared_clock,
        )
        .unwrap();

        Self {
            endpoint,
            clock,
            satellite,
            nodes,
            project_id,
            authorizer,
            overlay,
            orders,
            usage,
            identities,
            attributions,
            partners,
            deleter,
            buckets,
        }
    }

    /// Header carrying [`TEST_API_KEY`].
    pub fn header(&self) -> RequestHeader {
        RequestHeader::with_api_key(TEST_API_KEY)
    }

    /// Node with id `id`.
    pub fn node(&self, id: &NodeId) -> Option<&TestNode> {
        self.nodes.iter().find(|node| node.id() == *id)
    }

    /// Signed upload results for every limit, as if each node stored a
    /// piece of `piece_size` bytes right now.
    pub fn upload_results(
        &self,
        limits: &[AddressedOrderLimit],
        piece_size: i64,
    ) -> Vec<SegmentPieceUploadResult> {
        let now = self.clock.now();
        limits
            .iter()
            .enumerate()
            .map(|(piece_num, addressed)| {
                let node_id = addressed.limit.storage_node_id;
                let node = self.node(&node_id).unwrap();
                SegmentPieceUploadResult {
                    piece_num: u16::try_from(piece_num).unwrap(),
                    node_id,
                    hash: Some(node.sign_piece_hash(addressed.limit.piece_id, piece_size, now)),
                }
            })
            .collect()
    }

    /// Create a bucket with the satellite's redundancy.
    pub async fn create_bucket(&self, name: &str) -> Bucket {
        self.endpoint
            .create_bucket(CreateBucketRequest {
                header: self.header(),
                name: name.as_bytes().to_vec(),
                path_cipher: CipherSuite::AesGcm,
                default_segment_size: self.endpoint.config().max_segment_size.as_i64(),
                default_redundancy: self.endpoint.config().rs.scheme(),
                default_encryption: EncryptionParameters {
                    cipher_suite: CipherSuite::AesGcm,
                    block_size: 1024,
                },
            })
            .await
            .unwrap()
    }

    /// Run a whole upload: begin, one call per segment, commit.
    ///
    /// The stream metadata discloses the segment count, and LAST carries
    /// the key of the final segment.
    pub async fn upload_object(&self, bucket: &[u8], path: &[u8], segments: &[SegmentSpec]) -> StreamId {
        let begin = self
            .endpoint
            .begin_object(BeginObjectRequest {
                header: self.header(),
                bucket: bucket.to_vec(),
                encrypted_path: path.to_vec(),
                version: 0,
                expires_at: None,
            })
            .await
            .unwrap();

        let mut last_segment_meta = None;
        for (index, segment) in segments.iter().enumerate() {
            let position = SegmentPosition::new(index as i64);
            let meta = SegmentMeta {
                encrypted_key: format!("segment-key-{index}").into_bytes(),
                key_nonce: vec![index as u8; KEY_NONCE_LEN],
            };
            match segment {
                SegmentSpec::Remote(size) => {
                    self.upload_remote_segment(&begin.stream_id, position, *size, meta.clone())
                        .await;
                }
                SegmentSpec::Inline(data) => {
                    self.endpoint
                        .make_inline_segment(MakeInlineSegmentRequest {
                            header: self.header(),
                            stream_id: begin.stream_id.clone(),
                            position,
                            encrypted_key_nonce: meta.key_nonce.clone(),
                            encrypted_key: meta.encrypted_key.clone(),
                            encrypted_inline_data: data.clone(),
                        })
                        .await
                        .unwrap();
                }
            }
            last_segment_meta = Some(meta);
        }

        let stream_meta = StreamMeta {
            encrypted_stream_info: b"stream-info".to_vec(),
            encryption_type: CipherSuite::AesGcm.as_i32(),
            encryption_block_size: 1024,
            last_segment_meta,
            number_of_segments: segments.len() as i64,
        };
        self.endpoint
            .commit_object(CommitObjectRequest {
                header: self.header(),
                stream_id: begin.stream_id.clone(),
                encrypted_metadata: stream_meta.to_bytes().unwrap(),
            })
            .await
            .unwrap();

        begin.stream_id
    }

    /// Begin and commit one remote segment with every node reporting a piece.
    pub async fn upload_remote_segment(
        &self,
        stream_id: &StreamId,
        position: SegmentPosition,
        size: i64,
        meta: SegmentMeta,
    ) -> usize {
        let begin = self
            .endpoint
            .begin_segment(BeginSegmentRequest {
                header: self.header(),
                stream_id: stream_id.clone(),
                position,
                max_order_limit: size,
            })
            .await
            .unwrap();

        let piece_size = calc_piece_size(size, &self.endpoint.config().rs.scheme());
        let committed = self
            .endpoint
            .commit_segment(CommitSegmentRequest {
                header: self.header(),
                segment_id: begin.segment_id,
                encrypted_key_nonce: meta.key_nonce,
                encrypted_key: meta.encrypted_key,
                size_encrypted_data: size,
                upload_result: self.upload_results(&begin.addressed_limits, piece_size),
            })
            .await
            .unwrap();
        committed.successful_pieces
    }
}
