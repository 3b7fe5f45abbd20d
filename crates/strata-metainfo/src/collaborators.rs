//! Services the endpoint depends on but does not own.
//!
//! # Classification
//!
//! - **Implementation**: provided by the surrounding satellite; in-memory
//!   versions live in `strata-testkit`
//! - **Usage**: injected into [`crate::Endpoint`] through [`Collaborators`]
//!
//! Every call is a single bounded request. Failures come back as
//! [`strata_core::MetainfoError`] and the endpoint decides which status the client sees.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_core::{
    AddressedOrderLimit, ByteSize, NodeAddress, NodeId, OrderLimit, PartnerId, PieceId, Pointer,
    ProjectId, Result,
};
use strata_signature::PeerIdentity;
use strata_store::AllowedBuckets;
use uuid::Uuid;

/// Credentials sent with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// Serialized API key
    pub api_key: Vec<u8>,
    /// Client user agent, used for partner attribution
    pub user_agent: Vec<u8>,
}

impl RequestHeader {
    /// Header carrying only an API key.
    pub fn with_api_key(api_key: impl Into<Vec<u8>>) -> Self {
        Self {
            api_key: api_key.into(),
            user_agent: Vec::new(),
        }
    }
}

/// Permission a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Read object data or metadata
    Read,
    /// Create or overwrite
    Write,
    /// Enumerate
    List,
    /// Remove
    Delete,
    /// Read project-wide information
    ProjectInfo,
}

/// What a request is about to do, checked against the caller's API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Permission needed
    pub op: ActionKind,
    /// Target bucket, empty for project-wide actions
    pub bucket: Vec<u8>,
    /// Target encrypted key or prefix
    pub encrypted_path: Vec<u8>,
    /// When the request was received
    pub time: DateTime<Utc>,
}

/// Identity behind a validated API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// API key id
    pub id: Uuid,
    /// Project the key belongs to
    pub project_id: ProjectId,
}

/// API key and caveat evaluation.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check that `header` permits `action`.
    async fn validate_auth(&self, header: &RequestHeader, action: &Action) -> Result<KeyInfo>;

    /// Buckets the key in `header` may see for `action`.
    async fn allowed_buckets(
        &self,
        header: &RequestHeader,
        action: &Action,
    ) -> Result<AllowedBuckets>;
}

/// A storage node picked for an upload or known to be reliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedNode {
    /// Node id
    pub id: NodeId,
    /// Where to reach it
    pub address: NodeAddress,
}

/// Parameters for node selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindStorageNodesRequest {
    /// How many nodes the upload wants
    pub requested_count: usize,
    /// Minimum free bandwidth per node in bytes
    pub free_bandwidth: i64,
}

/// Node selection and reliability.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Pick nodes for a new segment. May return fewer than requested.
    async fn find_storage_nodes(&self, request: FindStorageNodesRequest)
        -> Result<Vec<SelectedNode>>;

    /// Filter `ids` down to nodes currently considered reliable.
    async fn known_reliable(&self, ids: &[NodeId]) -> Result<Vec<SelectedNode>>;
}

/// Private key the uplink signs piece orders with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PiecePrivateKey(pub Vec<u8>);

/// Order limit creation and inline bandwidth accounting.
#[async_trait]
pub trait OrderLimits: Send + Sync {
    /// One signed PUT limit per node, in node order, under a fresh root piece id.
    async fn create_put_order_limits(
        &self,
        bucket_id: &[u8],
        nodes: &[SelectedNode],
        expiration: Option<DateTime<Utc>>,
        max_piece_size: i64,
    ) -> Result<(PieceId, Vec<AddressedOrderLimit>, PiecePrivateKey)>;

    /// Signed GET limits for the pieces of a remote pointer.
    async fn create_get_order_limits(
        &self,
        bucket_id: &[u8],
        pointer: &Pointer,
    ) -> Result<(Vec<AddressedOrderLimit>, PiecePrivateKey)>;

    /// Signed DELETE limits for the pieces of a remote pointer.
    async fn create_delete_order_limits(
        &self,
        bucket_id: &[u8],
        pointer: &Pointer,
    ) -> Result<(Vec<AddressedOrderLimit>, PiecePrivateKey)>;

    /// Check that `limit` carries this satellite's signature.
    async fn verify_order_limit_signature(&self, limit: &OrderLimit) -> Result<()>;

    /// Record upload bandwidth for an inline segment.
    async fn update_put_inline_order(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        amount: i64,
    ) -> Result<()>;

    /// Record download bandwidth for an inline segment.
    async fn update_get_inline_order(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        amount: i64,
    ) -> Result<()>;
}

/// Result of a usage-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageCheck {
    /// Whether the project is over its limit
    pub exceeded: bool,
    /// The limit that applies
    pub limit: ByteSize,
}

/// Project usage limits and storage accounting.
#[async_trait]
pub trait ProjectUsage: Send + Sync {
    /// Whether stored bytes exceed the project's storage limit.
    async fn exceeds_storage_usage(&self, project_id: ProjectId) -> Result<UsageCheck>;

    /// Whether egress exceeds the project's bandwidth limit.
    async fn exceeds_bandwidth_usage(
        &self,
        project_id: ProjectId,
        bucket_id: &[u8],
    ) -> Result<UsageCheck>;

    /// Adjust the project's stored bytes by `delta`, which may be negative.
    async fn add_project_storage_usage(&self, project_id: ProjectId, delta: i64) -> Result<()>;
}

/// Storage node identity lookup.
#[async_trait]
pub trait PeerIdentities: Send + Sync {
    /// Identities of the given nodes. Unknown nodes are omitted.
    async fn batch_get(&self, ids: &[NodeId]) -> Result<Vec<PeerIdentity>>;
}

/// Value attribution of a bucket to a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionInfo {
    /// Owning project
    pub project_id: ProjectId,
    /// Attributed bucket
    pub bucket_name: Vec<u8>,
    /// Partner credited
    pub partner_id: PartnerId,
    /// When the attribution was recorded
    pub created_at: DateTime<Utc>,
}

/// Attribution table.
#[async_trait]
pub trait Attributions: Send + Sync {
    /// Attribution of a bucket, `None` when not attributed.
    async fn get(&self, project_id: ProjectId, bucket_name: &[u8])
        -> Result<Option<AttributionInfo>>;

    /// Record an attribution.
    async fn insert(&self, info: AttributionInfo) -> Result<AttributionInfo>;
}

/// Partner registry.
#[async_trait]
pub trait Partners: Send + Sync {
    /// Partner registered for a user agent.
    async fn by_user_agent(&self, user_agent: &str) -> Result<PartnerId>;
}

/// Bulk piece deletion on a single storage node.
#[async_trait]
pub trait PieceDeletionClient: Send + Sync {
    /// Ask `node` to delete `pieces`.
    async fn delete_pieces(&self, node: &SelectedNode, pieces: &[PieceId]) -> Result<()>;
}

/// Every external service the endpoint talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// API key evaluation
    pub authorizer: Arc<dyn Authorizer>,
    /// Node selection
    pub overlay: Arc<dyn Overlay>,
    /// Order limits
    pub orders: Arc<dyn OrderLimits>,
    /// Usage limits and accounting
    pub usage: Arc<dyn ProjectUsage>,
    /// Node identities
    pub identities: Arc<dyn PeerIdentities>,
    /// Attribution table
    pub attributions: Arc<dyn Attributions>,
    /// Partner registry
    pub partners: Arc<dyn Partners>,
    /// Storage node deletion requests
    pub piece_deleter: Arc<dyn PieceDeletionClient>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
