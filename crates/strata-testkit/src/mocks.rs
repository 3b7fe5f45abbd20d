//! In-memory collaborators.
//!
//! Each mock keeps just enough state to answer the endpoint and to let tests
//! assert on what the endpoint asked for. Failure switches make the error
//! paths reachable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use ed25519_dalek::SigningKey;
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use strata_core::{
    calc_piece_size, AddressedOrderLimit, ByteSize, MetainfoError, NodeAddress, NodeId,
    OrderLimit, PartnerId, PhysicalClock, PieceAction, PieceId, Pointer, ProjectId, Result,
    SerialNumber,
};
use strata_metainfo::{
    Action, ActionKind, AttributionInfo, Attributions, Authorizer, FindStorageNodesRequest,
    KeyInfo, OrderLimits, Overlay, Partners, PeerIdentities, PieceDeletionClient,
    PiecePrivateKey, ProjectUsage, RequestHeader, SelectedNode, UsageCheck,
};
use strata_signature::{sign_order_limit, verify_order_limit, PeerIdentity};
use strata_store::AllowedBuckets;
use uuid::Uuid;

/// How long mock order limits stay settleable.
pub const ORDER_EXPIRATION_DAYS: i64 = 7;

// Authorization

#[derive(Debug, Clone)]
struct KeyEntry {
    info: KeyInfo,
    allowed: AllowedBuckets,
    denied: HashSet<ActionKind>,
}

/// API keys mapped to projects, with optional bucket and action restrictions.
#[derive(Debug, Default)]
pub struct MockAuthorizer {
    keys: RwLock<HashMap<Vec<u8>, KeyEntry>>,
    actions: Mutex<Vec<Action>>,
}

impl MockAuthorizer {
    /// Empty key table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unrestricted key for `project_id`.
    pub fn add_key(&self, api_key: &[u8], project_id: ProjectId) -> KeyInfo {
        let info = KeyInfo {
            id: Uuid::new_v4(),
            project_id,
        };
        self.keys.write().insert(
            api_key.to_vec(),
            KeyEntry {
                info: info.clone(),
                allowed: AllowedBuckets::all(),
                denied: HashSet::new(),
            },
        );
        info
    }

    /// Limit a key to the given buckets.
    pub fn restrict_buckets(&self, api_key: &[u8], allowed: AllowedBuckets) {
        if let Some(entry) = self.keys.write().get_mut(api_key) {
            entry.allowed = allowed;
        }
    }

    /// Forbid one kind of action for a key.
    pub fn deny(&self, api_key: &[u8], op: ActionKind) {
        if let Some(entry) = self.keys.write().get_mut(api_key) {
            entry.denied.insert(op);
        }
    }

    /// Every action that passed validation, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn validate_auth(&self, header: &RequestHeader, action: &Action) -> Result<KeyInfo> {
        let keys = self.keys.read();
        let entry = keys
            .get(&header.api_key)
            .ok_or_else(|| MetainfoError::unauthenticated("invalid API credentials"))?;
        if entry.denied.contains(&action.op) {
            return Err(MetainfoError::unauthenticated("action not permitted"));
        }
        if !action.bucket.is_empty()
            && !entry
                .allowed
                .contains(&String::from_utf8_lossy(&action.bucket))
        {
            return Err(MetainfoError::unauthenticated("bucket not permitted"));
        }
        self.actions.lock().push(action.clone());
        Ok(entry.info.clone())
    }

    async fn allowed_buckets(
        &self,
        header: &RequestHeader,
        _action: &Action,
    ) -> Result<AllowedBuckets> {
        self.keys
            .read()
            .get(&header.api_key)
            .map(|entry| entry.allowed.clone())
            .ok_or_else(|| MetainfoError::unauthenticated("invalid API credentials"))
    }
}

// Node selection

/// Fixed node population with switchable availability.
#[derive(Debug, Default)]
pub struct MockOverlay {
    nodes: RwLock<Vec<SelectedNode>>,
    offline: RwLock<HashSet<NodeId>>,
    fail_selection: AtomicBool,
}

impl MockOverlay {
    /// Overlay knowing `nodes`.
    pub fn new(nodes: Vec<SelectedNode>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            ..Self::default()
        }
    }

    /// Take a node out of selection and reliability answers, or put it back.
    pub fn set_offline(&self, id: NodeId, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    /// Make node selection fail.
    pub fn fail_selection(&self, fail: bool) {
        self.fail_selection.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Overlay for MockOverlay {
    async fn find_storage_nodes(
        &self,
        request: FindStorageNodesRequest,
    ) -> Result<Vec<SelectedNode>> {
        if self.fail_selection.load(Ordering::SeqCst) {
            return Err(MetainfoError::internal("node selection failed"));
        }
        let offline = self.offline.read();
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|node| !offline.contains(&node.id))
            .take(request.requested_count)
            .cloned()
            .collect())
    }

    async fn known_reliable(&self, ids: &[NodeId]) -> Result<Vec<SelectedNode>> {
        let offline = self.offline.read();
        let nodes = self.nodes.read();
        Ok(ids
            .iter()
            .filter(|id| !offline.contains(id))
            .filter_map(|id| nodes.iter().find(|node| node.id == *id).cloned())
            .collect())
    }
}

// Orders

/// Inline bandwidth recorded for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineTraffic {
    /// Bytes uploaded inline
    pub put: i64,
    /// Bytes downloaded inline
    pub get: i64,
}

/// Order limits signed with the satellite key.
pub struct MockOrders {
    satellite: SigningKey,
    clock: Arc<dyn PhysicalClock>,
    addresses: RwLock<HashMap<NodeId, NodeAddress>>,
    inline: Mutex<HashMap<(ProjectId, Vec<u8>), InlineTraffic>>,
}

impl std::fmt::Debug for MockOrders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOrders")
            .field("nodes", &self.addresses.read().len())
            .finish_non_exhaustive()
    }
}

impl MockOrders {
    /// Orders signed by `satellite`, timestamped by `clock`.
    pub fn new(satellite: SigningKey, clock: Arc<dyn PhysicalClock>) -> Self {
        Self {
            satellite,
            clock,
            addresses: RwLock::new(HashMap::new()),
            inline: Mutex::new(HashMap::new()),
        }
    }

    /// Address to put into limits for `node`.
    pub fn register_node(&self, node: &SelectedNode) {
        self.addresses.write().insert(node.id, node.address.clone());
    }

    /// Inline traffic recorded for a bucket.
    pub fn inline_traffic(&self, project_id: ProjectId, bucket: &[u8]) -> InlineTraffic {
        self.inline
            .lock()
            .get(&(project_id, bucket.to_vec()))
            .copied()
            .unwrap_or_default()
    }

    fn address(&self, node: &NodeId) -> NodeAddress {
        self.addresses.read().get(node).cloned().unwrap_or_default()
    }

    fn signed_limit(
        &self,
        serial_number: SerialNumber,
        storage_node_id: NodeId,
        piece_id: PieceId,
        limit: i64,
        action: PieceAction,
        piece_expiration: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<AddressedOrderLimit> {
        let now = self.clock.now();
        let mut order = OrderLimit {
            serial_number,
            satellite_id: NodeId::from_public_key(self.satellite.verifying_key().as_bytes()),
            storage_node_id,
            piece_id,
            limit,
            action,
            piece_expiration,
            order_expiration: now + Duration::days(ORDER_EXPIRATION_DAYS),
            order_creation: now,
            satellite_signature: Vec::new(),
        };
        sign_order_limit(&self.satellite, &mut order)
            .map_err(|e| MetainfoError::internal(e.to_string()))?;
        Ok(AddressedOrderLimit {
            limit: order,
            storage_node_address: self.address(&storage_node_id),
        })
    }

    fn piece_limits(&self, pointer: &Pointer, action: PieceAction) -> Result<Vec<AddressedOrderLimit>> {
        let remote = pointer
            .remote
            .as_ref()
            .ok_or_else(|| MetainfoError::invalid_argument("pointer has no remote segment"))?;
        let piece_size = calc_piece_size(pointer.segment_size, &remote.redundancy);
        let serial = SerialNumber::random();
        remote
            .remote_pieces
            .iter()
            .map(|piece| {
                self.signed_limit(
                    serial,
                    piece.node_id,
                    remote.root_piece_id.derive(&piece.node_id, piece.piece_num),
                    piece_size,
                    action,
                    pointer.expiration_date,
                )
            })
            .collect()
    }

    fn record_inline(&self, project_id: ProjectId, bucket: &[u8], update: impl FnOnce(&mut InlineTraffic)) {
        let mut inline = self.inline.lock();
        update(inline.entry((project_id, bucket.to_vec())).or_default());
    }
}

fn piece_private_key() -> PiecePrivateKey {
    PiecePrivateKey(SigningKey::generate(&mut OsRng).to_bytes().to_vec())
}

#[async_trait]
impl OrderLimits for MockOrders {
    async fn create_put_order_limits(
        &self,
        _bucket_id: &[u8],
        nodes: &[SelectedNode],
        expiration: Option<chrono::DateTime<chrono::Utc>>,
        max_piece_size: i64,
    ) -> Result<(PieceId, Vec<AddressedOrderLimit>, PiecePrivateKey)> {
        if nodes.is_empty() {
            return Err(MetainfoError::internal("not enough nodes available"));
        }
        let root_piece_id = PieceId::random();
        let serial = SerialNumber::random();
        let mut limits = Vec::with_capacity(nodes.len());
        for (piece_num, node) in nodes.iter().enumerate() {
            let piece_num = u16::try_from(piece_num)
                .map_err(|_| MetainfoError::internal("too many nodes"))?;
            let mut limit = self.signed_limit(
                serial,
                node.id,
                root_piece_id.derive(&node.id, piece_num),
                max_piece_size,
                PieceAction::Put,
                expiration,
            )?;
            limit.storage_node_address = node.address.clone();
            limits.push(limit);
        }
        Ok((root_piece_id, limits, piece_private_key()))
    }

    async fn create_get_order_limits(
        &self,
        _bucket_id: &[u8],
        pointer: &Pointer,
    ) -> Result<(Vec<AddressedOrderLimit>, PiecePrivateKey)> {
        Ok((self.piece_limits(pointer, PieceAction::Get)?, piece_private_key()))
    }

    async fn create_delete_order_limits(
        &self,
        _bucket_id: &[u8],
        pointer: &Pointer,
    ) -> Result<(Vec<AddressedOrderLimit>, PiecePrivateKey)> {
        Ok((
            self.piece_limits(pointer, PieceAction::Delete)?,
            piece_private_key(),
        ))
    }

    async fn verify_order_limit_signature(&self, limit: &OrderLimit) -> Result<()> {
        verify_order_limit(&self.satellite.verifying_key(), limit)
            .map_err(|e| MetainfoError::invalid_argument(e.to_string()))
    }

    async fn update_put_inline_order(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        amount: i64,
    ) -> Result<()> {
        self.record_inline(project_id, bucket, |traffic| traffic.put += amount);
        Ok(())
    }

    async fn update_get_inline_order(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        amount: i64,
    ) -> Result<()> {
        self.record_inline(project_id, bucket, |traffic| traffic.get += amount);
        Ok(())
    }
}

// Usage

/// Per-project stored bytes with optional limits.
#[derive(Debug, Default)]
pub struct MockUsage {
    stored: Mutex<HashMap<ProjectId, i64>>,
    storage_limit: Mutex<Option<ByteSize>>,
    bandwidth_exceeded: AtomicBool,
    failing: AtomicBool,
}

impl MockUsage {
    /// No limits, nothing stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently accounted to `project_id`.
    pub fn stored(&self, project_id: ProjectId) -> i64 {
        self.stored.lock().get(&project_id).copied().unwrap_or(0)
    }

    /// Storage limit applied to every project.
    pub fn set_storage_limit(&self, limit: Option<ByteSize>) {
        *self.storage_limit.lock() = limit;
    }

    /// Report every project as over its bandwidth limit.
    pub fn set_bandwidth_exceeded(&self, exceeded: bool) {
        self.bandwidth_exceeded.store(exceeded, Ordering::SeqCst);
    }

    /// Make every usage call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetainfoError::internal("usage database unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectUsage for MockUsage {
    async fn exceeds_storage_usage(&self, project_id: ProjectId) -> Result<UsageCheck> {
        self.check_available()?;
        let Some(limit) = *self.storage_limit.lock() else {
            return Ok(UsageCheck::default());
        };
        Ok(UsageCheck {
            exceeded: self.stored(project_id) >= limit.as_i64(),
            limit,
        })
    }

    async fn exceeds_bandwidth_usage(
        &self,
        _project_id: ProjectId,
        _bucket_id: &[u8],
    ) -> Result<UsageCheck> {
        self.check_available()?;
        Ok(UsageCheck {
            exceeded: self.bandwidth_exceeded.load(Ordering::SeqCst),
            limit: ByteSize::default(),
        })
    }

    async fn add_project_storage_usage(&self, project_id: ProjectId, delta: i64) -> Result<()> {
        self.check_available()?;
        *self.stored.lock().entry(project_id).or_insert(0) += delta;
        Ok(())
    }
}

// Identities

/// Known storage node identities.
#[derive(Debug, Default)]
pub struct MockIdentities {
    peers: RwLock<HashMap<NodeId, PeerIdentity>>,
}

impl MockIdentities {
    /// No identities known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `peer` resolvable.
    pub fn register(&self, peer: PeerIdentity) {
        self.peers.write().insert(peer.id, peer);
    }

    /// Make a node unresolvable.
    pub fn forget(&self, id: &NodeId) {
        self.peers.write().remove(id);
    }
}

#[async_trait]
impl PeerIdentities for MockIdentities {
    async fn batch_get(&self, ids: &[NodeId]) -> Result<Vec<PeerIdentity>> {
        let peers = self.peers.read();
        Ok(ids.iter().filter_map(|id| peers.get(id).cloned()).collect())
    }
}

// Attribution

/// Attribution table.
#[derive(Debug, Default)]
pub struct MockAttributions {
    entries: RwLock<HashMap<(ProjectId, Vec<u8>), AttributionInfo>>,
}

impl MockAttributions {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded attributions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is attributed.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Attributions for MockAttributions {
    async fn get(
        &self,
        project_id: ProjectId,
        bucket_name: &[u8],
    ) -> Result<Option<AttributionInfo>> {
        Ok(self
            .entries
            .read()
            .get(&(project_id, bucket_name.to_vec()))
            .cloned())
    }

    async fn insert(&self, info: AttributionInfo) -> Result<AttributionInfo> {
        let mut entries = self.entries.write();
        let key = (info.project_id, info.bucket_name.clone());
        if entries.contains_key(&key) {
            return Err(MetainfoError::already_exists("attribution already exists"));
        }
        entries.insert(key, info.clone());
        Ok(info)
    }
}

/// User agent to partner registry.
#[derive(Debug, Default)]
pub struct MockPartners {
    by_agent: RwLock<HashMap<String, PartnerId>>,
}

impl MockPartners {
    /// No partners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partner under its user agent.
    pub fn register(&self, user_agent: &str, partner_id: PartnerId) {
        self.by_agent
            .write()
            .insert(user_agent.to_string(), partner_id);
    }
}

#[async_trait]
impl Partners for MockPartners {
    async fn by_user_agent(&self, user_agent: &str) -> Result<PartnerId> {
        self.by_agent
            .read()
            .get(user_agent)
            .copied()
            .ok_or_else(|| MetainfoError::not_found(format!("no partner for user agent {user_agent}")))
    }
}

// Piece deletion

/// Records deletion requests; selected nodes refuse them.
#[derive(Debug, Default)]
pub struct MockPieceDeleter {
    calls: Mutex<Vec<(NodeId, Vec<PieceId>)>>,
    failing: RwLock<HashSet<NodeId>>,
}

impl MockPieceDeleter {
    /// Deleter where every node succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` refuse deletions.
    pub fn fail_node(&self, node: NodeId) {
        self.failing.write().insert(node);
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<(NodeId, Vec<PieceId>)> {
        self.calls.lock().clone()
    }

    /// Pieces `node` was asked to delete across all calls.
    pub fn deleted_from(&self, node: &NodeId) -> Vec<PieceId> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| id == node)
            .flat_map(|(_, pieces)| pieces.iter().copied())
            .collect()
    }
}

#[async_trait]
impl PieceDeletionClient for MockPieceDeleter {
    async fn delete_pieces(&self, node: &SelectedNode, pieces: &[PieceId]) -> Result<()> {
        self.calls.lock().push((node.id, pieces.to_vec()));
        if self.failing.read().contains(&node.id) {
            return Err(MetainfoError::internal("node refused deletion"));
        }
        Ok(())
    }
}
