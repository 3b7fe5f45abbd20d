//! Segment and object protocol endpoint.
//!
//! # Classification
//!
//! - **Category**: protocol orchestration
//! - **State**: none of its own beyond the legacy creation table; pointers
//!   and buckets live in their stores, progress of an upload lives in the
//!   capability tokens clients carry between calls
//!
//! One upload runs `begin_object → (begin_segment → commit_segment |
//! make_inline_segment)* → commit_object`. Validation failures return before
//! anything is written. Accounting updates are best effort and never roll
//! back work already done.

mod buckets;
mod legacy;
mod objects;
mod segments;

use std::sync::Arc;

use strata_core::{
    bucket_id, create_path, MetainfoConfig, MetainfoError, PhysicalClock, Pointer, ProjectId,
    RedundancyScheme, Result, StrataConfig,
};
use strata_signature::{SegmentId, SegmentToken, StreamId, StreamToken, TokenAuthority};
use strata_store::{BucketStore, PointerStore};

use crate::collaborators::{Action, ActionKind, Collaborators, KeyInfo, RequestHeader};
use crate::create_requests::CreateRequests;
use crate::deletion::DeletePiecesService;

/// Largest encrypted key nonce a segment may carry.
pub(crate) const NONCE_SIZE: usize = 24;

/// The metainfo endpoint.
///
/// Cheap to clone; every clone shares the same stores and collaborators.
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) config: Arc<MetainfoConfig>,
    pub(crate) pointers: PointerStore,
    pub(crate) buckets: Arc<dyn BucketStore>,
    pub(crate) tokens: Arc<TokenAuthority>,
    pub(crate) collaborators: Collaborators,
    pub(crate) deletion: DeletePiecesService,
    pub(crate) create_requests: Arc<CreateRequests>,
    pub(crate) clock: Arc<dyn PhysicalClock>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .field("satellite_id", &self.tokens.satellite_id())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Build an endpoint after validating `config`.
    pub fn new(
        config: MetainfoConfig,
        pointers: PointerStore,
        buckets: Arc<dyn BucketStore>,
        tokens: TokenAuthority,
        collaborators: Collaborators,
        clock: Arc<dyn PhysicalClock>,
    ) -> Result<Self> {
        config.validate()?;

        let deletion = DeletePiecesService::new(
            collaborators.piece_deleter.clone(),
            &config.piece_deletion,
        );
        let create_requests = Arc::new(CreateRequests::from_config(&config.create_requests));

        tracing::info!(
            satellite_id = %tokens.satellite_id(),
            rs = %config.rs,
            validate_rs = config.validate_rs,
            "metainfo endpoint ready"
        );

        Ok(Self {
            config: Arc::new(config),
            pointers,
            buckets,
            tokens: Arc::new(tokens),
            collaborators,
            deletion,
            create_requests,
            clock,
        })
    }

    /// Share an existing legacy creation table instead of the endpoint's own.
    pub fn with_create_requests(mut self, create_requests: Arc<CreateRequests>) -> Self {
        self.create_requests = create_requests;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &MetainfoConfig {
        &self.config
    }

    /// Pointer store the endpoint writes to.
    pub fn pointers(&self) -> &PointerStore {
        &self.pointers
    }

    /// Legacy creation table.
    pub fn create_requests(&self) -> &CreateRequests {
        &self.create_requests
    }

    /// The only scheme remote segments are created with.
    pub(crate) fn satellite_redundancy(&self) -> RedundancyScheme {
        self.config.rs.scheme()
    }

    /// Reject upload size hints outside `[0, max_segment_size]`.
    pub(crate) fn check_max_segment_size(&self, size: i64) -> Result<()> {
        let max = self.config.max_segment_size.as_i64();
        if size < 0 || size > max {
            return Err(MetainfoError::invalid_argument(format!(
                "segment size {size} is outside [0, {max}]"
            )));
        }
        Ok(())
    }

    pub(crate) async fn validate_auth(
        &self,
        header: &RequestHeader,
        op: ActionKind,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<KeyInfo> {
        let action = Action {
            op,
            bucket: bucket.to_vec(),
            encrypted_path: encrypted_path.to_vec(),
            time: self.clock.now(),
        };
        self.collaborators
            .authorizer
            .validate_auth(header, &action)
            .await
            .map_err(|e| MetainfoError::unauthenticated(e.message()))
    }

    pub(crate) fn issue_stream_id(&self, token: &StreamToken) -> Result<StreamId> {
        self.tokens
            .issue_stream_token(token)
            .map_err(|e| MetainfoError::internal(e.to_string()))
    }

    pub(crate) fn issue_segment_id(&self, token: &SegmentToken) -> Result<SegmentId> {
        self.tokens
            .issue_segment_token(token)
            .map_err(|e| MetainfoError::internal(e.to_string()))
    }

    /// Every token failure looks the same to the client.
    pub(crate) fn open_stream_id(&self, id: &StreamId) -> Result<StreamToken> {
        self.tokens
            .verify_stream_token(id, self.clock.now())
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected stream id");
                MetainfoError::unauthenticated("invalid or expired stream id")
            })
    }

    pub(crate) fn open_segment_id(&self, id: &SegmentId) -> Result<SegmentToken> {
        self.tokens
            .verify_segment_token(id, self.clock.now())
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected segment id");
                MetainfoError::unauthenticated("invalid or expired segment id")
            })
    }

    /// Reject when the project is over its storage limit.
    ///
    /// With `strict` unset a failed lookup is logged and the request proceeds.
    pub(crate) async fn check_storage_usage(&self, project_id: ProjectId, strict: bool) -> Result<()> {
        match self.collaborators.usage.exceeds_storage_usage(project_id).await {
            Ok(check) if check.exceeded => {
                tracing::error!(
                    %project_id,
                    limit = %check.limit,
                    "project storage limit exceeded"
                );
                Err(MetainfoError::resource_exhausted("Exceeded Usage Limit"))
            }
            Ok(_) => Ok(()),
            Err(e) if strict => Err(MetainfoError::internal(e.message())),
            Err(e) => {
                tracing::error!(%project_id, error = %e, "retrieving project storage totals");
                Ok(())
            }
        }
    }

    /// Reject when the project is over its bandwidth limit. Lookup failures are logged.
    pub(crate) async fn check_bandwidth_usage(&self, project_id: ProjectId, bucket: &[u8]) -> Result<()> {
        let bucket_id = bucket_id(project_id, bucket);
        match self
            .collaborators
            .usage
            .exceeds_bandwidth_usage(project_id, &bucket_id)
            .await
        {
            Ok(check) if check.exceeded => {
                tracing::error!(
                    %project_id,
                    limit = %check.limit,
                    "project bandwidth limit exceeded"
                );
                Err(MetainfoError::resource_exhausted("Exceeded Usage Limit"))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(%project_id, error = %e, "retrieving project bandwidth total");
                Ok(())
            }
        }
    }

    /// Adjust stored bytes, logging instead of failing.
    pub(crate) async fn track_storage_usage(&self, project_id: ProjectId, delta: i64) {
        if let Err(e) = self
            .collaborators
            .usage
            .add_project_storage_usage(project_id, delta)
            .await
        {
            tracing::error!(%project_id, delta, error = %e, "could not track storage usage by project");
        }
    }

    /// Encode a segment path, reporting a bad index as the client's fault.
    pub(crate) fn segment_path(
        project_id: ProjectId,
        index: i64,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<Vec<u8>> {
        create_path(project_id, index, bucket, encrypted_path)
            .map_err(|e| MetainfoError::invalid_argument(e.message()))
    }

    /// Pointer at a segment and its encoded path. NotFound passes through.
    pub(crate) async fn get_pointer(
        &self,
        project_id: ProjectId,
        index: i64,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<(Pointer, Vec<u8>)> {
        let path = Self::segment_path(project_id, index, bucket, encrypted_path)?;
        match self.pointers.get(&path).await {
            Ok(pointer) => Ok((pointer, path)),
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                tracing::error!(error = %e, "error getting the pointer from the pointer store");
                Err(MetainfoError::internal(e.message()))
            }
        }
    }
}
