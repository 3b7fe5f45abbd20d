//! Legacy v1 segment operations.
//!
//! Clients build the pointer themselves and address segments by bucket, key
//! and index instead of carrying tokens. Remote commits are matched against
//! the parameters recorded at creation.

use strata_core::{
    bucket_id, calc_piece_size, MetainfoError, OrderLimit, Pointer, PointerKind, Result,
    SerialNumber,
};

use super::Endpoint;
use crate::collaborators::{ActionKind, FindStorageNodesRequest, PiecePrivateKey};
use crate::messages::{
    CommitSegmentRequestOld, CreateSegmentRequestOld, CreateSegmentResponseOld,
    DeleteSegmentResponseOld, DownloadSegmentResponseOld, ListSegmentsRequestOld,
    ListSegmentsResponseOld, SegmentLocation,
};
use crate::pieces::filter_valid_pieces;
use crate::validation::{validate_bucket, validate_pointer, validate_redundancy, PointerPolicy};

impl Endpoint {
    /// Stored pointer of one segment.
    pub async fn segment_info_old(&self, location: SegmentLocation) -> Result<Pointer> {
        let key = self
            .validate_auth(&location.header, ActionKind::Read, &location.bucket, &location.path)
            .await?;

        validate_bucket(&location.bucket)?;

        let (pointer, _) = self
            .get_pointer(key.project_id, location.segment, &location.bucket, &location.path)
            .await?;
        Ok(pointer)
    }

    /// Select nodes and hand out PUT limits for a client-chosen scheme.
    pub async fn create_segment_old(
        &self,
        req: CreateSegmentRequestOld,
    ) -> Result<CreateSegmentResponseOld> {
        let location = &req.location;
        let key = self
            .validate_auth(&location.header, ActionKind::Write, &location.bucket, &location.path)
            .await?;

        validate_bucket(&location.bucket)?;

        let now = self.clock.now();
        if matches!(req.expiration, Some(expiration) if expiration <= now) {
            return Err(MetainfoError::invalid_argument("Invalid expiration time"));
        }

        validate_redundancy(&req.redundancy, &self.config.rs, self.config.validate_rs)?;
        self.check_max_segment_size(req.max_encrypted_segment_size)?;

        self.check_storage_usage(key.project_id, false).await?;

        let max_piece_size = calc_piece_size(req.max_encrypted_segment_size, &req.redundancy);
        let nodes = self
            .collaborators
            .overlay
            .find_storage_nodes(FindStorageNodesRequest {
                requested_count: usize::from(req.redundancy.total),
                free_bandwidth: max_piece_size,
            })
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let bucket_id = bucket_id(key.project_id, &location.bucket);
        let (root_piece_id, addressed_limits, private_key) = self
            .collaborators
            .orders
            .create_put_order_limits(&bucket_id, &nodes, req.expiration, max_piece_size)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        if let Some(first) = addressed_limits.first() {
            self.create_requests
                .put(first.limit.serial_number, req.expiration, req.redundancy, now);
        }

        Ok(CreateSegmentResponseOld {
            addressed_limits,
            root_piece_id,
            private_key,
        })
    }

    /// Validate and store a client-built pointer, returning it as stored.
    pub async fn commit_segment_old(&self, req: CommitSegmentRequestOld) -> Result<Pointer> {
        let location = &req.location;
        let key = self
            .validate_auth(&location.header, ActionKind::Write, &location.bucket, &location.path)
            .await?;

        validate_bucket(&location.bucket)?;

        self.validate_commit_segment(&req).await.map_err(|e| {
            tracing::debug!(error = %e, "legacy commit rejected");
            MetainfoError::internal(e.message())
        })?;

        let mut pointer = req.pointer.clone();
        filter_valid_pieces(
            &mut pointer,
            &req.original_limits,
            self.collaborators.identities.as_ref(),
            self.config.piece_hash_expiration(),
            self.clock.now(),
        )
        .await?;

        let path = Self::segment_path(
            key.project_id,
            location.segment,
            &location.bucket,
            &location.path,
        )?;

        self.check_storage_usage(key.project_id, true).await?;

        if let Some(remote) = pointer.remote.as_mut() {
            for piece in &mut remote.remote_pieces {
                piece.hash = None;
            }
        }
        pointer.piece_hashes_verified = true;

        if pointer.exceeds_redundancy_bound() {
            return Err(MetainfoError::invalid_argument(
                "mismatched segment size and piece usage",
            ));
        }

        self.track_storage_usage(key.project_id, pointer.space_used().segment_size)
            .await;

        self.pointers
            .unsynchronized_put(&path, &pointer)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        if pointer.kind == PointerKind::Inline {
            self.collaborators
                .orders
                .update_put_inline_order(
                    key.project_id,
                    &location.bucket,
                    pointer.inline_segment.len() as i64,
                )
                .await
                .map_err(|e| MetainfoError::internal(e.message()))?;
        }

        let stored = self
            .pointers
            .get(&path)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        if let Some(serial) = first_serial(&req.original_limits) {
            self.create_requests.remove(&serial);
        }

        Ok(stored)
    }

    async fn validate_commit_segment(&self, req: &CommitSegmentRequestOld) -> Result<()> {
        let now = self.clock.now();
        let policy = PointerPolicy {
            max_segment_size: self.config.max_segment_size.as_i64(),
            max_commit_interval: self.config.max_commit_interval(),
        };
        validate_pointer(
            &req.pointer,
            &req.original_limits,
            self.collaborators.orders.as_ref(),
            &policy,
            now,
        )
        .await?;

        if req.pointer.kind != PointerKind::Remote {
            return Ok(());
        }
        let Some(remote) = req.pointer.remote.as_ref() else {
            return Ok(());
        };

        let request = first_serial(&req.original_limits)
            .and_then(|serial| self.create_requests.load(&serial, now))
            .ok_or_else(|| {
                MetainfoError::invalid_argument("missing create request or request expired")
            })?;

        if request.expiration != req.pointer.expiration_date {
            return Err(MetainfoError::invalid_argument(
                "pointer expiration date does not match requested one",
            ));
        }
        if request.redundancy != remote.redundancy {
            return Err(MetainfoError::invalid_argument(
                "pointer redundancy scheme date does not match requested one",
            ));
        }
        Ok(())
    }

    /// Stored pointer plus GET limits for its pieces.
    pub async fn download_segment_old(
        &self,
        location: SegmentLocation,
    ) -> Result<DownloadSegmentResponseOld> {
        let key = self
            .validate_auth(&location.header, ActionKind::Read, &location.bucket, &location.path)
            .await?;

        validate_bucket(&location.bucket)?;

        self.check_bandwidth_usage(key.project_id, &location.bucket)
            .await?;

        let (pointer, _) = self
            .get_pointer(key.project_id, location.segment, &location.bucket, &location.path)
            .await?;

        match pointer.kind {
            PointerKind::Inline => {
                self.collaborators
                    .orders
                    .update_get_inline_order(
                        key.project_id,
                        &location.bucket,
                        pointer.inline_segment.len() as i64,
                    )
                    .await
                    .map_err(|e| MetainfoError::internal(e.message()))?;
                Ok(DownloadSegmentResponseOld {
                    pointer,
                    addressed_limits: Vec::new(),
                    private_key: PiecePrivateKey::default(),
                })
            }
            PointerKind::Remote if pointer.remote.is_some() => {
                let bucket_id = bucket_id(key.project_id, &location.bucket);
                let (addressed_limits, private_key) = self
                    .collaborators
                    .orders
                    .create_get_order_limits(&bucket_id, &pointer)
                    .await
                    .map_err(|e| MetainfoError::internal(e.message()))?;
                Ok(DownloadSegmentResponseOld {
                    pointer,
                    addressed_limits,
                    private_key,
                })
            }
            PointerKind::Remote => Ok(DownloadSegmentResponseOld {
                pointer,
                addressed_limits: Vec::new(),
                private_key: PiecePrivateKey::default(),
            }),
        }
    }

    /// Remove a pointer and hand out DELETE limits for its pieces.
    pub async fn delete_segment_old(
        &self,
        location: SegmentLocation,
    ) -> Result<DeleteSegmentResponseOld> {
        let key = self
            .validate_auth(&location.header, ActionKind::Delete, &location.bucket, &location.path)
            .await?;

        validate_bucket(&location.bucket)?;

        let (pointer, path) = self
            .get_pointer(key.project_id, location.segment, &location.bucket, &location.path)
            .await?;

        self.pointers
            .unsynchronized_delete(&path)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    e
                } else {
                    MetainfoError::internal(e.message())
                }
            })?;

        if pointer.kind != PointerKind::Remote || pointer.remote.is_none() {
            return Ok(DeleteSegmentResponseOld::default());
        }

        let bucket_id = bucket_id(key.project_id, &location.bucket);
        let (addressed_limits, private_key) = self
            .collaborators
            .orders
            .create_delete_order_limits(&bucket_id, &pointer)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        Ok(DeleteSegmentResponseOld {
            addressed_limits,
            private_key,
        })
    }

    /// Raw pointer listing under a key prefix.
    pub async fn list_segments_old(
        &self,
        req: ListSegmentsRequestOld,
    ) -> Result<ListSegmentsResponseOld> {
        let key = self
            .validate_auth(&req.header, ActionKind::List, &req.bucket, &req.prefix)
            .await?;

        let prefix = Self::segment_path(
            key.project_id,
            strata_core::LAST_SEGMENT,
            &req.bucket,
            &req.prefix,
        )?;

        let (items, more) = self
            .pointers
            .list(&prefix, &req.start_after, req.recursive, req.limit)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        Ok(ListSegmentsResponseOld { items, more })
    }
}

/// Every limit of a segment shares one serial number.
fn first_serial(limits: &[Option<OrderLimit>]) -> Option<SerialNumber> {
    limits.iter().flatten().next().map(|limit| limit.serial_number)
}
