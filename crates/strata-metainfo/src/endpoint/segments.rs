//! Segment upload, listing, download and deletion.

use strata_core::{
    bucket_id, calc_piece_size, AddressedOrderLimit, MetainfoError, OrderLimit, PieceId, Pointer,
    PointerKind, ProjectId, RemotePiece, RemoteSegment, Result, SegmentMeta, StreamMeta, LAST_SEGMENT,
};
use strata_signature::{SegmentToken, StreamToken};

use super::{Endpoint, NONCE_SIZE};
use crate::collaborators::{ActionKind, FindStorageNodesRequest, PiecePrivateKey};
use crate::messages::{
    BeginDeleteSegmentRequest, BeginDeleteSegmentResponse, BeginSegmentRequest,
    BeginSegmentResponse, CommitSegmentRequest, CommitSegmentResponse, DownloadSegmentRequest,
    DownloadSegmentResponse, FinishDeleteSegmentRequest, ListSegmentsRequest,
    ListSegmentsResponse, MakeInlineSegmentRequest, SegmentPosition,
};
use crate::pieces::filter_valid_pieces;
use crate::validation::{validate_pointer, PointerPolicy};

impl Endpoint {
    /// Select nodes and hand out PUT order limits for a remote segment.
    pub async fn begin_segment(&self, req: BeginSegmentRequest) -> Result<BeginSegmentResponse> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &stream.bucket, &stream.encrypted_path)
            .await?;

        if req.position.index < 0 {
            return Err(MetainfoError::invalid_argument(
                "segment index must be greater then 0",
            ));
        }

        self.check_max_segment_size(req.max_order_limit)?;
        self.check_storage_usage(key.project_id, false).await?;

        let redundancy = stream.redundancy;
        redundancy.validate()?;
        let max_piece_size = calc_piece_size(req.max_order_limit, &redundancy);

        let nodes = self
            .collaborators
            .overlay
            .find_storage_nodes(FindStorageNodesRequest {
                requested_count: usize::from(redundancy.total),
                free_bandwidth: max_piece_size,
            })
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let bucket_id = bucket_id(key.project_id, &stream.bucket);
        let (root_piece_id, addressed_limits, private_key) = self
            .collaborators
            .orders
            .create_put_order_limits(&bucket_id, &nodes, stream.expiration_date, max_piece_size)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let index = req.position.index;
        let segment_id = self.issue_segment_id(&SegmentToken {
            stream,
            index,
            original_order_limits: addressed_limits.clone(),
            root_piece_id,
            creation_date: self.clock.now(),
        })?;

        tracing::info!(
            project_id = %key.project_id,
            operation = "put",
            kind = "remote",
            index,
            nodes = nodes.len(),
            "Segment Upload"
        );

        Ok(BeginSegmentResponse {
            segment_id,
            addressed_limits,
            private_key,
        })
    }

    /// Validate piece uploads and store the segment's pointer.
    ///
    /// Nothing is written unless the pointer and enough pieces validate.
    pub async fn commit_segment(&self, req: CommitSegmentRequest) -> Result<CommitSegmentResponse> {
        let segment = self.open_segment_id(&req.segment_id)?;
        let stream = &segment.stream;
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &stream.bucket, &stream.encrypted_path)
            .await?;

        let success_threshold = usize::from(stream.redundancy.success);
        if req.upload_result.len() < success_threshold {
            return Err(MetainfoError::invalid_argument(format!(
                "the number of results of uploaded pieces ({}) is below the optimal threshold ({success_threshold})",
                req.upload_result.len()
            )));
        }

        let remote_pieces = req
            .upload_result
            .into_iter()
            .map(|result| RemotePiece {
                piece_num: result.piece_num,
                node_id: result.node_id,
                hash: result.hash,
            })
            .collect();

        let metadata = SegmentMeta {
            encrypted_key: req.encrypted_key,
            key_nonce: req.encrypted_key_nonce,
        }
        .to_bytes()
        .map_err(|e| MetainfoError::internal(e.message()))?;

        let mut pointer = Pointer {
            kind: PointerKind::Remote,
            inline_segment: Vec::new(),
            remote: Some(RemoteSegment {
                root_piece_id: segment.root_piece_id,
                redundancy: stream.redundancy,
                remote_pieces,
            }),
            segment_size: req.size_encrypted_data,
            creation_date: stream.creation_date,
            expiration_date: stream.expiration_date,
            metadata,
            piece_hashes_verified: true,
        };

        let original_limits: Vec<Option<OrderLimit>> = segment
            .original_order_limits
            .iter()
            .map(|addressed| Some(addressed.limit.clone()))
            .collect();

        let now = self.clock.now();
        let policy = PointerPolicy {
            max_segment_size: self.config.max_segment_size.as_i64(),
            max_commit_interval: self.config.max_commit_interval(),
        };
        validate_pointer(
            &pointer,
            &original_limits,
            self.collaborators.orders.as_ref(),
            &policy,
            now,
        )
        .await?;

        filter_valid_pieces(
            &mut pointer,
            &original_limits,
            self.collaborators.identities.as_ref(),
            self.config.piece_hash_expiration(),
            now,
        )
        .await?;

        let path = Self::segment_path(
            key.project_id,
            segment.index,
            &stream.bucket,
            &stream.encrypted_path,
        )?;

        self.check_storage_usage(key.project_id, true).await?;

        if let Some(remote) = pointer.remote.as_mut() {
            for piece in &mut remote.remote_pieces {
                piece.hash = None;
            }
        }

        if pointer.exceeds_redundancy_bound() {
            tracing::debug!(
                segment_size = pointer.segment_size,
                pieces = pointer.pieces().len(),
                "segment size does not fit its pieces"
            );
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

        let successful_pieces = pointer.pieces().len();
        tracing::debug!(
            project_id = %key.project_id,
            index = segment.index,
            successful_pieces,
            "segment committed"
        );
        Ok(CommitSegmentResponse { successful_pieces })
    }

    /// Store a small segment directly in its pointer.
    pub async fn make_inline_segment(&self, req: MakeInlineSegmentRequest) -> Result<()> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &stream.bucket, &stream.encrypted_path)
            .await?;

        if req.position.index < 0 {
            return Err(MetainfoError::invalid_argument(
                "segment index must be greater then 0",
            ));
        }

        let inline_size = req.encrypted_inline_data.len() as i64;
        let max_inline = self.config.max_inline_segment_size.as_i64();
        if inline_size > max_inline {
            return Err(MetainfoError::invalid_argument(format!(
                "inline segment size cannot be larger than {max_inline}"
            )));
        }

        let path = Self::segment_path(
            key.project_id,
            req.position.index,
            &stream.bucket,
            &stream.encrypted_path,
        )?;

        self.check_storage_usage(key.project_id, true).await?;
        self.track_storage_usage(key.project_id, inline_size).await;

        let metadata = SegmentMeta {
            encrypted_key: req.encrypted_key,
            key_nonce: req.encrypted_key_nonce,
        }
        .to_bytes()
        .map_err(|e| MetainfoError::internal(e.message()))?;

        let pointer = Pointer::inline(
            req.encrypted_inline_data,
            stream.creation_date,
            stream.expiration_date,
            metadata,
        );

        self.pointers
            .unsynchronized_put(&path, &pointer)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        self.collaborators
            .orders
            .update_put_inline_order(key.project_id, &stream.bucket, inline_size)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        tracing::info!(
            project_id = %key.project_id,
            operation = "put",
            kind = "inline",
            index = req.position.index,
            "Inline Segment Upload"
        );
        Ok(())
    }

    /// Remove one segment's pointer and hand out DELETE limits for its pieces.
    pub async fn begin_delete_segment(
        &self,
        req: BeginDeleteSegmentRequest,
    ) -> Result<BeginDeleteSegmentResponse> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::Delete, &stream.bucket, &stream.encrypted_path)
            .await?;

        let (pointer, path) = self
            .get_pointer(
                key.project_id,
                req.position.index,
                &stream.bucket,
                &stream.encrypted_path,
            )
            .await?;

        let (addressed_limits, private_key) =
            if pointer.kind == PointerKind::Remote && pointer.remote.is_some() {
                let bucket_id = bucket_id(key.project_id, &stream.bucket);
                self.collaborators
                    .orders
                    .create_delete_order_limits(&bucket_id, &pointer)
                    .await
                    .map_err(|e| MetainfoError::internal(e.message()))?
            } else {
                (Vec::new(), PiecePrivateKey::default())
            };

        // the pointer goes now, the client may never call finish
        self.pointers
            .unsynchronized_delete(&path)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let segment_id = self.issue_segment_id(&SegmentToken {
            stream,
            index: req.position.index,
            original_order_limits: addressed_limits.clone(),
            root_piece_id: PieceId::default(),
            creation_date: self.clock.now(),
        })?;

        tracing::info!(
            project_id = %key.project_id,
            operation = "delete",
            kind = "segment",
            index = req.position.index,
            "Segment Delete"
        );

        Ok(BeginDeleteSegmentResponse {
            segment_id,
            addressed_limits,
            private_key,
        })
    }

    /// Acknowledge a segment delete.
    pub async fn finish_delete_segment(&self, req: FinishDeleteSegmentRequest) -> Result<()> {
        let segment = self.open_segment_id(&req.segment_id)?;
        self.validate_auth(
            &req.header,
            ActionKind::Delete,
            &segment.stream.bucket,
            &segment.stream.encrypted_path,
        )
        .await?;
        Ok(())
    }

    /// Positions of an object's segments, LAST at the end.
    ///
    /// Uses the segment count from the stream metadata when the client
    /// disclosed it and probes the store otherwise.
    pub async fn list_segments(&self, req: ListSegmentsRequest) -> Result<ListSegmentsResponse> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::List, &stream.bucket, &stream.encrypted_path)
            .await?;

        let list_limit = self.config.list_limit as i64;
        let limit = if req.limit == 0 || req.limit > list_limit {
            list_limit
        } else {
            req.limit
        };
        let cursor = req.cursor_position.index;
        if cursor < 0 {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid cursor position {cursor}"
            )));
        }

        let last = match self
            .get_pointer(key.project_id, LAST_SEGMENT, &stream.bucket, &stream.encrypted_path)
            .await
        {
            Ok((pointer, _)) => pointer,
            Err(e) if e.is_not_found() => return Ok(ListSegmentsResponse::default()),
            Err(e) => return Err(e),
        };

        let meta = StreamMeta::from_bytes(&last.metadata)
            .map_err(|e| MetainfoError::internal(e.message()))?;

        tracing::info!(
            project_id = %key.project_id,
            operation = "list",
            kind = "segment",
            "Segment List"
        );

        if meta.number_of_segments > 0 {
            segments_from_count(meta.number_of_segments, cursor, limit)
        } else {
            self.probe_segments(key.project_id, &stream, cursor, limit)
                .await
        }
    }

    async fn probe_segments(
        &self,
        project_id: ProjectId,
        stream: &StreamToken,
        cursor: i64,
        limit: i64,
    ) -> Result<ListSegmentsResponse> {
        if limit <= 0 {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid limit, cannot be 0 or negative. Got {limit}"
            )));
        }

        let mut response = ListSegmentsResponse::default();
        let mut index = cursor;
        loop {
            match self
                .get_pointer(project_id, index, &stream.bucket, &stream.encrypted_path)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
            if response.items.len() as i64 == limit {
                response.more = true;
                break;
            }
            response.items.push(SegmentPosition::new(index));
            index += 1;
        }

        if limit > response.items.len() as i64 {
            response.items.push(SegmentPosition::LAST);
        } else {
            response.more = true;
        }
        Ok(response)
    }

    /// Everything a client needs to fetch one segment.
    pub async fn download_segment(
        &self,
        req: DownloadSegmentRequest,
    ) -> Result<DownloadSegmentResponse> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::Read, &stream.bucket, &stream.encrypted_path)
            .await?;

        self.check_bandwidth_usage(key.project_id, &stream.bucket)
            .await?;

        let index = req.cursor_position.index;
        let (pointer, _) = self
            .get_pointer(key.project_id, index, &stream.bucket, &stream.encrypted_path)
            .await?;

        let (encrypted_key, encrypted_key_nonce) = segment_key(&pointer, index)?;

        let segment_id = self.issue_segment_id(&SegmentToken {
            stream: stream.clone(),
            index,
            original_order_limits: Vec::new(),
            root_piece_id: PieceId::default(),
            creation_date: self.clock.now(),
        })?;

        match (pointer.kind, pointer.remote.as_ref()) {
            (PointerKind::Inline, _) => {
                self.collaborators
                    .orders
                    .update_get_inline_order(
                        key.project_id,
                        &stream.bucket,
                        pointer.inline_segment.len() as i64,
                    )
                    .await
                    .map_err(|e| MetainfoError::internal(e.message()))?;

                tracing::info!(
                    project_id = %key.project_id,
                    operation = "get",
                    kind = "inline",
                    index,
                    "Inline Segment Download"
                );

                Ok(DownloadSegmentResponse {
                    segment_id,
                    segment_size: pointer.segment_size,
                    encrypted_inline_data: pointer.inline_segment,
                    addressed_limits: Vec::new(),
                    private_key: PiecePrivateKey::default(),
                    encrypted_key_nonce,
                    encrypted_key,
                })
            }
            (PointerKind::Remote, Some(remote)) => {
                let bucket_id = bucket_id(key.project_id, &stream.bucket);
                let (limits, private_key) = self
                    .collaborators
                    .orders
                    .create_get_order_limits(&bucket_id, &pointer)
                    .await
                    .map_err(|e| MetainfoError::internal(e.message()))?;

                let addressed_limits =
                    limits_by_piece_num(limits, &remote.remote_pieces, remote.redundancy.total);

                tracing::info!(
                    project_id = %key.project_id,
                    operation = "get",
                    kind = "remote",
                    index,
                    "Segment Download"
                );

                Ok(DownloadSegmentResponse {
                    segment_id,
                    segment_size: pointer.segment_size,
                    encrypted_inline_data: Vec::new(),
                    addressed_limits,
                    private_key,
                    encrypted_key_nonce,
                    encrypted_key,
                })
            }
            (PointerKind::Remote, None) => {
                Err(MetainfoError::internal("invalid type of pointer"))
            }
        }
    }
}

/// Page positions when the stream metadata gives the segment count.
fn segments_from_count(count: i64, cursor: i64, limit: i64) -> Result<ListSegmentsResponse> {
    if count <= 0 || cursor > count {
        return Err(MetainfoError::internal("unable to list segments"));
    }

    let mut remaining = count - cursor;
    let mut response = ListSegmentsResponse::default();
    if remaining > 0 {
        if remaining > limit {
            response.more = true;
            remaining = limit;
        } else {
            // LAST is appended below
            remaining -= 1;
        }
        response.items = (0..remaining)
            .map(|i| SegmentPosition::new(cursor + i))
            .collect();
        if !response.more {
            response.items.push(SegmentPosition::LAST);
        }
    }
    Ok(response)
}

/// Encrypted key and nonce of a segment. LAST keeps them in its stream metadata.
fn segment_key(pointer: &Pointer, index: i64) -> Result<(Vec<u8>, Vec<u8>)> {
    if pointer.metadata.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let segment_meta = if index == LAST_SEGMENT {
        StreamMeta::from_bytes(&pointer.metadata)
            .map_err(|e| MetainfoError::internal(e.message()))?
            .last_segment_meta
    } else {
        Some(
            SegmentMeta::from_bytes(&pointer.metadata)
                .map_err(|e| MetainfoError::internal(e.message()))?,
        )
    };

    let Some(meta) = segment_meta else {
        return Ok((Vec::new(), Vec::new()));
    };
    if meta.key_nonce.len() > NONCE_SIZE {
        return Err(MetainfoError::internal(format!(
            "invalid key nonce length {}",
            meta.key_nonce.len()
        )));
    }
    Ok((meta.encrypted_key, meta.key_nonce))
}

/// Place each piece's limit at its piece number.
fn limits_by_piece_num(
    limits: Vec<AddressedOrderLimit>,
    pieces: &[RemotePiece],
    total: u16,
) -> Vec<Option<AddressedOrderLimit>> {
    let mut sorted = vec![None; usize::from(total)];
    for piece in pieces {
        let Some(slot) = sorted.get_mut(usize::from(piece.piece_num)) else {
            continue;
        };
        *slot = limits
            .iter()
            .find(|addressed| addressed.limit.storage_node_id == piece.node_id)
            .cloned();
    }
    sorted
}
