//! Object lifecycle: begin, commit, get, list, delete.

use strata_core::{
    MetainfoError, PieceId, ProjectId, RedundancyScheme, RemoteSegment, Result, StreamMeta,
    LAST_SEGMENT,
};
use strata_signature::{StreamId, StreamToken};
use strata_store::{CipherSuite, EncryptionParameters};

use super::Endpoint;
use crate::collaborators::ActionKind;
use crate::messages::{
    BeginDeleteObjectRequest, BeginObjectRequest, BeginObjectResponse, CommitObjectRequest,
    FinishDeleteObjectRequest, GetObjectRequest, ListObjectsRequest, ListObjectsResponse,
    ObjectInfo, ObjectListItem,
};
use crate::validation::validate_bucket;

impl Endpoint {
    /// Start an object upload.
    ///
    /// Any object already stored under the same key is deleted first so the
    /// new upload never mixes with old segments.
    pub async fn begin_object(&self, req: BeginObjectRequest) -> Result<BeginObjectResponse> {
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &req.bucket, &req.encrypted_path)
            .await?;

        validate_bucket(&req.bucket)?;

        let now = self.clock.now();
        if matches!(req.expires_at, Some(expires_at) if expires_at <= now) {
            return Err(MetainfoError::invalid_argument("Invalid expiration time"));
        }

        let redundancy = self.satellite_redundancy();
        let stream_id = self.issue_stream_id(&StreamToken {
            bucket: req.bucket.clone(),
            encrypted_path: req.encrypted_path.clone(),
            version: req.version,
            redundancy,
            creation_date: now,
            expiration_date: req.expires_at,
        })?;

        match self
            .delete_object_pieces(key.project_id, &req.bucket, &req.encrypted_path)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::info!(
            project_id = %key.project_id,
            operation = "put",
            kind = "object",
            "Object Upload"
        );

        Ok(BeginObjectResponse {
            bucket: req.bucket,
            encrypted_path: req.encrypted_path,
            version: req.version,
            stream_id,
            redundancy,
        })
    }

    /// Finish an upload by moving the highest numbered segment to LAST and
    /// attaching the stream metadata.
    pub async fn commit_object(&self, req: CommitObjectRequest) -> Result<()> {
        let stream = self.open_stream_id(&req.stream_id)?;
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &stream.bucket, &stream.encrypted_path)
            .await?;

        let max_metadata = self.config.max_metadata_size.as_i64();
        if req.encrypted_metadata.len() as i64 > max_metadata {
            return Err(MetainfoError::invalid_argument(format!(
                "metadata too large, got {} bytes, maximum allowed is {max_metadata}",
                req.encrypted_metadata.len()
            )));
        }

        let meta = StreamMeta::from_bytes(&req.encrypted_metadata)
            .map_err(|_| MetainfoError::invalid_argument("invalid metadata structure"))?;

        let last_index = meta
            .number_of_segments
            .checked_sub(1)
            .ok_or_else(|| MetainfoError::invalid_argument("invalid metadata structure"))?;
        let path = Self::segment_path(
            key.project_id,
            last_index,
            &stream.bucket,
            &stream.encrypted_path,
        )?;

        let (old_bytes, mut pointer) = self.pointers.get_with_bytes(&path).await.map_err(|e| {
            if e.is_not_found() {
                MetainfoError::not_found(format!(
                    "unable to find object: {}/{}",
                    String::from_utf8_lossy(&stream.bucket),
                    String::from_utf8_lossy(&stream.encrypted_path),
                ))
            } else {
                tracing::error!(error = %e, "unable to get pointer");
                MetainfoError::internal("unable to commit object")
            }
        })?;

        match pointer.remote.as_mut() {
            Some(remote) => remote.redundancy = stream.redundancy,
            None => {
                pointer.remote = Some(RemoteSegment {
                    root_piece_id: PieceId::default(),
                    redundancy: stream.redundancy,
                    remote_pieces: Vec::new(),
                });
            }
        }
        pointer.metadata = req.encrypted_metadata;

        let last_path = Self::segment_path(
            key.project_id,
            LAST_SEGMENT,
            &stream.bucket,
            &stream.encrypted_path,
        )?;

        self.pointers.delete(&path, &old_bytes).await.map_err(|e| {
            tracing::error!(error = %e, "unable to delete pointer");
            MetainfoError::internal("unable to commit object")
        })?;
        self.pointers
            .unsynchronized_put(&last_path, &pointer)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "unable to put pointer");
                MetainfoError::internal("unable to commit object")
            })?;

        tracing::debug!(
            project_id = %key.project_id,
            segments = meta.number_of_segments,
            "object committed"
        );
        Ok(())
    }

    /// Metadata of a committed object.
    pub async fn get_object(&self, req: GetObjectRequest) -> Result<ObjectInfo> {
        let key = self
            .validate_auth(&req.header, ActionKind::Read, &req.bucket, &req.encrypted_path)
            .await?;

        validate_bucket(&req.bucket)?;

        let (pointer, _) = self
            .get_pointer(key.project_id, LAST_SEGMENT, &req.bucket, &req.encrypted_path)
            .await?;

        let meta = StreamMeta::from_bytes(&pointer.metadata)
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let stream_id = self.issue_stream_id(&StreamToken {
            bucket: req.bucket.clone(),
            encrypted_path: req.encrypted_path.clone(),
            version: req.version,
            redundancy: self.satellite_redundancy(),
            creation_date: self.clock.now(),
            expiration_date: pointer.expiration_date,
        })?;

        let redundancy = match pointer.remote.as_ref() {
            Some(remote) => Some(remote.redundancy),
            // with a single segment LAST is the only one, nothing to probe
            None if meta.number_of_segments == 0 || meta.number_of_segments > 1 => {
                self.first_remote_redundancy(key.project_id, &req.bucket, &req.encrypted_path)
                    .await?
            }
            None => None,
        };

        tracing::info!(
            project_id = %key.project_id,
            operation = "get",
            kind = "object",
            "Object Download"
        );

        Ok(ObjectInfo {
            bucket: req.bucket,
            encrypted_path: req.encrypted_path,
            version: -1,
            stream_id,
            created_at: pointer.creation_date,
            expires_at: pointer.expiration_date,
            encrypted_metadata: pointer.metadata,
            encryption: EncryptionParameters {
                cipher_suite: CipherSuite::from_i32(meta.encryption_type),
                block_size: meta.encryption_block_size,
            },
            redundancy,
        })
    }

    /// Scheme of the first remote numbered segment, probing until one is missing.
    async fn first_remote_redundancy(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<Option<RedundancyScheme>> {
        let mut index = 0;
        loop {
            match self.get_pointer(project_id, index, bucket, encrypted_path).await {
                Ok((pointer, _)) => {
                    if let Some(remote) = pointer.remote {
                        return Ok(Some(remote.redundancy));
                    }
                }
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => {
                    tracing::error!(error = %e, "unable to get pointer");
                    return Err(MetainfoError::internal("unable to get object"));
                }
            }
            index += 1;
        }
    }

    /// List committed objects under a prefix.
    pub async fn list_objects(&self, req: ListObjectsRequest) -> Result<ListObjectsResponse> {
        let key = self
            .validate_auth(&req.header, ActionKind::List, &req.bucket, &req.encrypted_prefix)
            .await?;

        validate_bucket(&req.bucket)?;

        let prefix = Self::segment_path(
            key.project_id,
            LAST_SEGMENT,
            &req.bucket,
            &req.encrypted_prefix,
        )?;

        let limit = if req.limit == 0 || req.limit > self.config.list_limit {
            self.config.list_limit
        } else {
            req.limit
        };

        let (listed, more) = self
            .pointers
            .list(&prefix, &req.encrypted_cursor, req.recursive, limit)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        let items = listed
            .into_iter()
            .map(|item| match item.pointer {
                Some(pointer) => ObjectListItem {
                    encrypted_path: item.path,
                    encrypted_metadata: pointer.metadata,
                    created_at: Some(pointer.creation_date),
                    expires_at: pointer.expiration_date,
                    is_prefix: item.is_prefix,
                },
                None => ObjectListItem {
                    encrypted_path: item.path,
                    encrypted_metadata: Vec::new(),
                    created_at: None,
                    expires_at: None,
                    is_prefix: item.is_prefix,
                },
            })
            .collect();

        tracing::info!(
            project_id = %key.project_id,
            operation = "list",
            kind = "object",
            "Object List"
        );

        Ok(ListObjectsResponse { items, more })
    }

    /// Delete an object's segments and fan out piece deletion.
    ///
    /// Returns NotFound when the object has no segments at all.
    pub async fn begin_delete_object(&self, req: BeginDeleteObjectRequest) -> Result<StreamId> {
        let key = self
            .validate_auth(&req.header, ActionKind::Delete, &req.bucket, &req.encrypted_path)
            .await?;

        validate_bucket(&req.bucket)?;

        let stream_id = self.issue_stream_id(&StreamToken {
            bucket: req.bucket.clone(),
            encrypted_path: req.encrypted_path.clone(),
            version: req.version,
            redundancy: self.satellite_redundancy(),
            creation_date: self.clock.now(),
            expiration_date: None,
        })?;

        self.delete_object_pieces(key.project_id, &req.bucket, &req.encrypted_path)
            .await?;

        tracing::info!(
            project_id = %key.project_id,
            operation = "delete",
            kind = "object",
            "Object Delete"
        );

        Ok(stream_id)
    }

    /// Acknowledge a delete. All work happened in [`Self::begin_delete_object`].
    pub async fn finish_delete_object(&self, req: FinishDeleteObjectRequest) -> Result<()> {
        let stream = self.open_stream_id(&req.stream_id)?;
        self.validate_auth(&req.header, ActionKind::Delete, &stream.bucket, &stream.encrypted_path)
            .await?;
        Ok(())
    }
}
