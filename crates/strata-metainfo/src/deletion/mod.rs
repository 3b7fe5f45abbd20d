//! Object deletion.
//!
//! Pointers are removed first, then every storage node holding a piece of
//! the object is asked to drop it. Accounting is decremented only for
//! pointers this call actually removed, so repeating a delete is harmless.

mod service;

pub use service::{DeletePiecesService, NodePieces};

use std::collections::HashMap;

use strata_core::{
    MetainfoError, NodeId, PieceId, Pointer, PointerKind, ProjectId, Result, StreamMeta,
    LAST_SEGMENT,
};

use crate::endpoint::Endpoint;

/// Pieces grouped by node, in the order nodes were first seen.
#[derive(Debug, Default)]
struct PiecesByNode {
    order: Vec<NodeId>,
    pieces: HashMap<NodeId, Vec<PieceId>>,
    freed_bytes: i64,
}

impl PiecesByNode {
    fn add(&mut self, pointer: &Pointer) {
        if pointer.kind != PointerKind::Remote {
            return;
        }
        let Some(remote) = pointer.remote.as_ref() else {
            return;
        };
        for piece in &remote.remote_pieces {
            let piece_id = remote.root_piece_id.derive(&piece.node_id, piece.piece_num);
            self.pieces
                .entry(piece.node_id)
                .or_insert_with(|| {
                    self.order.push(piece.node_id);
                    Vec::new()
                })
                .push(piece_id);
        }
        self.freed_bytes += pointer.segment_size;
    }
}

impl Endpoint {
    /// Delete every segment of an object and its pieces on storage nodes.
    ///
    /// Runs as its own task so a caller that goes away mid-request cannot
    /// leave the object half deleted. Fails with NotFound when the object
    /// has no segments at all.
    pub async fn delete_object_pieces(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<()> {
        let endpoint = self.clone();
        let bucket = bucket.to_vec();
        let encrypted_path = encrypted_path.to_vec();
        tokio::spawn(async move {
            endpoint
                .delete_object_pieces_detached(project_id, &bucket, &encrypted_path)
                .await
        })
        .await
        .map_err(|e| MetainfoError::internal(format!("object deletion task failed: {e}")))?
    }

    async fn delete_object_pieces_detached(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<()> {
        let (last_found, previous_last) = match self
            .number_of_segments(project_id, bucket, encrypted_path)
            .await
        {
            Ok(count) if count > 0 => (true, count - 2),
            // LAST exists but the count was not disclosed
            Ok(_) => (
                true,
                self.find_previous_last_segment(project_id, bucket, encrypted_path)
                    .await?,
            ),
            Err(e) if e.is_not_found() => {
                let previous = self
                    .find_previous_last_segment(project_id, bucket, encrypted_path)
                    .await?;
                if previous == LAST_SEGMENT {
                    return Err(e);
                }
                (false, previous)
            }
            Err(e) => return Err(e),
        };

        let mut by_node = PiecesByNode::default();

        if last_found {
            match self
                .delete_pointer(project_id, LAST_SEGMENT, bucket, encrypted_path)
                .await
            {
                Ok(pointer) => by_node.add(&pointer),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(%project_id, "LAST segment vanished during deletion");
                }
                Err(e) => return Err(MetainfoError::internal(e.message())),
            }
        }

        for index in (0..=previous_last).rev() {
            match self
                .delete_pointer(project_id, index, bucket, encrypted_path)
                .await
            {
                Ok(pointer) => by_node.add(&pointer),
                Err(e) => {
                    tracing::warn!(%project_id, index, error = %e, "unable to delete segment pointer");
                }
            }
        }

        if by_node.order.is_empty() {
            return Ok(());
        }

        let reliable = match self
            .collaborators
            .overlay
            .known_reliable(&by_node.order)
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(error = %e, "unable to look up storage nodes, pieces are left for garbage collection");
                return Ok(());
            }
        };

        let mut requests = Vec::with_capacity(reliable.len());
        for node in reliable {
            if let Some(pieces) = by_node.pieces.remove(&node.id) {
                requests.push(NodePieces { node, pieces });
            }
        }

        tracing::debug!(
            %project_id,
            nodes = requests.len(),
            unreachable = by_node.order.len() - requests.len(),
            "deleting object pieces"
        );
        self.deletion
            .delete_pieces(requests, self.config.piece_deletion.success_threshold)
            .await?;

        if by_node.freed_bytes != 0 {
            self.track_storage_usage(project_id, -by_node.freed_bytes)
                .await;
        }
        Ok(())
    }

    /// Segment count disclosed in the LAST pointer's stream metadata.
    async fn number_of_segments(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<i64> {
        let (pointer, _) = self
            .get_pointer(project_id, LAST_SEGMENT, bucket, encrypted_path)
            .await?;
        let meta = StreamMeta::from_bytes(&pointer.metadata)
            .map_err(|e| MetainfoError::internal(format!("unable to decode stream metadata: {}", e.message())))?;
        Ok(meta.number_of_segments)
    }

    /// Highest numbered segment reachable from 0, or `-1` when there is none.
    async fn find_previous_last_segment(
        &self,
        project_id: ProjectId,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<i64> {
        let mut index = LAST_SEGMENT;
        loop {
            match self
                .get_pointer(project_id, index + 1, bucket, encrypted_path)
                .await
            {
                Ok(_) => index += 1,
                Err(e) if e.is_not_found() => return Ok(index),
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete_pointer(
        &self,
        project_id: ProjectId,
        index: i64,
        bucket: &[u8],
        encrypted_path: &[u8],
    ) -> Result<Pointer> {
        let (pointer, path) = self
            .get_pointer(project_id, index, bucket, encrypted_path)
            .await?;
        self.pointers.unsynchronized_delete(&path).await?;
        Ok(pointer)
    }
}
