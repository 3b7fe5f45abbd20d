//! Bounded fan-out of piece deletion requests to storage nodes.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{MetainfoError, PieceDeletionConfig, PieceId, Result};
use tokio::sync::{mpsc, Semaphore};

use crate::collaborators::{PieceDeletionClient, SelectedNode};

/// Pieces to delete from one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePieces {
    /// Node holding the pieces
    pub node: SelectedNode,
    /// Derived ids of its pieces
    pub pieces: Vec<PieceId>,
}

/// Sends deletion requests to many nodes at once.
///
/// The semaphore is shared by every call, so `max_concurrency` bounds the
/// requests in flight across the whole endpoint.
#[derive(Clone)]
pub struct DeletePiecesService {
    client: Arc<dyn PieceDeletionClient>,
    limiter: Arc<Semaphore>,
    node_timeout: Duration,
}

impl std::fmt::Debug for DeletePiecesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletePiecesService")
            .field("available_permits", &self.limiter.available_permits())
            .field("node_timeout", &self.node_timeout)
            .finish_non_exhaustive()
    }
}

impl DeletePiecesService {
    /// Service using `client` for each node request.
    pub fn new(client: Arc<dyn PieceDeletionClient>, config: &PieceDeletionConfig) -> Self {
        Self {
            client,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            node_timeout: config.node_timeout(),
        }
    }

    /// Ask every node to delete its pieces.
    ///
    /// Returns once `ceil(nodes · success_threshold)` nodes (at least one)
    /// have acknowledged, or fails as soon as that can no longer happen.
    /// Requests still in flight keep running in the background.
    pub async fn delete_pieces(&self, nodes: Vec<NodePieces>, success_threshold: f64) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        if !(success_threshold > 0.0 && success_threshold <= 1.0) {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid success threshold {success_threshold}, must be in (0, 1]"
            )));
        }

        let total = nodes.len();
        let required = ((total as f64 * success_threshold).ceil() as usize).clamp(1, total);

        let (tx, mut rx) = mpsc::channel(total);
        for NodePieces { node, pieces } in nodes {
            let tx = tx.clone();
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let node_timeout = self.node_timeout;
            tokio::spawn(async move {
                let deleted = match limiter.acquire_owned().await {
                    Ok(_permit) => {
                        match tokio::time::timeout(node_timeout, client.delete_pieces(&node, &pieces))
                            .await
                        {
                            Ok(Ok(())) => true,
                            Ok(Err(e)) => {
                                tracing::warn!(node_id = %node.id, error = %e, "piece deletion failed");
                                false
                            }
                            Err(_) => {
                                tracing::warn!(node_id = %node.id, ?node_timeout, "piece deletion timed out");
                                false
                            }
                        }
                    }
                    Err(_) => false,
                };
                // the receiver is gone once the outcome is decided
                let _ = tx.send(deleted).await;
            });
        }
        drop(tx);

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some(deleted) = rx.recv().await {
            if deleted {
                succeeded += 1;
            } else {
                failed += 1;
            }
            if succeeded >= required {
                tracing::debug!(succeeded, total, required, "piece deletion threshold reached");
                return Ok(());
            }
            if total - failed < required {
                break;
            }
        }

        Err(MetainfoError::internal(format!(
            "deleted pieces on {succeeded} of {total} nodes, {required} required"
        )))
    }
}
