//! # Strata Metainfo - Protocol Layer
//!
//! **Purpose**: The satellite's metadata control plane. Clients upload and
//! download object data directly to and from storage nodes; this crate
//! decides where data goes, what clients are allowed to do, and records
//! where every piece ended up.
//!
//! - **Endpoint**: [`Endpoint`] serves the object, segment and bucket
//!   operations. Upload progress travels in signed tokens between calls, so
//!   the endpoint keeps no per-upload session state.
//! - **Validation**: bucket names, redundancy schemes, pointers and the
//!   piece hashes storage nodes sign on upload.
//! - **Deletion**: removes an object's pointers and fans piece deletion out
//!   to storage nodes with bounded concurrency.
//!
//! External services (API keys, node selection, orders, usage accounting)
//! are reached through the traits in [`collaborators`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Services the endpoint depends on
pub mod collaborators;

/// Request and response messages
pub mod messages;

/// Bucket, redundancy, pointer and piece-hash checks
pub mod validation;

/// Piece filtering at segment commit
pub mod pieces;

/// Outstanding legacy segment creations
pub mod create_requests;

/// Protocol endpoint
pub mod endpoint;

/// Object deletion and piece deletion fan-out
pub mod deletion;

pub use collaborators::{
    Action, ActionKind, AttributionInfo, Attributions, Authorizer, Collaborators,
    FindStorageNodesRequest, KeyInfo, OrderLimits, Overlay, Partners, PeerIdentities,
    PieceDeletionClient, PiecePrivateKey, ProjectUsage, RequestHeader, SelectedNode, UsageCheck,
};
pub use create_requests::{CreateRequest, CreateRequests};
pub use deletion::{DeletePiecesService, NodePieces};
pub use endpoint::Endpoint;
pub use pieces::{filter_valid_pieces, select_valid_pieces, InvalidPiece};
pub use validation::{
    validate_bucket, validate_piece_hash, validate_pointer, validate_redundancy, PieceHashError,
    PointerPolicy,
};
