//! # Strata Core - Foundation
//!
//! **Purpose**: Domain types and pure logic shared by every Strata metainfo crate.
//!
//! # Architecture Constraints
//!
//! - YES Pointer, redundancy and order limit data model
//! - YES Segment path encoding
//! - YES Unified error enum with status-code mapping
//! - YES Configuration types and loading
//! - NO signing or verification (that's strata-signature)
//! - NO persistence (that's strata-store)
//! - NO protocol orchestration (that's strata-metainfo)
//!
//! ## Core Concepts
//!
//! - **Pointer**: durable metadata record for one segment, inline or remote
//! - **Segment Path**: sortable key addressing a segment of an object
//! - **Redundancy Scheme**: erasure thresholds `k ≤ m ≤ o ≤ n`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Unified error type and status codes
pub mod errors;

/// Strongly typed identifiers
pub mod identifiers;

/// Erasure scheme parameters and piece-size arithmetic
pub mod redundancy;

/// Order limits and piece hashes exchanged with storage nodes
pub mod orders;

/// Segment pointer records and stream metadata
pub mod pointer;

/// Segment path codec
pub mod path;

/// Wall-clock abstraction
pub mod time;

/// Service configuration
pub mod config;

pub use config::{
    ByteSize, CreateRequestsConfig, MetainfoConfig, PieceDeletionConfig, StrataConfig,
};
pub use errors::{MetainfoError, Result, StatusCode};
pub use identifiers::{NodeId, PartnerId, PieceId, ProjectId, SerialNumber};
pub use orders::{AddressedOrderLimit, NodeAddress, OrderLimit, PieceAction, PieceHash};
pub use path::{bucket_id, create_path, SegmentIndex, SegmentPath, LAST_SEGMENT};
pub use pointer::{
    Pointer, PointerKind, RemotePiece, RemoteSegment, SegmentMeta, SpaceUsed, StreamMeta,
};
pub use redundancy::{calc_piece_size, RedundancyAlgorithm, RedundancyScheme, RsConfig};
pub use time::{PhysicalClock, SystemClock};
