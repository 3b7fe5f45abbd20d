//! # Strata Signature
//!
//! **Purpose**: Everything the metainfo service signs or verifies.
//!
//! - **Capability tokens**: stream and segment tokens carrying the state of
//!   a multi-call upload or delete, signed by the satellite and verified
//!   for freshness on every use.
//! - **Order limits**: satellite signatures over per-piece authorizations.
//! - **Piece hashes**: storage-node receipts for uploaded pieces.
//!
//! All signatures are Ed25519 over canonical bincode bytes prefixed with a
//! domain tag, so a signature for one record type never verifies as another.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Node identities and key material
pub mod identity;

/// Order limit and piece hash signatures
pub mod signing;

/// Stream and segment capability tokens
pub mod token;

pub use identity::{FullIdentity, PeerIdentity};
pub use signing::{
    sign_order_limit, sign_piece_hash, verify_order_limit, verify_piece_hash, SignatureError,
};
pub use token::{
    SegmentId, SegmentToken, StreamId, StreamToken, TokenAuthority, TokenError,
};
