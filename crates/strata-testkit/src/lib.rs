//! Strata Testing Infrastructure
//!
//! In-memory stand-ins for every service the metainfo endpoint talks to,
//! a controllable clock, and [`TestNetwork`], which wires them to a real
//! [`strata_metainfo::Endpoint`] over in-memory stores.
//!
//! # Usage
//!
//! ```rust,no_run
//! use strata_testkit::{SegmentSpec, TestNetwork};
//!
//! # async fn run() {
//! let network = TestNetwork::new(10);
//! network.create_bucket("photos").await;
//! network
//!     .upload_object(b"photos", b"cat.jpg", &[SegmentSpec::Remote(1000)])
//!     .await;
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod fixture;
pub mod logging;
pub mod mocks;

pub use clock::ControllableClock;
pub use fixture::{SegmentSpec, TestNetwork, TestNode, KEY_NONCE_LEN, TEST_API_KEY};
pub use logging::init_test_logging;
pub use mocks::*;
