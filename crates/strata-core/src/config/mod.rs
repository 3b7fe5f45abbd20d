//! Configuration for the metainfo service
//!
//! Values load from TOML, may be overridden by `STRATA_METAINFO_*`
//! environment variables, and are validated before the endpoint starts.

mod metainfo;
mod size;
mod traits;

pub use metainfo::{CreateRequestsConfig, MetainfoConfig, PieceDeletionConfig};
pub use size::ByteSize;
pub use traits::StrataConfig;
