//! Metainfo endpoint configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ByteSize, StrataConfig};
use crate::{MetainfoError, Result, RsConfig};

const HOUR: u64 = 60 * 60;
// Ten years; anything larger is a misconfiguration.
const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * HOUR;

/// Bulk piece deletion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PieceDeletionConfig {
    /// Maximum concurrent per-node delete requests
    pub max_concurrency: usize,
    /// Per-node request timeout in milliseconds
    pub node_timeout_ms: u64,
    /// Fraction of nodes that must acknowledge for the delete to succeed
    pub success_threshold: f64,
}

impl Default for PieceDeletionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            node_timeout_ms: 15_000,
            success_threshold: 0.75,
        }
    }
}

impl PieceDeletionConfig {
    /// Per-node request timeout
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }
}

/// Legacy segment creation tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRequestsConfig {
    /// Maximum outstanding creations before the oldest is evicted
    pub capacity: usize,
    /// Seconds an outstanding creation is remembered
    pub ttl_secs: u64,
}

impl Default for CreateRequestsConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 48 * HOUR,
        }
    }
}

impl CreateRequestsConfig {
    /// Lifetime of an outstanding creation
    pub fn ttl(&self) -> chrono::Duration {
        seconds(self.ttl_secs)
    }
}

/// Everything the metainfo endpoint needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetainfoConfig {
    /// Satellite redundancy scheme, `k/m/o/n-sharesize`
    pub rs: RsConfig,
    /// Require client-supplied schemes to equal `rs`
    pub validate_rs: bool,
    /// Maximum inline segment size
    pub max_inline_segment_size: ByteSize,
    /// Maximum segment size
    pub max_segment_size: ByteSize,
    /// Maximum encrypted metadata size
    pub max_metadata_size: ByteSize,
    /// Seconds allowed between creating order limits and committing
    pub max_commit_interval_secs: u64,
    /// Seconds a stream or segment token stays valid
    pub token_validity_secs: u64,
    /// Seconds a piece hash timestamp stays acceptable
    pub piece_hash_expiration_secs: u64,
    /// Default and maximum page size for listings
    pub list_limit: usize,
    /// Bulk piece deletion settings
    pub piece_deletion: PieceDeletionConfig,
    /// Legacy segment creation tracking
    pub create_requests: CreateRequestsConfig,
}

impl Default for MetainfoConfig {
    fn default() -> Self {
        Self {
            rs: RsConfig::development(),
            validate_rs: false,
            max_inline_segment_size: ByteSize::kib(4),
            max_segment_size: ByteSize::mib(64),
            max_metadata_size: ByteSize::kib(2),
            max_commit_interval_secs: 48 * HOUR,
            token_validity_secs: 24 * HOUR,
            piece_hash_expiration_secs: 24 * HOUR,
            list_limit: 1000,
            piece_deletion: PieceDeletionConfig::default(),
            create_requests: CreateRequestsConfig::default(),
        }
    }
}

impl MetainfoConfig {
    /// Release network defaults
    pub fn release() -> Self {
        Self {
            rs: RsConfig::release(),
            ..Self::default()
        }
    }

    /// Maximum time between order creation and commit
    pub fn max_commit_interval(&self) -> chrono::Duration {
        seconds(self.max_commit_interval_secs)
    }

    /// Capability token validity window
    pub fn token_validity(&self) -> chrono::Duration {
        seconds(self.token_validity_secs)
    }

    /// Maximum piece hash age
    pub fn piece_hash_expiration(&self) -> chrono::Duration {
        seconds(self.piece_hash_expiration_secs)
    }
}

impl StrataConfig for MetainfoConfig {
    const ENV_PREFIX: &'static str = "STRATA_METAINFO_";

    fn merge_with(&mut self, other: &Self) {
        let defaults = Self::default();
        macro_rules! overlay {
            ($($field:ident).+) => {
                if other.$($field).+ != defaults.$($field).+ {
                    self.$($field).+ = other.$($field).+;
                }
            };
        }
        overlay!(rs);
        overlay!(validate_rs);
        overlay!(max_inline_segment_size);
        overlay!(max_segment_size);
        overlay!(max_metadata_size);
        overlay!(max_commit_interval_secs);
        overlay!(token_validity_secs);
        overlay!(piece_hash_expiration_secs);
        overlay!(list_limit);
        overlay!(piece_deletion.max_concurrency);
        overlay!(piece_deletion.node_timeout_ms);
        overlay!(piece_deletion.success_threshold);
        overlay!(create_requests.capacity);
        overlay!(create_requests.ttl_secs);
    }

    fn validate(&self) -> Result<()> {
        self.rs.scheme().validate()?;

        if self.max_segment_size.bytes() == 0 {
            return Err(MetainfoError::invalid_argument(
                "max_segment_size must be positive",
            ));
        }
        if self.max_inline_segment_size > self.max_segment_size {
            return Err(MetainfoError::invalid_argument(
                "max_inline_segment_size cannot exceed max_segment_size",
            ));
        }
        for (name, secs) in [
            ("max_commit_interval_secs", self.max_commit_interval_secs),
            ("token_validity_secs", self.token_validity_secs),
            ("piece_hash_expiration_secs", self.piece_hash_expiration_secs),
            ("create_requests.ttl_secs", self.create_requests.ttl_secs),
        ] {
            if secs == 0 || secs > MAX_INTERVAL_SECS {
                return Err(MetainfoError::invalid_argument(format!(
                    "{name} must be between 1 and {MAX_INTERVAL_SECS}"
                )));
            }
        }
        if self.list_limit == 0 {
            return Err(MetainfoError::invalid_argument(
                "list_limit must be positive",
            ));
        }
        let threshold = self.piece_deletion.success_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(MetainfoError::invalid_argument(format!(
                "piece_deletion.success_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.piece_deletion.max_concurrency == 0 {
            return Err(MetainfoError::invalid_argument(
                "piece_deletion.max_concurrency must be positive",
            ));
        }
        if self.create_requests.capacity == 0 {
            return Err(MetainfoError::invalid_argument(
                "create_requests.capacity must be positive",
            ));
        }
        Ok(())
    }

    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value.trim().parse().map_err(|e| {
                MetainfoError::invalid_argument(format!("invalid value {value:?} for {key}: {e}"))
            })
        }

        match key {
            "rs" => self.rs = value.parse()?,
            "validate_rs" => self.validate_rs = parse(key, value)?,
            "max_inline_segment_size" => self.max_inline_segment_size = value.parse()?,
            "max_segment_size" => self.max_segment_size = value.parse()?,
            "max_metadata_size" => self.max_metadata_size = value.parse()?,
            "max_commit_interval_secs" => self.max_commit_interval_secs = parse(key, value)?,
            "token_validity_secs" => self.token_validity_secs = parse(key, value)?,
            "piece_hash_expiration_secs" => {
                self.piece_hash_expiration_secs = parse(key, value)?;
            }
            "list_limit" => self.list_limit = parse(key, value)?,
            "piece_deletion_max_concurrency" => {
                self.piece_deletion.max_concurrency = parse(key, value)?;
            }
            "piece_deletion_node_timeout_ms" => {
                self.piece_deletion.node_timeout_ms = parse(key, value)?;
            }
            "piece_deletion_success_threshold" => {
                self.piece_deletion.success_threshold = parse(key, value)?;
            }
            "create_requests_capacity" => self.create_requests.capacity = parse(key, value)?,
            "create_requests_ttl_secs" => self.create_requests.ttl_secs = parse(key, value)?,
            other => {
                return Err(MetainfoError::invalid_argument(format!(
                    "unknown metainfo config key {other:?}"
                )))
            }
        }
        Ok(())
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_INTERVAL_SECS) as i64)
}
