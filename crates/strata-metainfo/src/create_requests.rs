//! Outstanding legacy segment creations.
//!
//! The legacy protocol hands out order limits in `create_segment` and only
//! learns the pointer in `commit_segment`. The expiration and redundancy the
//! client asked for are remembered here, keyed by the serial number of the
//! first order limit, so the commit can be checked against them.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use strata_core::{CreateRequestsConfig, RedundancyScheme, SerialNumber};

/// Parameters recorded at segment creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Requested segment expiration
    pub expiration: Option<DateTime<Utc>>,
    /// Requested redundancy scheme
    pub redundancy: RedundancyScheme,
    /// When the creation was recorded
    pub created_at: DateTime<Utc>,
}

/// Bounded, time-limited map of outstanding creations.
#[derive(Debug)]
pub struct CreateRequests {
    entries: Mutex<HashMap<SerialNumber, CreateRequest>>,
    capacity: usize,
    ttl: Duration,
}

impl CreateRequests {
    /// Empty map holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Map sized from configuration.
    pub fn from_config(config: &CreateRequestsConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    /// Remember a creation. When full, expired entries go first, then the oldest.
    pub fn put(
        &self,
        serial: SerialNumber,
        expiration: Option<DateTime<Utc>>,
        redundancy: RedundancyScheme,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&serial) {
            let ttl = self.ttl;
            entries.retain(|_, request| request.created_at + ttl > now);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, request)| request.created_at)
                    .map(|(serial, _)| *serial);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            serial,
            CreateRequest {
                expiration,
                redundancy,
                created_at: now,
            },
        );
    }

    /// Outstanding creation for `serial`, dropping it if it has expired.
    pub fn load(&self, serial: &SerialNumber, now: DateTime<Utc>) -> Option<CreateRequest> {
        let mut entries = self.entries.lock();
        let request = entries.get(serial)?;
        if request.created_at + self.ttl <= now {
            entries.remove(serial);
            return None;
        }
        Some(request.clone())
    }

    /// Forget `serial`.
    pub fn remove(&self, serial: &SerialNumber) {
        self.entries.lock().remove(serial);
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
