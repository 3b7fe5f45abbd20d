//! Bucket records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use strata_core::{MetainfoError, PartnerId, ProjectId, RedundancyScheme, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Page size cap for bucket listings.
pub const BUCKET_LIST_LIMIT: usize = 10_000;

/// Encryption algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CipherSuite {
    /// Not specified by the client
    #[default]
    Unspecified,
    /// No encryption
    Null,
    /// AES-256-GCM
    AesGcm,
    /// NaCl secretbox
    SecretBox,
}

impl CipherSuite {
    /// Decode the numeric id stored in stream metadata; unknown ids are unspecified.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Null,
            2 => Self::AesGcm,
            3 => Self::SecretBox,
            _ => Self::Unspecified,
        }
    }

    /// Numeric id stored in stream metadata.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Null => 1,
            Self::AesGcm => 2,
            Self::SecretBox => 3,
        }
    }
}

/// Default encryption for objects in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptionParameters {
    /// Cipher
    pub cipher_suite: CipherSuite,
    /// Encryption block size in bytes
    pub block_size: i32,
}

/// A bucket and its defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Unique id
    pub id: Uuid,
    /// Name, unique within the project
    pub name: String,
    /// Owning project
    pub project_id: ProjectId,
    /// Value-attribution partner, set at most once
    pub partner_id: Option<PartnerId>,
    /// Cipher used for object keys
    pub path_cipher: CipherSuite,
    /// Default segment size requested by the client
    pub default_segment_size: i64,
    /// Default erasure scheme requested by the client
    pub default_redundancy: RedundancyScheme,
    /// Default object encryption
    pub default_encryption: EncryptionParameters,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Where a listing starts relative to its cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListDirection {
    /// Names at or after the cursor
    #[default]
    Forward,
    /// Names strictly after the cursor
    After,
}

/// Bucket listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketListOptions {
    /// Name to start from
    pub cursor: String,
    /// Cursor semantics
    pub direction: ListDirection,
    /// Page size, `0` or anything above [`BUCKET_LIST_LIMIT`] means the cap
    pub limit: usize,
}

/// Buckets a caller's credentials allow it to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedBuckets {
    /// Every bucket is allowed
    pub all: bool,
    /// Explicitly allowed names
    pub names: BTreeSet<String>,
}

impl AllowedBuckets {
    /// Unrestricted access
    pub fn all() -> Self {
        Self {
            all: true,
            names: BTreeSet::new(),
        }
    }

    /// Access to the named buckets only
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all: false,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` may be listed
    pub fn contains(&self, name: &str) -> bool {
        self.all || self.names.contains(name)
    }
}

/// One page of buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketList {
    /// Buckets in name order
    pub items: Vec<Bucket>,
    /// Whether more buckets follow
    pub more: bool,
}

/// Bucket persistence.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Insert a new bucket; fails with AlreadyExists on a name clash.
    async fn create_bucket(&self, bucket: Bucket) -> Result<Bucket>;

    /// Read a bucket; fails with NotFound.
    async fn get_bucket(&self, project_id: ProjectId, name: &str) -> Result<Bucket>;

    /// Replace an existing bucket record.
    async fn update_bucket(&self, bucket: Bucket) -> Result<Bucket>;

    /// Remove a bucket; fails with NotFound.
    async fn delete_bucket(&self, project_id: ProjectId, name: &str) -> Result<()>;

    /// List a project's buckets visible through `allowed`.
    async fn list_buckets(
        &self,
        project_id: ProjectId,
        options: BucketListOptions,
        allowed: &AllowedBuckets,
    ) -> Result<BucketList>;
}

type BucketKey = (ProjectId, String);

/// In-memory bucket store
#[derive(Debug, Clone, Default)]
pub struct MemoryBucketStore {
    buckets: Arc<RwLock<BTreeMap<BucketKey, Bucket>>>,
}

impl MemoryBucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn bucket_not_found(name: &str) -> MetainfoError {
    MetainfoError::not_found(format!("bucket not found: {name}"))
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn create_bucket(&self, bucket: Bucket) -> Result<Bucket> {
        let mut buckets = self.buckets.write().await;
        let key = (bucket.project_id, bucket.name.clone());
        if buckets.contains_key(&key) {
            return Err(MetainfoError::already_exists(format!(
                "bucket already exists: {}",
                bucket.name
            )));
        }
        buckets.insert(key, bucket.clone());
        tracing::debug!(project_id = %bucket.project_id, bucket = %bucket.name, "bucket created");
        Ok(bucket)
    }

    async fn get_bucket(&self, project_id: ProjectId, name: &str) -> Result<Bucket> {
        let buckets = self.buckets.read().await;
        buckets
            .get(&(project_id, name.to_string()))
            .cloned()
            .ok_or_else(|| bucket_not_found(name))
    }

    async fn update_bucket(&self, bucket: Bucket) -> Result<Bucket> {
        let mut buckets = self.buckets.write().await;
        let slot = buckets
            .get_mut(&(bucket.project_id, bucket.name.clone()))
            .ok_or_else(|| bucket_not_found(&bucket.name))?;
        *slot = bucket.clone();
        Ok(bucket)
    }

    async fn delete_bucket(&self, project_id: ProjectId, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        buckets
            .remove(&(project_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| bucket_not_found(name))
    }

    async fn list_buckets(
        &self,
        project_id: ProjectId,
        options: BucketListOptions,
        allowed: &AllowedBuckets,
    ) -> Result<BucketList> {
        let limit = if options.limit == 0 || options.limit > BUCKET_LIST_LIMIT {
            BUCKET_LIST_LIMIT
        } else {
            options.limit
        };
        let start = (project_id, options.cursor.clone());
        let lower = match options.direction {
            ListDirection::Forward => Bound::Included(start),
            ListDirection::After => Bound::Excluded(start),
        };

        let buckets = self.buckets.read().await;
        let mut list = BucketList::default();
        for ((owner, name), bucket) in buckets.range((lower, Bound::Unbounded)) {
            if *owner != project_id {
                break;
            }
            if !allowed.contains(name) {
                continue;
            }
            if list.items.len() >= limit {
                list.more = true;
                break;
            }
            list.items.push(bucket.clone());
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StatusCode;

    fn bucket(project_id: ProjectId, name: &str) -> Bucket {
        Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            project_id,
            partner_id: None,
            path_cipher: CipherSuite::AesGcm,
            default_segment_size: 64 << 20,
            default_redundancy: RedundancyScheme::reed_solomon(4, 6, 8, 10, 256),
            default_encryption: EncryptionParameters::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = MemoryBucketStore::new();
        let project = ProjectId::new();

        store.create_bucket(bucket(project, "photos")).await.unwrap();
        let err = store
            .create_bucket(bucket(project, "photos"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);

        // same name in another project is fine
        store
            .create_bucket(bucket(ProjectId::new(), "photos"))
            .await
            .unwrap();

        let mut stored = store.get_bucket(project, "photos").await.unwrap();
        stored.partner_id = Some(PartnerId::from_uuid(Uuid::new_v4()));
        store.update_bucket(stored.clone()).await.unwrap();
        assert_eq!(store.get_bucket(project, "photos").await.unwrap(), stored);

        store.delete_bucket(project, "photos").await.unwrap();
        assert!(store
            .get_bucket(project, "photos")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .delete_bucket(project, "photos")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_cipher_suite_ids() {
        for suite in [
            CipherSuite::Unspecified,
            CipherSuite::Null,
            CipherSuite::AesGcm,
            CipherSuite::SecretBox,
        ] {
            assert_eq!(CipherSuite::from_i32(suite.as_i32()), suite);
        }
        assert_eq!(CipherSuite::from_i32(42), CipherSuite::Unspecified);
    }

    #[tokio::test]
    async fn test_list_buckets_cursor_and_allowed() {
        let store = MemoryBucketStore::new();
        let project = ProjectId::new();
        for name in ["alpha", "bravo", "charlie", "delta"] {
            store.create_bucket(bucket(project, name)).await.unwrap();
        }
        store
            .create_bucket(bucket(ProjectId::new(), "echo"))
            .await
            .unwrap();

        let names = |list: &BucketList| -> Vec<String> {
            list.items.iter().map(|b| b.name.clone()).collect()
        };

        let page = store
            .list_buckets(
                project,
                BucketListOptions {
                    cursor: "bravo".into(),
                    direction: ListDirection::Forward,
                    limit: 2,
                },
                &AllowedBuckets::all(),
            )
            .await
            .unwrap();
        assert_eq!(names(&page), ["bravo", "charlie"]);
        assert!(page.more);

        let page = store
            .list_buckets(
                project,
                BucketListOptions {
                    cursor: "bravo".into(),
                    direction: ListDirection::After,
                    limit: 0,
                },
                &AllowedBuckets::only(["alpha", "delta"]),
            )
            .await
            .unwrap();
        assert_eq!(names(&page), ["delta"]);
        assert!(!page.more);
    }
}
