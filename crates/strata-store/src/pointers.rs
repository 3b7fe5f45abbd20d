//! Segment pointer service.
//!
//! Pointers live under their encoded segment path. `put` and `delete` are
//! compare-and-swap so they fail instead of clobbering a concurrent writer;
//! the `unsynchronized_*` variants overwrite and are used once the caller
//! has authorised the request and validated the pointer.

use std::sync::Arc;

use strata_core::{MetainfoError, Pointer, Result};

use crate::error::StoreError;
use crate::kv::{list_v2, KeyValueStore, ListOptions, DELIMITER};

/// One entry of a pointer listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedPointer {
    /// Path relative to the listing prefix
    pub path: Vec<u8>,
    /// Decoded pointer, `None` for collapsed prefixes
    pub pointer: Option<Pointer>,
    /// Whether this entry stands for a collapsed sub-tree
    pub is_prefix: bool,
}

/// Pointer CRUD over a key-value engine.
#[derive(Clone)]
pub struct PointerStore {
    db: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PointerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerStore").finish_non_exhaustive()
    }
}

fn display_path(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

fn not_found(path: &[u8]) -> MetainfoError {
    MetainfoError::not_found(format!("segment not found: {}", display_path(path)))
}

impl PointerStore {
    /// Wrap a key-value engine
    pub fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self { db }
    }

    /// Store a pointer only if nothing exists at `path` yet.
    pub async fn put(&self, path: &[u8], pointer: &Pointer) -> Result<()> {
        let bytes = pointer.to_bytes()?;
        match self.db.compare_and_swap(path, None, Some(bytes)).await {
            Err(StoreError::ValueChanged { .. }) => Err(MetainfoError::already_exists(format!(
                "segment already exists: {}",
                display_path(path)
            ))),
            other => other.map_err(MetainfoError::from),
        }
    }

    /// Store a pointer, overwriting whatever is at `path`.
    pub async fn unsynchronized_put(&self, path: &[u8], pointer: &Pointer) -> Result<()> {
        let bytes = pointer.to_bytes()?;
        self.db.put(path.to_vec(), bytes).await?;
        Ok(())
    }

    /// Read the pointer at `path`.
    pub async fn get(&self, path: &[u8]) -> Result<Pointer> {
        self.get_with_bytes(path).await.map(|(_, pointer)| pointer)
    }

    /// Read the pointer at `path` along with its stored bytes, for a later
    /// compare-and-swap.
    pub async fn get_with_bytes(&self, path: &[u8]) -> Result<(Vec<u8>, Pointer)> {
        let bytes = self.db.get(path).await?.ok_or_else(|| not_found(path))?;
        let pointer = Pointer::from_bytes(&bytes)?;
        Ok((bytes, pointer))
    }

    /// Remove the pointer at `path` if it still holds `old_bytes`.
    pub async fn delete(&self, path: &[u8], old_bytes: &[u8]) -> Result<()> {
        match self.db.compare_and_swap(path, Some(old_bytes), None).await {
            Err(StoreError::KeyNotFound { .. }) => Err(not_found(path)),
            Err(StoreError::ValueChanged { .. }) => Err(MetainfoError::internal(format!(
                "segment changed concurrently: {}",
                display_path(path)
            ))),
            other => other.map_err(MetainfoError::from),
        }
    }

    /// Remove the pointer at `path` whatever it holds.
    pub async fn unsynchronized_delete(&self, path: &[u8]) -> Result<()> {
        if self.db.delete(path).await? {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    /// List pointers below `prefix`.
    ///
    /// A missing trailing `/` is added to a non-empty prefix. Returns the page
    /// and whether more entries follow it.
    pub async fn list(
        &self,
        prefix: &[u8],
        start_after: &[u8],
        recursive: bool,
        limit: usize,
    ) -> Result<(Vec<ListedPointer>, bool)> {
        let mut prefix = prefix.to_vec();
        if !prefix.is_empty() && prefix.last() != Some(&DELIMITER) {
            prefix.push(DELIMITER);
        }

        let (items, more) = list_v2(
            self.db.as_ref(),
            ListOptions {
                prefix,
                start_after: start_after.to_vec(),
                recursive,
                limit,
            },
        )
        .await?;

        let mut listed = Vec::with_capacity(items.len());
        for item in items {
            let pointer = if item.is_prefix || item.value.is_empty() {
                None
            } else {
                Some(Pointer::from_bytes(&item.value)?)
            };
            listed.push(ListedPointer {
                path: item.key,
                pointer,
                is_prefix: item.is_prefix,
            });
        }
        Ok((listed, more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyValueStore;
    use chrono::Utc;
    use strata_core::{create_path, ProjectId, StatusCode, LAST_SEGMENT};

    fn store() -> PointerStore {
        PointerStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn pointer(data: &[u8]) -> Pointer {
        Pointer::inline(data.to_vec(), Utc::now(), None, Vec::new())
    }

    #[tokio::test]
    async fn test_put_refuses_existing() {
        let store = store();
        store.put(b"p/s0/b/k", &pointer(b"one")).await.unwrap();
        let err = store.put(b"p/s0/b/k", &pointer(b"two")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);

        store
            .unsynchronized_put(b"p/s0/b/k", &pointer(b"two"))
            .await
            .unwrap();
        assert_eq!(store.get(b"p/s0/b/k").await.unwrap().inline_segment, b"two");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let err = store().get(b"p/l/b/k").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_checks_old_bytes() {
        let store = store();
        store.put(b"p/l/b/k", &pointer(b"one")).await.unwrap();
        let (bytes, _) = store.get_with_bytes(b"p/l/b/k").await.unwrap();

        store
            .unsynchronized_put(b"p/l/b/k", &pointer(b"two"))
            .await
            .unwrap();
        let err = store.delete(b"p/l/b/k", &bytes).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Internal);

        let (bytes, _) = store.get_with_bytes(b"p/l/b/k").await.unwrap();
        store.delete(b"p/l/b/k", &bytes).await.unwrap();
        assert!(store.delete(b"p/l/b/k", &bytes).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unsynchronized_delete_missing() {
        let store = store();
        assert!(store
            .unsynchronized_delete(b"p/l/b/k")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_list_objects_under_bucket() {
        let store = store();
        let project = ProjectId::new();
        for key in ["a", "dir/b", "dir/c", "z"] {
            let path = create_path(project, LAST_SEGMENT, b"photos", key.as_bytes()).unwrap();
            store.put(&path, &pointer(key.as_bytes())).await.unwrap();
        }
        // segment of another bucket must not show up
        let other = create_path(project, LAST_SEGMENT, b"videos", b"a").unwrap();
        store.put(&other, &pointer(b"x")).await.unwrap();

        let prefix = create_path(project, LAST_SEGMENT, b"photos", b"").unwrap();
        let (items, more) = store.list(&prefix, b"", false, 0).await.unwrap();
        let paths: Vec<_> = items.iter().map(|i| i.path.clone()).collect();
        assert_eq!(
            paths,
            vec![b"a".to_vec(), b"dir/".to_vec(), b"z".to_vec()]
        );
        assert!(items[1].is_prefix && items[1].pointer.is_none());
        assert_eq!(items[0].pointer.as_ref().unwrap().inline_segment, b"a");
        assert!(!more);

        let (items, _) = store.list(&prefix, b"", true, 0).await.unwrap();
        assert_eq!(items.len(), 4);
    }
}
