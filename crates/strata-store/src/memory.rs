//! In-memory key-value handler for tests and single-process deployments

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::kv::{IterateOptions, KeyValueStore, ListItem, DELIMITER};

/// In-memory ordered key-value handler
#[derive(Debug, Clone)]
pub struct MemoryKeyValueStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Snapshot of every stored key, in order
    pub async fn keys(&self) -> Vec<Vec<u8>> {
        self.data.read().await.keys().cloned().collect()
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut data = self.data.write().await;
        data.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &[u8],
        old: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut data = self.data.write().await;
        match (data.get(key), old) {
            (None, None) => {}
            (None, Some(_)) => return Err(StoreError::key_not_found(key)),
            (Some(_), None) => return Err(StoreError::value_changed(key)),
            (Some(current), Some(expected)) if current.as_slice() != expected => {
                return Err(StoreError::value_changed(key));
            }
            (Some(_), Some(_)) => {}
        }

        match new {
            Some(value) => {
                data.insert(key.to_vec(), value);
            }
            None => {
                data.remove(key);
            }
        }
        Ok(())
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<ListItem>, StoreError> {
        let IterateOptions {
            prefix,
            first,
            recurse,
            limit,
        } = options;
        let start = if first.as_slice() > prefix.as_slice() {
            first.clone()
        } else {
            prefix.clone()
        };

        let data = self.data.read().await;
        let mut items: Vec<ListItem> = Vec::new();
        let mut last_prefix: Option<Vec<u8>> = None;

        for (key, value) in data.range::<Vec<u8>, _>((Bound::Included(start), Bound::Unbounded)) {
            if !key.starts_with(&prefix) {
                break;
            }
            if limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }

            if !recurse {
                let rest = &key[prefix.len()..];
                if let Some(pos) = rest.iter().position(|b| *b == DELIMITER) {
                    let collapsed = key[..prefix.len() + pos + 1].to_vec();
                    if last_prefix.as_ref() == Some(&collapsed) || collapsed < first {
                        continue;
                    }
                    last_prefix = Some(collapsed.clone());
                    items.push(ListItem {
                        key: collapsed,
                        value: Vec::new(),
                        is_prefix: true,
                    });
                    continue;
                }
            }

            items.push(ListItem {
                key: key.clone(),
                value: value.clone(),
                is_prefix: false,
            });
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryKeyValueStore::new();
        store.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        assert!(store.delete(b"a").await.unwrap());
        assert!(!store.delete(b"a").await.unwrap());
        assert_eq!(store.get(b"a").await.unwrap(), None);
        assert_matches!(store.get(b"").await, Err(StoreError::EmptyKey));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryKeyValueStore::new();

        // create only when absent
        store
            .compare_and_swap(b"k", None, Some(b"1".to_vec()))
            .await
            .unwrap();
        assert_matches!(
            store.compare_and_swap(b"k", None, Some(b"2".to_vec())).await,
            Err(StoreError::ValueChanged { .. })
        );

        // replace with matching old value
        store
            .compare_and_swap(b"k", Some(b"1"), Some(b"2".to_vec()))
            .await
            .unwrap();
        assert_matches!(
            store.compare_and_swap(b"k", Some(b"1"), None).await,
            Err(StoreError::ValueChanged { .. })
        );

        // delete
        store.compare_and_swap(b"k", Some(b"2"), None).await.unwrap();
        assert!(store.is_empty().await);
        assert_matches!(
            store.compare_and_swap(b"k", Some(b"2"), None).await,
            Err(StoreError::KeyNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_iterate_respects_first_and_limit() {
        let store = MemoryKeyValueStore::new();
        for key in ["x/1", "x/2", "x/3", "y/1"] {
            store.put(key.as_bytes().to_vec(), Vec::new()).await.unwrap();
        }
        let items = store
            .iterate(IterateOptions {
                prefix: b"x/".to_vec(),
                first: b"x/2".to_vec(),
                recurse: true,
                limit: Some(5),
            })
            .await
            .unwrap();
        let keys: Vec<_> = items.into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec![b"x/2".to_vec(), b"x/3".to_vec()]);
    }
}
