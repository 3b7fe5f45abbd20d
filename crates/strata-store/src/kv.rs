//! Ordered key-value engine abstraction.
//!
//! Keys are byte strings ordered lexicographically. `/` is the only byte
//! with meaning: non-recursive iteration collapses everything below the next
//! `/` after the prefix into a single prefix item.

use async_trait::async_trait;

use crate::error::StoreError;

/// Default and maximum page size for [`list_v2`].
pub const LIST_LIMIT: usize = 1000;

/// Delimiter between path components.
pub const DELIMITER: u8 = b'/';

/// One entry produced by iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Full key, or for prefix items the collapsed key ending in `/`
    pub key: Vec<u8>,
    /// Stored value, empty for prefix items
    pub value: Vec<u8>,
    /// Whether this item stands for a collapsed sub-tree
    pub is_prefix: bool,
}

/// Iteration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterateOptions {
    /// Only keys starting with this prefix are produced
    pub prefix: Vec<u8>,
    /// First key to produce, inclusive
    pub first: Vec<u8>,
    /// Descend into sub-trees instead of collapsing them
    pub recurse: bool,
    /// Stop after this many items
    pub limit: Option<usize>,
}

/// Ordered byte store with atomic single-key operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value unconditionally.
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove a key, returning whether it existed.
    async fn delete(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Atomically replace `old` with `new`.
    ///
    /// `old == None` requires the key to be absent; `new == None` deletes it.
    /// Fails with [`StoreError::ValueChanged`] when the current value differs
    /// from `old`, or [`StoreError::KeyNotFound`] when `old` is set and the
    /// key is missing.
    async fn compare_and_swap(
        &self,
        key: &[u8],
        old: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> Result<(), StoreError>;

    /// Produce items in key order according to `options`.
    async fn iterate(&self, options: IterateOptions) -> Result<Vec<ListItem>, StoreError>;
}

/// Paged listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Listing root; must be empty or end with `/`
    pub prefix: Vec<u8>,
    /// Cursor relative to `prefix`; items up to and including it are skipped
    pub start_after: Vec<u8>,
    /// Descend into sub-trees instead of collapsing them
    pub recursive: bool,
    /// Page size, `0` or anything above [`LIST_LIMIT`] means [`LIST_LIMIT`]
    pub limit: usize,
}

/// List one page below a prefix.
///
/// Returned keys are relative to the prefix. The flag is true when more items
/// follow the page.
pub async fn list_v2(
    store: &dyn KeyValueStore,
    options: ListOptions,
) -> Result<(Vec<ListItem>, bool), StoreError> {
    let ListOptions {
        prefix,
        start_after,
        recursive,
        limit,
    } = options;

    if !prefix.is_empty() && prefix.last() != Some(&DELIMITER) {
        return Err(StoreError::InvalidOptions {
            message: "prefix should end with slash".to_string(),
        });
    }

    let limit = if limit == 0 || limit > LIST_LIMIT {
        LIST_LIMIT
    } else {
        limit
    };

    let mut first = prefix.clone();
    first.extend_from_slice(&start_after);
    let skip_first = !start_after.is_empty();

    let raw = store
        .iterate(IterateOptions {
            prefix: prefix.clone(),
            first: first.clone(),
            recurse: recursive,
            limit: Some(limit + 2),
        })
        .await?;

    let mut items = Vec::with_capacity(limit.min(raw.len()));
    let mut more = false;
    for mut item in raw {
        if skip_first && item.key == first {
            continue;
        }
        if items.len() >= limit {
            more = true;
            break;
        }
        item.key.drain(..prefix.len());
        items.push(item);
    }

    Ok((items, more))
}
