//! Segment path codec.
//!
//! A segment is addressed as `<project>/<segment>/<bucket>/<object key>`
//! where `<segment>` is `l` for the LAST segment and `s<N>` otherwise.
//! Empty bucket and key components are dropped, so the encoding of a
//! bucket (or project) is a byte prefix of every path beneath it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MetainfoError, ProjectId, Result};

/// Raw index clients use for the LAST segment.
pub const LAST_SEGMENT: i64 = -1;

/// Position of a segment within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentIndex {
    /// Final segment, carrying object-level metadata
    Last,
    /// Zero-based numbered segment
    Numbered(u64),
}

impl SegmentIndex {
    /// Interpret a raw client index, `-1` meaning LAST.
    pub fn from_raw(index: i64) -> Result<Self> {
        match index {
            LAST_SEGMENT => Ok(Self::Last),
            i if i < LAST_SEGMENT => Err(MetainfoError::invalid_argument(
                "invalid segment index",
            )),
            i => Ok(Self::Numbered(i as u64)),
        }
    }

    /// Raw client index.
    pub fn to_raw(self) -> i64 {
        match self {
            Self::Last => LAST_SEGMENT,
            Self::Numbered(i) => i as i64,
        }
    }

    /// True for the LAST segment.
    pub fn is_last(self) -> bool {
        matches!(self, Self::Last)
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last => f.write_str("l"),
            Self::Numbered(i) => write!(f, "s{i}"),
        }
    }
}

/// Fully qualified address of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentPath {
    /// Owning project
    pub project_id: ProjectId,
    /// Segment position
    pub index: SegmentIndex,
    /// Bucket name, may be empty for project-level prefixes
    pub bucket: Vec<u8>,
    /// Encrypted object key, may be empty for bucket-level prefixes
    pub object_key: Vec<u8>,
}

impl SegmentPath {
    /// Build a path from a raw index.
    pub fn new(
        project_id: ProjectId,
        index: i64,
        bucket: impl Into<Vec<u8>>,
        object_key: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        Ok(Self {
            project_id,
            index: SegmentIndex::from_raw(index)?,
            bucket: bucket.into(),
            object_key: object_key.into(),
        })
    }

    /// Same object, different segment.
    pub fn with_index(&self, index: SegmentIndex) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    /// Encoded key.
    pub fn encode(&self) -> Vec<u8> {
        let project = self.project_id.to_string();
        let segment = self.index.to_string();

        let mut encoded = Vec::with_capacity(
            project.len() + segment.len() + self.bucket.len() + self.object_key.len() + 3,
        );
        encoded.extend_from_slice(project.as_bytes());
        encoded.push(b'/');
        encoded.extend_from_slice(segment.as_bytes());
        if !self.bucket.is_empty() {
            encoded.push(b'/');
            encoded.extend_from_slice(&self.bucket);
        }
        if !self.object_key.is_empty() {
            encoded.push(b'/');
            encoded.extend_from_slice(&self.object_key);
        }
        encoded
    }
}

/// Encode `(project, index, bucket, key)` into a store key.
///
/// `index` below `-1` is rejected.
pub fn create_path(
    project_id: ProjectId,
    index: i64,
    bucket: &[u8],
    object_key: &[u8],
) -> Result<Vec<u8>> {
    Ok(SegmentPath::new(project_id, index, bucket, object_key)?.encode())
}

/// Key identifying a bucket in usage and order accounting, `<project>/<bucket>`.
pub fn bucket_id(project_id: ProjectId, bucket: &[u8]) -> Vec<u8> {
    let mut id = project_id.to_string().into_bytes();
    id.push(b'/');
    id.extend_from_slice(bucket);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn project() -> ProjectId {
        ProjectId::from_uuid(Uuid::from_bytes([0x11; 16]))
    }

    #[test]
    fn test_encoding() {
        let p = project();
        assert_eq!(
            create_path(p, -1, b"photos", b"cat.jpg").unwrap(),
            format!("{p}/l/photos/cat.jpg").into_bytes()
        );
        assert_eq!(
            create_path(p, 12, b"photos", b"cat.jpg").unwrap(),
            format!("{p}/s12/photos/cat.jpg").into_bytes()
        );
        assert_eq!(
            create_path(p, 0, b"photos", b"").unwrap(),
            format!("{p}/s0/photos").into_bytes()
        );
        assert_eq!(
            create_path(p, -1, b"", b"").unwrap(),
            format!("{p}/l").into_bytes()
        );
    }

    #[test]
    fn test_invalid_index_rejected() {
        let err = create_path(project(), -2, b"b", b"k").unwrap_err();
        assert!(matches!(err, MetainfoError::InvalidArgument { .. }));
        assert_eq!(err.message(), "invalid segment index");
    }

    #[test]
    fn test_segment_index_raw() {
        assert_eq!(SegmentIndex::from_raw(-1).unwrap(), SegmentIndex::Last);
        assert_eq!(SegmentIndex::from_raw(3).unwrap(), SegmentIndex::Numbered(3));
        assert_eq!(SegmentIndex::Numbered(3).to_raw(), 3);
        assert_eq!(SegmentIndex::Last.to_raw(), LAST_SEGMENT);
    }

    #[test]
    fn test_bucket_id() {
        let p = project();
        assert_eq!(bucket_id(p, b"photos"), format!("{p}/photos").into_bytes());
    }

    fn bucket_name() -> impl Strategy<Value = Vec<u8>> {
        "[a-z0-9][a-z0-9-]{1,20}[a-z0-9]".prop_map(String::into_bytes)
    }

    fn object_key() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..24)
    }

    fn segment_index() -> impl Strategy<Value = i64> {
        prop_oneof![Just(-1i64), 0i64..10_000]
    }

    proptest! {
        /// Distinct tuples encode to distinct keys
        #[test]
        fn encoding_is_injective(
            a in (segment_index(), bucket_name(), object_key()),
            b in (segment_index(), bucket_name(), object_key()),
        ) {
            let p = project();
            let ea = create_path(p, a.0, &a.1, &a.2).unwrap();
            let eb = create_path(p, b.0, &b.1, &b.2).unwrap();
            prop_assert_eq!(a == b, ea == eb);
        }

        /// Bucket and project encodings prefix every key beneath them
        #[test]
        fn parents_are_prefixes(
            index in segment_index(),
            bucket in bucket_name(),
            key in object_key(),
        ) {
            let p = project();
            let child = create_path(p, index, &bucket, &key).unwrap();
            let bucket_prefix = create_path(p, index, &bucket, b"").unwrap();
            let project_prefix = create_path(p, index, b"", b"").unwrap();
            prop_assert!(child.starts_with(&bucket_prefix));
            prop_assert!(child.starts_with(&project_prefix));
        }
    }
}
