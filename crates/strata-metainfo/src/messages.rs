//! Request and response messages of the metainfo protocol.
//!
//! Plain data carried between a transport layer and [`crate::Endpoint`].
//! Fields mirror what clients send; nothing here is validated.

use chrono::{DateTime, Utc};
use strata_core::{
    AddressedOrderLimit, NodeId, OrderLimit, PieceHash, PieceId, Pointer, RedundancyScheme,
};
use strata_signature::{SegmentId, StreamId};
use strata_store::{CipherSuite, EncryptionParameters, ListDirection, ListedPointer};

use crate::collaborators::{PiecePrivateKey, RequestHeader};

// Buckets

/// Fetch one bucket.
#[derive(Debug, Clone, Default)]
pub struct GetBucketRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub name: Vec<u8>,
}

/// Create a bucket.
#[derive(Debug, Clone)]
pub struct CreateBucketRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub name: Vec<u8>,
    /// Cipher for object keys
    pub path_cipher: CipherSuite,
    /// Client's default segment size
    pub default_segment_size: i64,
    /// Client's default erasure scheme
    pub default_redundancy: RedundancyScheme,
    /// Client's default object encryption
    pub default_encryption: EncryptionParameters,
}

/// Remove a bucket.
#[derive(Debug, Clone, Default)]
pub struct DeleteBucketRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub name: Vec<u8>,
}

/// List a project's buckets.
#[derive(Debug, Clone, Default)]
pub struct ListBucketsRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Name to start from
    pub cursor: Vec<u8>,
    /// Page size, `0` for the default
    pub limit: usize,
    /// Cursor semantics
    pub direction: ListDirection,
}

/// One listed bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketListItem {
    /// Bucket name
    pub name: Vec<u8>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A page of buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketsResponse {
    /// Buckets in name order
    pub items: Vec<BucketListItem>,
    /// Whether more buckets follow
    pub more: bool,
}

/// Attribute a bucket to a partner.
#[derive(Debug, Clone, Default)]
pub struct SetBucketAttributionRequest {
    /// Credentials; the user agent is used when no partner id is given
    pub header: RequestHeader,
    /// Bucket name
    pub name: Vec<u8>,
    /// Raw partner UUID, may be empty
    pub partner_id: Vec<u8>,
}

/// Project-wide information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Salt clients derive per-project keys from
    pub project_salt: Vec<u8>,
}

// Objects

/// Start uploading an object.
#[derive(Debug, Clone, Default)]
pub struct BeginObjectRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Object version
    pub version: i32,
    /// Object expiration, `None` for never
    pub expires_at: Option<DateTime<Utc>>,
}

/// Upload parameters for a new object.
#[derive(Debug, Clone)]
pub struct BeginObjectResponse {
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Object version
    pub version: i32,
    /// Token for the following segment calls
    pub stream_id: StreamId,
    /// Scheme every remote segment must use
    pub redundancy: RedundancyScheme,
}

/// Finish an object upload.
#[derive(Debug, Clone)]
pub struct CommitObjectRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_object`
    pub stream_id: StreamId,
    /// Encoded stream metadata
    pub encrypted_metadata: Vec<u8>,
}

/// Fetch an object's metadata.
#[derive(Debug, Clone, Default)]
pub struct GetObjectRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Object version
    pub version: i32,
}

/// Object metadata.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Always `-1`, versions are not tracked
    pub version: i32,
    /// Token for segment listing and download
    pub stream_id: StreamId,
    /// Commit time of the LAST segment
    pub created_at: DateTime<Utc>,
    /// Object expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// Encoded stream metadata
    pub encrypted_metadata: Vec<u8>,
    /// Object encryption from the stream metadata
    pub encryption: EncryptionParameters,
    /// Erasure scheme, `None` for objects with only inline segments
    pub redundancy: Option<RedundancyScheme>,
}

/// List objects in a bucket.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted key prefix
    pub encrypted_prefix: Vec<u8>,
    /// Last key seen, relative to the prefix
    pub encrypted_cursor: Vec<u8>,
    /// Descend past `/` boundaries
    pub recursive: bool,
    /// Page size, `0` for the default
    pub limit: usize,
}

/// One listed object or collapsed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectListItem {
    /// Key relative to the listing prefix
    pub encrypted_path: Vec<u8>,
    /// Encoded stream metadata
    pub encrypted_metadata: Vec<u8>,
    /// Commit time, `None` for prefixes
    pub created_at: Option<DateTime<Utc>>,
    /// Expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether this is a collapsed prefix
    pub is_prefix: bool,
}

/// A page of objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsResponse {
    /// Objects in key order
    pub items: Vec<ObjectListItem>,
    /// Whether more objects follow
    pub more: bool,
}

/// Start deleting an object.
#[derive(Debug, Clone, Default)]
pub struct BeginDeleteObjectRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Object version
    pub version: i32,
}

/// Finish deleting an object.
#[derive(Debug, Clone)]
pub struct FinishDeleteObjectRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_delete_object`
    pub stream_id: StreamId,
}

// Segments

/// Position of a segment, `-1` for LAST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentPosition {
    /// Raw segment index
    pub index: i64,
}

impl SegmentPosition {
    /// The LAST segment.
    pub const LAST: Self = Self { index: -1 };

    /// Numbered segment.
    pub const fn new(index: i64) -> Self {
        Self { index }
    }
}

/// Start uploading a remote segment.
#[derive(Debug, Clone)]
pub struct BeginSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_object`
    pub stream_id: StreamId,
    /// Segment position
    pub position: SegmentPosition,
    /// Largest encrypted segment the client intends to upload
    pub max_order_limit: i64,
}

/// Order limits for a new segment.
#[derive(Debug, Clone)]
pub struct BeginSegmentResponse {
    /// Token for `commit_segment`
    pub segment_id: SegmentId,
    /// One PUT limit per selected node
    pub addressed_limits: Vec<AddressedOrderLimit>,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
}

/// A node's report of one uploaded piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPieceUploadResult {
    /// Piece number
    pub piece_num: u16,
    /// Node that stored it
    pub node_id: NodeId,
    /// Node-signed receipt
    pub hash: Option<PieceHash>,
}

/// Finish uploading a remote segment.
#[derive(Debug, Clone)]
pub struct CommitSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_segment`
    pub segment_id: SegmentId,
    /// Nonce of the encrypted segment key
    pub encrypted_key_nonce: Vec<u8>,
    /// Encrypted segment key
    pub encrypted_key: Vec<u8>,
    /// Encrypted segment size
    pub size_encrypted_data: i64,
    /// Piece upload results
    pub upload_result: Vec<SegmentPieceUploadResult>,
}

/// Outcome of a segment commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSegmentResponse {
    /// Pieces kept in the pointer
    pub successful_pieces: usize,
}

/// Store a small segment inside its pointer.
#[derive(Debug, Clone)]
pub struct MakeInlineSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_object`
    pub stream_id: StreamId,
    /// Segment position
    pub position: SegmentPosition,
    /// Nonce of the encrypted segment key
    pub encrypted_key_nonce: Vec<u8>,
    /// Encrypted segment key
    pub encrypted_key: Vec<u8>,
    /// Encrypted segment content
    pub encrypted_inline_data: Vec<u8>,
}

/// Start deleting one segment.
#[derive(Debug, Clone)]
pub struct BeginDeleteSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_delete_object`
    pub stream_id: StreamId,
    /// Segment position
    pub position: SegmentPosition,
}

/// Order limits to delete a segment's pieces.
#[derive(Debug, Clone)]
pub struct BeginDeleteSegmentResponse {
    /// Token for `finish_delete_segment`
    pub segment_id: SegmentId,
    /// DELETE limits, empty for inline segments
    pub addressed_limits: Vec<AddressedOrderLimit>,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
}

/// Finish deleting a segment.
#[derive(Debug, Clone)]
pub struct FinishDeleteSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token from `begin_delete_segment`
    pub segment_id: SegmentId,
}

/// List an object's segments.
#[derive(Debug, Clone)]
pub struct ListSegmentsRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token of the object
    pub stream_id: StreamId,
    /// First position to return
    pub cursor_position: SegmentPosition,
    /// Page size, `0` for the default
    pub limit: i64,
}

/// A page of segment positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSegmentsResponse {
    /// Positions, LAST always at the end when included
    pub items: Vec<SegmentPosition>,
    /// Whether more positions follow
    pub more: bool,
}

/// Fetch what is needed to download one segment.
#[derive(Debug, Clone)]
pub struct DownloadSegmentRequest {
    /// Credentials
    pub header: RequestHeader,
    /// Token of the object
    pub stream_id: StreamId,
    /// Segment to download
    pub cursor_position: SegmentPosition,
}

/// Download parameters of one segment.
#[derive(Debug, Clone)]
pub struct DownloadSegmentResponse {
    /// Empty segment token
    pub segment_id: SegmentId,
    /// Encrypted segment size
    pub segment_size: i64,
    /// Segment content, inline segments only
    pub encrypted_inline_data: Vec<u8>,
    /// GET limits indexed by piece number, `None` where no piece is held
    pub addressed_limits: Vec<Option<AddressedOrderLimit>>,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
    /// Nonce of the encrypted segment key
    pub encrypted_key_nonce: Vec<u8>,
    /// Encrypted segment key
    pub encrypted_key: Vec<u8>,
}

// Legacy

/// Address of a segment in the legacy protocol.
#[derive(Debug, Clone, Default)]
pub struct SegmentLocation {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub path: Vec<u8>,
    /// Raw segment index, `-1` for LAST
    pub segment: i64,
}

/// Legacy segment creation.
#[derive(Debug, Clone)]
pub struct CreateSegmentRequestOld {
    /// Segment being created
    pub location: SegmentLocation,
    /// Client-chosen erasure scheme
    pub redundancy: RedundancyScheme,
    /// Largest encrypted segment the client intends to upload
    pub max_encrypted_segment_size: i64,
    /// Segment expiration
    pub expiration: Option<DateTime<Utc>>,
}

/// Order limits for a legacy segment.
#[derive(Debug, Clone)]
pub struct CreateSegmentResponseOld {
    /// One PUT limit per selected node
    pub addressed_limits: Vec<AddressedOrderLimit>,
    /// Root of the segment's piece ids
    pub root_piece_id: PieceId,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
}

/// Legacy segment commit carrying a client-built pointer.
#[derive(Debug, Clone)]
pub struct CommitSegmentRequestOld {
    /// Segment being committed
    pub location: SegmentLocation,
    /// Pointer to store
    pub pointer: Pointer,
    /// Limits from `create_segment_old`, indexed by piece number
    pub original_limits: Vec<Option<OrderLimit>>,
}

/// Legacy segment download parameters.
#[derive(Debug, Clone)]
pub struct DownloadSegmentResponseOld {
    /// Stored pointer
    pub pointer: Pointer,
    /// GET limits, remote segments only
    pub addressed_limits: Vec<AddressedOrderLimit>,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
}

/// Legacy segment deletion result.
#[derive(Debug, Clone, Default)]
pub struct DeleteSegmentResponseOld {
    /// DELETE limits, remote segments only
    pub addressed_limits: Vec<AddressedOrderLimit>,
    /// Key to sign piece orders with
    pub private_key: PiecePrivateKey,
}

/// Legacy pointer listing.
#[derive(Debug, Clone, Default)]
pub struct ListSegmentsRequestOld {
    /// Credentials
    pub header: RequestHeader,
    /// Bucket name
    pub bucket: Vec<u8>,
    /// Encrypted key prefix
    pub prefix: Vec<u8>,
    /// Last key seen, relative to the prefix
    pub start_after: Vec<u8>,
    /// Descend past `/` boundaries
    pub recursive: bool,
    /// Page size, `0` for the default
    pub limit: usize,
}

/// A page of pointers.
#[derive(Debug, Clone, Default)]
pub struct ListSegmentsResponseOld {
    /// Listed pointers and prefixes
    pub items: Vec<ListedPointer>,
    /// Whether more entries follow
    pub more: bool,
}
