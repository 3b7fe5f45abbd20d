//! Capability tokens.
//!
//! A stream token binds every segment call of one object upload (or delete)
//! to the parameters fixed at `begin_object`. A segment token binds a
//! segment commit to the order limits handed out at `begin_segment`.
//! Neither is stored server-side: the client holds the opaque signed bytes
//! and hands them back, and they are verified on every use.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strata_core::{AddressedOrderLimit, NodeId, PieceId, RedundancyScheme};

/// Token verification failures.
///
/// Callers facing clients should collapse all of these into a single
/// unauthenticated error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Bytes do not decode to a token of the expected kind
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Signature does not verify against the satellite key
    #[error("token signature could not be verified")]
    BadSignature,
    /// Token was issued outside the validity window
    #[error("token expired")]
    Expired,
    /// Token could not be encoded at issue time
    #[error("unable to encode token: {0}")]
    Encoding(String),
}

/// Parameters of an in-progress object upload or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToken {
    /// Bucket holding the object
    pub bucket: Vec<u8>,
    /// Encrypted object key
    pub encrypted_path: Vec<u8>,
    /// Object version
    pub version: i32,
    /// Scheme every remote segment must use
    pub redundancy: RedundancyScheme,
    /// Issue time, start of the validity window
    pub creation_date: DateTime<Utc>,
    /// Object expiration, unrelated to token validity
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Parameters of an in-progress segment upload or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentToken {
    /// Token of the enclosing stream
    pub stream: StreamToken,
    /// Raw segment index, `-1` for LAST
    pub index: i64,
    /// Order limits handed out for this segment, indexed by piece number
    pub original_order_limits: Vec<AddressedOrderLimit>,
    /// Root of the segment's piece ids
    pub root_piece_id: PieceId,
    /// Issue time, start of the validity window
    pub creation_date: DateTime<Utc>,
}

/// Opaque signed stream token as held by clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Vec<u8>);

/// Opaque signed segment token as held by clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(Vec<u8>);

macro_rules! opaque_bytes {
    ($name:ident) => {
        impl $name {
            /// Wrap bytes received from a client.
            pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            /// Raw token bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

opaque_bytes!(StreamId);
opaque_bytes!(SegmentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TokenKind {
    Stream,
    Segment,
}

impl TokenKind {
    fn domain(self) -> &'static [u8] {
        match self {
            Self::Stream => b"strata/stream-token/v1",
            Self::Segment => b"strata/segment-token/v1",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SignedEnvelope {
    kind: TokenKind,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

/// Issues and verifies capability tokens with the satellite key.
#[derive(Debug, Clone)]
pub struct TokenAuthority {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    validity: Duration,
}

impl TokenAuthority {
    /// Create an authority signing with `signing_key`; tokens stay valid for `validity`.
    pub fn new(signing_key: SigningKey, validity: Duration) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            validity,
        }
    }

    /// Id of the signing satellite.
    pub fn satellite_id(&self) -> NodeId {
        NodeId::from_public_key(self.verifying_key.as_bytes())
    }

    /// Key tokens are verified against.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign a stream token.
    pub fn issue_stream_token(&self, token: &StreamToken) -> Result<StreamId, TokenError> {
        self.issue(TokenKind::Stream, token).map(StreamId)
    }

    /// Sign a segment token.
    pub fn issue_segment_token(&self, token: &SegmentToken) -> Result<SegmentId, TokenError> {
        self.issue(TokenKind::Segment, token).map(SegmentId)
    }

    /// Verify a stream token's signature and freshness at `now`.
    ///
    /// The object's own `expiration_date` is not checked.
    pub fn verify_stream_token(
        &self,
        id: &StreamId,
        now: DateTime<Utc>,
    ) -> Result<StreamToken, TokenError> {
        let token: StreamToken = self.open(TokenKind::Stream, id.as_bytes())?;
        self.check_fresh(token.creation_date, now)?;
        Ok(token)
    }

    /// Verify a segment token's signature and freshness at `now`.
    pub fn verify_segment_token(
        &self,
        id: &SegmentId,
        now: DateTime<Utc>,
    ) -> Result<SegmentToken, TokenError> {
        let token: SegmentToken = self.open(TokenKind::Segment, id.as_bytes())?;
        self.check_fresh(token.creation_date, now)?;
        Ok(token)
    }

    fn issue<T: Serialize>(&self, kind: TokenKind, token: &T) -> Result<Vec<u8>, TokenError> {
        let payload =
            bincode::serialize(token).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let signature = self
            .signing_key
            .sign(&signed_message(kind, &payload))
            .to_bytes()
            .to_vec();
        bincode::serialize(&SignedEnvelope {
            kind,
            payload,
            signature,
        })
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn open<T: DeserializeOwned>(&self, kind: TokenKind, bytes: &[u8]) -> Result<T, TokenError> {
        let envelope: SignedEnvelope =
            bincode::deserialize(bytes).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if envelope.kind != kind {
            return Err(TokenError::Malformed(format!(
                "expected {kind:?} token, got {:?}",
                envelope.kind
            )));
        }

        let signature =
            Signature::from_slice(&envelope.signature).map_err(|_| TokenError::BadSignature)?;
        self.verifying_key
            .verify(&signed_message(kind, &envelope.payload), &signature)
            .map_err(|_| TokenError::BadSignature)?;

        bincode::deserialize(&envelope.payload).map_err(|e| TokenError::Malformed(e.to_string()))
    }

    fn check_fresh(&self, creation_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TokenError> {
        if creation_date < now - self.validity {
            tracing::debug!(%creation_date, %now, "capability token expired");
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

fn signed_message(kind: TokenKind, payload: &[u8]) -> Vec<u8> {
    let domain = kind.domain();
    let mut message = Vec::with_capacity(domain.len() + payload.len());
    message.extend_from_slice(domain);
    message.extend_from_slice(payload);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn authority(seed: u8) -> TokenAuthority {
        TokenAuthority::new(SigningKey::from_bytes(&[seed; 32]), Duration::hours(24))
    }

    fn stream_token(creation_date: DateTime<Utc>) -> StreamToken {
        StreamToken {
            bucket: b"photos".to_vec(),
            encrypted_path: b"cat.jpg".to_vec(),
            version: 0,
            redundancy: RedundancyScheme::reed_solomon(4, 6, 8, 10, 256),
            creation_date,
            expiration_date: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stream_token_verifies_within_window() {
        let authority = authority(1);
        let token = stream_token(t0());
        let id = authority.issue_stream_token(&token).unwrap();

        let verified = authority
            .verify_stream_token(&id, t0() + Duration::hours(23))
            .unwrap();
        assert_eq!(verified, token);
    }

    #[test]
    fn test_stream_token_stale_after_window() {
        let authority = authority(1);
        let id = authority.issue_stream_token(&stream_token(t0())).unwrap();

        assert_matches!(
            authority.verify_stream_token(&id, t0() + Duration::hours(24) + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_object_expiration_is_not_checked() {
        let authority = authority(1);
        let mut token = stream_token(t0());
        token.expiration_date = Some(t0() - Duration::days(30));
        let id = authority.issue_stream_token(&token).unwrap();

        assert!(authority.verify_stream_token(&id, t0()).is_ok());
    }

    #[test]
    fn test_foreign_signer_rejected() {
        let id = authority(1).issue_stream_token(&stream_token(t0())).unwrap();
        assert_matches!(
            authority(2).verify_stream_token(&id, t0()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_matches!(
            authority(1).verify_stream_token(&StreamId::from_bytes(vec![1, 2, 3]), t0()),
            Err(TokenError::Malformed(_))
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let authority = authority(1);
        let id = authority.issue_stream_token(&stream_token(t0())).unwrap();
        let mut envelope: SignedEnvelope = bincode::deserialize(id.as_bytes()).unwrap();
        let mut token: StreamToken = bincode::deserialize(&envelope.payload).unwrap();
        token.bucket = b"other".to_vec();
        envelope.payload = bincode::serialize(&token).unwrap();
        let tampered = StreamId::from_bytes(bincode::serialize(&envelope).unwrap());

        assert_matches!(
            authority.verify_stream_token(&tampered, t0()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_token_kinds_do_not_cross() {
        let authority = authority(1);
        let segment = SegmentToken {
            stream: stream_token(t0()),
            index: 0,
            original_order_limits: Vec::new(),
            root_piece_id: PieceId::from_bytes([3; 32]),
            creation_date: t0(),
        };
        let id = authority.issue_segment_token(&segment).unwrap();
        assert_eq!(authority.verify_segment_token(&id, t0()).unwrap(), segment);

        let as_stream = StreamId::from_bytes(id.as_bytes().to_vec());
        assert_matches!(
            authority.verify_stream_token(&as_stream, t0()),
            Err(TokenError::Malformed(_))
        );
    }

    #[test]
    fn test_segment_token_stale_after_window() {
        let authority = authority(1);
        let segment = SegmentToken {
            stream: stream_token(t0()),
            index: -1,
            original_order_limits: Vec::new(),
            root_piece_id: PieceId::default(),
            creation_date: t0(),
        };
        let id = authority.issue_segment_token(&segment).unwrap();
        assert_matches!(
            authority.verify_segment_token(&id, t0() + Duration::days(2)),
            Err(TokenError::Expired)
        );
    }
}
