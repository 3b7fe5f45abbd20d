//! Node identities.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use strata_core::NodeId;

/// Public identity of a peer: its id and verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Node id, the hash of the public key
    pub id: NodeId,
    /// Key the peer signs with
    pub verifying_key: VerifyingKey,
}

impl PeerIdentity {
    /// Build an identity from a verification key.
    pub fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        Self {
            id: NodeId::from_public_key(verifying_key.as_bytes()),
            verifying_key,
        }
    }
}

/// Identity including the private signing key.
#[derive(Debug, Clone)]
pub struct FullIdentity {
    /// Node id, the hash of the public key
    pub id: NodeId,
    /// Private signing key
    pub signing_key: SigningKey,
}

impl FullIdentity {
    /// Generate a fresh identity.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::generate(rng))
    }

    /// Wrap an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let id = NodeId::from_public_key(signing_key.verifying_key().as_bytes());
        Self { id, signing_key }
    }

    /// Public half of this identity.
    pub fn peer(&self) -> PeerIdentity {
        PeerIdentity {
            id: self.id,
            verifying_key: self.signing_key.verifying_key(),
        }
    }
}
