//! Nullifiers
//!
//! ```text
//! sig       = Poseidon(spending_key, commitment, index)
//! Nullifier = Poseidon(commitment, index, sig)
//! ```
//!
//! Publishing a nullifier marks the note spent without revealing which
//! commitment it belongs to. The leaf index prevents two notes with equal
//! contents from sharing a nullifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::field::{self, Fr};
use crate::keys::SpendingKey;

/// A nullifier (32 bytes) - unique tag for a spent note
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    pub fn derive(key: &SpendingKey, commitment: &Commitment, index: u64) -> Self {
        let commitment = commitment.to_field();
        let index = Fr::from(index);
        let sig = field::poseidon(&[key.as_field(), commitment, index]);
        Self::from_field(field::poseidon(&[commitment, index, sig]))
    }

    pub fn from_field(f: Fr) -> Self {
        Self(field::to_le_bytes(&f))
    }

    pub fn to_field(&self) -> Fr {
        field::from_le_bytes(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", hex::encode(&self.0[..8]))
    }
}
