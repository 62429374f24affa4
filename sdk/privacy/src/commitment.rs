//! Note Commitments
//!
//! ```text
//! Commitment = Poseidon(amount_0, amount_1, owner_pk, blinding,
//!                       asset_key_0, asset_key_1, app_data_hash, verifier_key)
//! ```
//!
//! Absent app data and verifier tags hash as zero. Structurally identical
//! notes always produce the same commitment, which keeps re-indexing of the
//! same log idempotent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::AssetSlot;
use crate::field::{self, Fr};
use crate::note::Note;

/// A note commitment (32 bytes, little-endian field element)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Commit to every field of `note` except its leaf index.
    pub fn of(note: &Note) -> Self {
        let app_data = note
            .app_data_hash()
            .map(field::from_le_bytes)
            .unwrap_or_default();
        let verifier = note
            .verifier_tag()
            .map(|v| v.circuit_key())
            .unwrap_or_default();

        let hash = field::poseidon(&[
            note.amount(AssetSlot::Native).to_field(),
            note.amount(AssetSlot::Token).to_field(),
            field::from_le_bytes(note.owner_pk()),
            field::from_le_bytes(note.blinding()),
            note.circuit_key(AssetSlot::Native),
            note.circuit_key(AssetSlot::Token),
            app_data,
            verifier,
        ]);
        Self::from_field(hash)
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

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0[..8]))
    }
}
