//! Range-checked note amounts and public (external) amounts.
//!
//! ```text
//! external(slot) = Σ outputs[slot] - Σ inputs[slot]   (mod p)
//! ```
//!
//! Only notes whose per-slot circuit key equals the transaction's asset key
//! for that slot contribute. A net outflow wraps to `p - |x|`.

use serde::{Deserialize, Serialize};

use crate::asset::AssetTriple;
use crate::error::{NoteError, Result};
use crate::field::Fr;
use crate::note::Note;

/// A note amount, guaranteed to be in `0..=u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Range check for amounts coming from signed arithmetic.
    pub fn try_from_signed(value: i128) -> Result<Self> {
        if value < 0 {
            return Err(NoteError::NegativeAmount(value));
        }
        u64::try_from(value)
            .map(Self)
            .map_err(|_| NoteError::AmountNotU64(value))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_field(&self) -> Fr {
        Fr::from(self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Asset slot of a note. The triple's reserved slot never holds value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    Native = 0,
    Token = 1,
}

impl AssetSlot {
    pub const ALL: [AssetSlot; 2] = [AssetSlot::Native, AssetSlot::Token];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Net value flowing out of the shielded notes for one slot.
pub fn external_amount(slot: AssetSlot, triple: &AssetTriple, inputs: &[Note], outputs: &[Note]) -> Fr {
    let key = triple.circuit()[slot.index()];
    let sum = |notes: &[Note]| {
        notes
            .iter()
            .filter(|n| n.circuit_key(slot) == key)
            .fold(Fr::from(0u64), |acc, n| acc + n.amount(slot).to_field())
    };
    sum(outputs) - sum(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_range_check() {
        assert_eq!(Amount::try_from_signed(5).unwrap(), Amount::new(5));
        assert_eq!(
            Amount::try_from_signed(-1).unwrap_err(),
            NoteError::NegativeAmount(-1)
        );
        let too_big = i128::from(u64::MAX) + 1;
        assert_eq!(
            Amount::try_from_signed(too_big).unwrap_err(),
            NoteError::AmountNotU64(too_big)
        );
        assert_eq!(
            Amount::try_from_signed(i128::from(u64::MAX)).unwrap(),
            Amount::new(u64::MAX)
        );
    }
}
