//! Per-asset note ledger.
//!
//! ```text
//!             insert(Queued)          insert(Spendable)
//!   (new) ──────────────────► queued ─────────────────► spendable
//!     │                                                     │
//!     │ insert(Spendable)                 promote_to_spent  │
//!     └──────────────────────────► spendable ──────────────►│ spent
//! ```
//!
//! A commitment lives in at most one of the three maps. Running totals track
//! the spendable map only and are adjusted incrementally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tessera_privacy::{AssetId, AssetSlot, Commitment, Note};

use crate::error::{BalanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteState {
    /// Confirmed in the tree and unspent
    Spendable,
    /// Committed on the ledger but not yet inserted into the tree
    Queued,
    /// Nullifier observed on the ledger
    Spent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    asset: AssetId,
    spendable: BTreeMap<Commitment, Note>,
    queued: BTreeMap<Commitment, Note>,
    spent: BTreeMap<Commitment, Note>,
    total_native: u128,
    total_token: u128,
}

impl TokenBalance {
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            spendable: BTreeMap::new(),
            queued: BTreeMap::new(),
            spent: BTreeMap::new(),
            total_native: 0,
            total_token: 0,
        }
    }

    /// Build from a snapshot; the only place totals are computed from scratch.
    pub fn from_notes(
        asset: AssetId,
        notes: impl IntoIterator<Item = (Note, NoteState)>,
    ) -> Result<Self> {
        let mut balance = Self::new(asset);
        for (note, state) in notes {
            let commitment = note.commitment();
            balance.check_category(&commitment, &note)?;
            if balance.state_of(&commitment).is_some() {
                return Err(BalanceError::DuplicateState(commitment));
            }
            balance.map_mut(state).insert(commitment, note);
        }
        (balance.total_native, balance.total_token) = sum_amounts(balance.spendable.values());
        Ok(balance)
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Insert `note` in `state`. Returns whether anything changed.
    ///
    /// Spent notes are terminal. A queued note entering `Spendable` leaves the
    /// queue, and a spendable note entering `Spent` is promoted.
    pub fn insert(&mut self, commitment: Commitment, note: Note, state: NoteState) -> Result<bool> {
        self.check_category(&commitment, &note)?;

        if self.spent.contains_key(&commitment) {
            return Ok(false);
        }

        let inserted = match state {
            NoteState::Spendable => {
                if self.spendable.contains_key(&commitment) {
                    false
                } else {
                    self.queued.remove(&commitment);
                    self.add_totals(&note);
                    self.spendable.insert(commitment, note);
                    true
                }
            }
            NoteState::Queued => {
                if self.spendable.contains_key(&commitment) || self.queued.contains_key(&commitment)
                {
                    false
                } else {
                    self.queued.insert(commitment, note);
                    true
                }
            }
            NoteState::Spent => {
                if self.spendable.contains_key(&commitment) {
                    self.promote_to_spent(&commitment)?;
                } else {
                    self.queued.remove(&commitment);
                    self.spent.insert(commitment, note);
                }
                true
            }
        };

        if inserted {
            debug!(asset = %self.asset, %commitment, ?state, "note inserted");
        }
        Ok(inserted)
    }

    /// Move a spendable note to `spent`, subtracting its amounts.
    pub fn promote_to_spent(&mut self, commitment: &Commitment) -> Result<()> {
        let note = self
            .spendable
            .remove(commitment)
            .ok_or(BalanceError::NoteNotFound(*commitment))?;
        self.total_native -= u128::from(note.amount(AssetSlot::Native).as_u64());
        self.total_token -= u128::from(note.amount(AssetSlot::Token).as_u64());
        self.spent.insert(*commitment, note);
        debug!(asset = %self.asset, %commitment, "note promoted to spent");
        Ok(())
    }

    pub fn state_of(&self, commitment: &Commitment) -> Option<NoteState> {
        if self.spendable.contains_key(commitment) {
            Some(NoteState::Spendable)
        } else if self.queued.contains_key(commitment) {
            Some(NoteState::Queued)
        } else if self.spent.contains_key(commitment) {
            Some(NoteState::Spent)
        } else {
            None
        }
    }

    pub fn spendable(&self) -> &BTreeMap<Commitment, Note> {
        &self.spendable
    }

    pub fn queued(&self) -> &BTreeMap<Commitment, Note> {
        &self.queued
    }

    pub fn spent(&self) -> &BTreeMap<Commitment, Note> {
        &self.spent
    }

    /// Native value across spendable notes, including dust held by token notes.
    pub fn total_native(&self) -> u128 {
        self.total_native
    }

    pub fn total_token(&self) -> u128 {
        self.total_token
    }

    pub fn is_empty(&self) -> bool {
        self.spendable.is_empty() && self.queued.is_empty() && self.spent.is_empty()
    }

    /// Full consistency check: exclusivity, categorization and totals.
    pub fn check_invariants(&self) -> Result<()> {
        for (commitment, note) in self.spendable.iter().chain(&self.queued).chain(&self.spent) {
            self.check_category(commitment, note)?;
        }
        for commitment in self.spendable.keys().chain(self.queued.keys()) {
            if self.spent.contains_key(commitment) {
                return Err(BalanceError::DuplicateState(*commitment));
            }
        }
        for commitment in self.spendable.keys() {
            if self.queued.contains_key(commitment) {
                return Err(BalanceError::DuplicateState(*commitment));
            }
        }

        let (native, token) = sum_amounts(self.spendable.values());
        if native != self.total_native {
            return Err(BalanceError::TotalDrift {
                asset: AssetId::NATIVE,
                tracked: self.total_native,
                actual: native,
            });
        }
        if token != self.total_token {
            return Err(BalanceError::TotalDrift {
                asset: self.asset,
                tracked: self.total_token,
                actual: token,
            });
        }
        Ok(())
    }

    /// A note filed under this asset must hold value in its slot.
    fn check_category(&self, commitment: &Commitment, note: &Note) -> Result<()> {
        if note.is_zero() {
            return Err(BalanceError::ZeroBalanceNote(*commitment));
        }
        if note.balance_asset() != self.asset {
            return Err(BalanceError::AssetMismatch {
                asset: self.asset,
                commitment: *commitment,
            });
        }
        Ok(())
    }

    fn add_totals(&mut self, note: &Note) {
        self.total_native += u128::from(note.amount(AssetSlot::Native).as_u64());
        self.total_token += u128::from(note.amount(AssetSlot::Token).as_u64());
    }

    fn map_mut(&mut self, state: NoteState) -> &mut BTreeMap<Commitment, Note> {
        match state {
            NoteState::Spendable => &mut self.spendable,
            NoteState::Queued => &mut self.queued,
            NoteState::Spent => &mut self.spent,
        }
    }
}

fn sum_amounts<'a>(notes: impl Iterator<Item = &'a Note>) -> (u128, u128) {
    notes.fold((0, 0), |(native, token), note| {
        (
            native + u128::from(note.amount(AssetSlot::Native).as_u64()),
            token + u128::from(note.amount(AssetSlot::Token).as_u64()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tessera_privacy::{Account, Address};

    fn mint() -> AssetId {
        AssetId(Address([31u8; 32]))
    }

    fn native_note(amount: u64) -> Note {
        let pk = Account::random(&mut OsRng).public_key();
        Note::builder(pk).native(amount).index(0).build(&mut OsRng).unwrap()
    }

    #[test]
    fn test_insert_spendable_adjusts_totals() {
        let mut balance = TokenBalance::new(AssetId::NATIVE);
        let note = native_note(100);
        let c = note.commitment();

        assert!(balance.insert(c, note.clone(), NoteState::Spendable).unwrap());
        assert_eq!(balance.total_native(), 100);

        assert!(
            !balance.insert(c, note, NoteState::Spendable).unwrap(),
            "replayed insert should be a no-op"
        );
        assert_eq!(balance.total_native(), 100, "replay must not double count");
    }

    #[test]
    fn test_queued_does_not_count() {
        let mut balance = TokenBalance::new(AssetId::NATIVE);
        let note = native_note(40);
        let c = note.commitment();

        assert!(balance.insert(c, note.clone(), NoteState::Queued).unwrap());
        assert_eq!(balance.total_native(), 0);
        assert_eq!(balance.state_of(&c), Some(NoteState::Queued));

        assert!(balance.insert(c, note, NoteState::Spendable).unwrap());
        assert_eq!(balance.total_native(), 40);
        assert_eq!(balance.state_of(&c), Some(NoteState::Spendable));
        assert!(balance.queued().is_empty(), "queued entry should move out");
    }

    #[test]
    fn test_promote_to_spent() {
        let mut balance = TokenBalance::new(AssetId::NATIVE);
        let note = native_note(70);
        let c = note.commitment();
        balance.insert(c, note.clone(), NoteState::Spendable).unwrap();

        balance.promote_to_spent(&c).unwrap();
        assert_eq!(balance.total_native(), 0);
        assert_eq!(balance.state_of(&c), Some(NoteState::Spent));

        assert!(
            !balance.insert(c, note, NoteState::Spendable).unwrap(),
            "spent notes never return to spendable"
        );
        assert_eq!(balance.total_native(), 0);
    }

    #[test]
    fn test_promote_unknown_note_fails() {
        let mut balance = TokenBalance::new(AssetId::NATIVE);
        let c = Commitment([4u8; 32]);
        assert_eq!(
            balance.promote_to_spent(&c).unwrap_err(),
            BalanceError::NoteNotFound(c)
        );
    }

    #[test]
    fn test_category_checked() {
        let mut balance = TokenBalance::new(mint());
        let note = native_note(10);
        let c = note.commitment();
        assert_eq!(
            balance.insert(c, note, NoteState::Spendable).unwrap_err(),
            BalanceError::AssetMismatch {
                asset: mint(),
                commitment: c
            }
        );

        let zero = Note::zero([1u8; 32], &mut OsRng);
        let c = zero.commitment();
        assert_eq!(
            balance.insert(c, zero, NoteState::Spendable).unwrap_err(),
            BalanceError::ZeroBalanceNote(c)
        );
    }

    #[test]
    fn test_token_balance_tracks_both_slots() {
        let mut balance = TokenBalance::new(mint());
        let note = Note::builder([1u8; 32])
            .native(3)
            .token(mint(), 50)
            .build(&mut OsRng)
            .unwrap();
        balance
            .insert(note.commitment(), note, NoteState::Spendable)
            .unwrap();

        assert_eq!(balance.total_token(), 50);
        assert_eq!(balance.total_native(), 3);
        balance.check_invariants().unwrap();
    }

    #[test]
    fn test_from_notes_computes_totals() {
        let a = native_note(5);
        let b = native_note(6);
        let c = native_note(7);
        let balance = TokenBalance::from_notes(
            AssetId::NATIVE,
            [
                (a, NoteState::Spendable),
                (b, NoteState::Spendable),
                (c, NoteState::Spent),
            ],
        )
        .unwrap();

        assert_eq!(balance.total_native(), 11);
        balance.check_invariants().unwrap();
    }
}
