//! Owner-level balances: one `TokenBalance` per asset, plus balances scoped
//! to verifier programs for app notes.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use tessera_privacy::{AssetId, AssetSlot, Commitment, Note, ProgramId};

use crate::error::{BalanceError, Result};
use crate::token::{NoteState, TokenBalance};

/// Notes held under a verifier program, keyed by asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBalance {
    program_id: ProgramId,
    token_balances: BTreeMap<AssetId, TokenBalance>,
}

impl ProgramBalance {
    pub fn new(program_id: ProgramId) -> Self {
        Self {
            program_id,
            token_balances: BTreeMap::new(),
        }
    }

    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    pub fn insert(&mut self, commitment: Commitment, note: Note, state: NoteState) -> Result<bool> {
        let asset = note.balance_asset();
        self.token_balances
            .entry(asset)
            .or_insert_with(|| TokenBalance::new(asset))
            .insert(commitment, note, state)
    }

    pub fn token_balances(&self) -> &BTreeMap<AssetId, TokenBalance> {
        &self.token_balances
    }

    pub fn token_balances_mut(&mut self) -> &mut BTreeMap<AssetId, TokenBalance> {
        &mut self.token_balances
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    token_balances: BTreeMap<AssetId, TokenBalance>,
    program_balances: BTreeMap<ProgramId, ProgramBalance>,
    total_native: u128,
}

impl Balance {
    pub fn new() -> Self {
        let mut token_balances = BTreeMap::new();
        token_balances.insert(AssetId::NATIVE, TokenBalance::new(AssetId::NATIVE));
        Self {
            token_balances,
            program_balances: BTreeMap::new(),
            total_native: 0,
        }
    }

    /// File a note under its asset, or under its program if it is an app note.
    ///
    /// App notes without a verifier tag go under the program id derived from
    /// the zero address.
    pub fn insert_note(&mut self, commitment: Commitment, note: Note, state: NoteState) -> Result<bool> {
        if note.is_app_note() {
            let program = note
                .verifier_tag()
                .copied()
                .unwrap_or(ProgramId(AssetId::NATIVE.0));
            return self
                .program_balances
                .entry(program)
                .or_insert_with(|| ProgramBalance::new(program))
                .insert(commitment, note, state);
        }

        let asset = note.balance_asset();
        self.token_balances
            .entry(asset)
            .or_insert_with(|| TokenBalance::new(asset))
            .insert(commitment, note, state)
    }

    /// Promote a spendable note under `asset` to spent.
    pub fn promote_to_spent(&mut self, asset: &AssetId, commitment: &Commitment) -> Result<()> {
        match self.token_balances.get_mut(asset) {
            Some(balance) => balance.promote_to_spent(commitment),
            None => Err(BalanceError::NoteNotFound(*commitment)),
        }
    }

    pub fn token_balance(&self, asset: &AssetId) -> Option<&TokenBalance> {
        self.token_balances.get(asset)
    }

    pub fn token_balances(&self) -> &BTreeMap<AssetId, TokenBalance> {
        &self.token_balances
    }

    pub fn program_balances(&self) -> &BTreeMap<ProgramId, ProgramBalance> {
        &self.program_balances
    }

    pub fn program_balances_mut(&mut self) -> &mut BTreeMap<ProgramId, ProgramBalance> {
        &mut self.program_balances
    }

    /// Spendable notes of one asset, largest balance first.
    pub fn spendable_notes(&self, asset: &AssetId) -> Vec<&Note> {
        let Some(balance) = self.token_balances.get(asset) else {
            return Vec::new();
        };
        let slot = if asset.is_native() {
            AssetSlot::Native
        } else {
            AssetSlot::Token
        };
        let mut notes: Vec<&Note> = balance.spendable().values().collect();
        notes.sort_by(|a, b| b.amount(slot).cmp(&a.amount(slot)));
        notes
    }

    /// Every spendable note with the asset it is filed under.
    pub fn all_spendable(&self) -> impl Iterator<Item = (AssetId, &Commitment, &Note)> {
        self.token_balances
            .iter()
            .flat_map(|(asset, b)| b.spendable().iter().map(move |(c, n)| (*asset, c, n)))
    }

    pub fn state_of(&self, commitment: &Commitment) -> Option<NoteState> {
        self.token_balances
            .values()
            .chain(self.program_balances.values().flat_map(|p| p.token_balances().values()))
            .find_map(|b| b.state_of(commitment))
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.state_of(commitment).is_some()
    }

    /// Aggregate native total as of the last [`Balance::recompute_native_total`].
    pub fn total_native(&self) -> u128 {
        self.total_native
    }

    pub fn recompute_native_total(&mut self) -> u128 {
        self.total_native = self.token_balances.values().map(TokenBalance::total_native).sum();
        self.total_native
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.token_balances
            .values()
            .chain(self.program_balances.values().flat_map(|p| p.token_balances().values()))
            .try_for_each(TokenBalance::check_invariants)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}

/// Notes addressed to the owner but not yet merged into the main balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxBalance {
    balance: Balance,
    inbox_note_count: usize,
}

impl InboxBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inbox_note_count(&self) -> usize {
        self.inbox_note_count
    }

    /// Recount spendable inbox notes after a sync.
    pub fn recount(&mut self) -> usize {
        self.inbox_note_count = self
            .balance
            .token_balances()
            .values()
            .map(|b| b.spendable().len())
            .sum();
        self.inbox_note_count
    }

    /// Find a spendable inbox note by commitment.
    pub fn find_spendable(&self, commitment: &Commitment) -> Option<&Note> {
        self.balance
            .token_balances()
            .values()
            .find_map(|b| b.spendable().get(commitment))
    }
}

impl Deref for InboxBalance {
    type Target = Balance;

    fn deref(&self) -> &Balance {
        &self.balance
    }
}

impl DerefMut for InboxBalance {
    fn deref_mut(&mut self) -> &mut Balance {
        &mut self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tessera_privacy::Address;

    fn mint() -> AssetId {
        AssetId(Address([41u8; 32]))
    }

    #[test]
    fn test_routes_by_asset() {
        let mut balance = Balance::new();
        let native = Note::builder([1u8; 32]).native(5).build(&mut OsRng).unwrap();
        let token = Note::builder([1u8; 32])
            .native(1)
            .token(mint(), 9)
            .build(&mut OsRng)
            .unwrap();

        balance
            .insert_note(native.commitment(), native, NoteState::Spendable)
            .unwrap();
        balance
            .insert_note(token.commitment(), token, NoteState::Spendable)
            .unwrap();

        assert_eq!(balance.token_balance(&AssetId::NATIVE).unwrap().total_native(), 5);
        assert_eq!(balance.token_balance(&mint()).unwrap().total_token(), 9);
        assert_eq!(balance.recompute_native_total(), 6);
    }

    #[test]
    fn test_app_notes_route_to_program() {
        let mut balance = Balance::new();
        let program = ProgramId(Address([42u8; 32]));
        let note = Note::builder([1u8; 32])
            .native(5)
            .app_data(Some([1u8; 32]), Some(program))
            .build(&mut OsRng)
            .unwrap();
        let c = note.commitment();

        balance.insert_note(c, note, NoteState::Spendable).unwrap();

        assert_eq!(balance.token_balance(&AssetId::NATIVE).unwrap().total_native(), 0);
        assert!(balance.program_balances().contains_key(&program));
        assert_eq!(balance.state_of(&c), Some(NoteState::Spendable));
        assert_eq!(balance.recompute_native_total(), 0, "program notes are not owner balance");
    }

    #[test]
    fn test_spendable_notes_sorted_descending() {
        let mut balance = Balance::new();
        for amount in [3u64, 9, 1] {
            let n = Note::builder([1u8; 32]).native(amount).build(&mut OsRng).unwrap();
            balance.insert_note(n.commitment(), n, NoteState::Spendable).unwrap();
        }
        let amounts: Vec<u64> = balance
            .spendable_notes(&AssetId::NATIVE)
            .iter()
            .map(|n| n.amount(AssetSlot::Native).as_u64())
            .collect();
        assert_eq!(amounts, vec![9, 3, 1]);
    }

    #[test]
    fn test_inbox_recount() {
        let mut inbox = InboxBalance::new();
        let n = Note::builder([1u8; 32]).native(2).build(&mut OsRng).unwrap();
        let c = n.commitment();
        inbox.insert_note(c, n, NoteState::Spendable).unwrap();

        assert_eq!(inbox.inbox_note_count(), 0, "count is refreshed explicitly");
        assert_eq!(inbox.recount(), 1);
        assert!(inbox.find_spendable(&c).is_some());
    }
}
