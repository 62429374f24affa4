//! Shielded Notes
//!
//! A note holds value in up to two asset slots. Slot 0 is always the native
//! asset; slot 1 is either a single token or native (meaning "no token").
//!
//! ```text
//! Note = {
//!     assets:        [AssetId; 2],   // [native, token | native]
//!     amounts:       [u64; 2],       // range checked at construction
//!     owner_pk:      [u8; 32],       // shielded owner key (field element, LE)
//!     blinding:      [u8; 32],       // 31 random bytes, top byte zero
//!     app_data_hash: Option<[u8; 32]>,
//!     verifier_tag:  Option<ProgramId>,
//!     index:         Option<u64>,    // leaf index, set once observed on the log
//! }
//! ```

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, AssetSlot};
use crate::asset::{AssetId, ProgramId};
use crate::commitment::Commitment;
use crate::error::{NoteError, Result};
use crate::field::Fr;
use crate::keys::Account;
use crate::nullifier::Nullifier;

pub const ASSET_SLOTS: usize = 2;

/// Random bytes in a blinding factor; keeps it below the field prime.
pub const BLINDING_BYTES: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    assets: [AssetId; ASSET_SLOTS],
    amounts: [Amount; ASSET_SLOTS],
    owner_pk: [u8; 32],
    blinding: [u8; 32],
    app_data_hash: Option<[u8; 32]>,
    verifier_tag: Option<ProgramId>,
    index: Option<u64>,
}

impl Note {
    pub fn builder(owner_pk: [u8; 32]) -> NoteBuilder {
        NoteBuilder {
            owner_pk,
            native: 0,
            token: None,
            blinding: None,
            app_data_hash: None,
            verifier_tag: None,
            index: None,
        }
    }

    /// Zero-valued note used to pad inputs and outputs to a fixed arity.
    pub fn zero<R: RngCore + CryptoRng>(owner_pk: [u8; 32], rng: &mut R) -> Self {
        Self {
            assets: [AssetId::NATIVE; ASSET_SLOTS],
            amounts: [Amount::ZERO; ASSET_SLOTS],
            owner_pk,
            blinding: random_blinding(rng),
            app_data_hash: None,
            verifier_tag: None,
            index: None,
        }
    }

    pub fn assets(&self) -> &[AssetId; ASSET_SLOTS] {
        &self.assets
    }

    pub fn asset(&self, slot: AssetSlot) -> AssetId {
        self.assets[slot.index()]
    }

    pub fn amounts(&self) -> &[Amount; ASSET_SLOTS] {
        &self.amounts
    }

    pub fn amount(&self, slot: AssetSlot) -> Amount {
        self.amounts[slot.index()]
    }

    pub fn owner_pk(&self) -> &[u8; 32] {
        &self.owner_pk
    }

    pub fn blinding(&self) -> &[u8; 32] {
        &self.blinding
    }

    pub fn app_data_hash(&self) -> Option<&[u8; 32]> {
        self.app_data_hash.as_ref()
    }

    pub fn verifier_tag(&self) -> Option<&ProgramId> {
        self.verifier_tag.as_ref()
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Set the leaf index once the note is observed in the tree.
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Circuit key of the asset held in `slot`; an empty token slot is zero.
    pub fn circuit_key(&self, slot: AssetSlot) -> Fr {
        let asset = self.asset(slot);
        match slot {
            AssetSlot::Token if asset.is_native() => Fr::from(0u64),
            _ => asset.circuit_key(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amounts.iter().all(Amount::is_zero)
    }

    /// App notes belong to a verifier program rather than the owner's balance.
    pub fn is_app_note(&self) -> bool {
        self.verifier_tag.is_some() || self.app_data_hash.is_some()
    }

    /// Asset the note is filed under: the token when it holds any, else native.
    pub fn balance_asset(&self) -> AssetId {
        if self.amount(AssetSlot::Token).is_zero() {
            self.asset(AssetSlot::Native)
        } else {
            self.asset(AssetSlot::Token)
        }
    }

    pub fn commitment(&self) -> Commitment {
        Commitment::of(self)
    }

    /// Requires the leaf index and the account's spending key.
    pub fn nullifier(&self, account: &Account) -> Result<Nullifier> {
        let index = self.index.ok_or(NoteError::IndexNotProvided)?;
        let spending_key = account.spending_key()?;
        Ok(Nullifier::derive(spending_key, &self.commitment(), index))
    }
}

/// Range-checks amounts before a note (and thus a commitment) can exist.
#[derive(Debug, Clone)]
pub struct NoteBuilder {
    owner_pk: [u8; 32],
    native: i128,
    token: Option<(AssetId, i128)>,
    blinding: Option<[u8; 32]>,
    app_data_hash: Option<[u8; 32]>,
    verifier_tag: Option<ProgramId>,
    index: Option<u64>,
}

impl NoteBuilder {
    pub fn native(mut self, amount: impl Into<i128>) -> Self {
        self.native = amount.into();
        self
    }

    pub fn token(mut self, asset: AssetId, amount: impl Into<i128>) -> Self {
        self.token = Some((asset, amount.into()));
        self
    }

    /// Fixed blinding factor instead of a random one.
    pub fn blinding(mut self, blinding: [u8; 32]) -> Self {
        self.blinding = Some(blinding);
        self
    }

    pub fn app_data(mut self, app_data_hash: Option<[u8; 32]>, verifier: Option<ProgramId>) -> Self {
        self.app_data_hash = app_data_hash.filter(|h| *h != [0u8; 32]);
        self.verifier_tag = verifier;
        self
    }

    pub fn index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn build<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<Note> {
        let blinding = self.blinding.unwrap_or_else(|| random_blinding(rng));
        self.recover(blinding)
    }

    /// Build with a known blinding factor, as recovered from a ciphertext.
    pub fn recover(self, blinding: [u8; 32]) -> Result<Note> {
        let native = Amount::try_from_signed(self.native)?;
        let (token_asset, token) = match self.token {
            Some((asset, amount)) => (asset, Amount::try_from_signed(amount)?),
            None => (AssetId::NATIVE, Amount::ZERO),
        };
        if token_asset.is_native() && !token.is_zero() {
            return Err(NoteError::AmountWithoutAsset(token.as_u64()));
        }

        Ok(Note {
            assets: [AssetId::NATIVE, token_asset],
            amounts: [native, token],
            owner_pk: self.owner_pk,
            blinding,
            app_data_hash: self.app_data_hash,
            verifier_tag: self.verifier_tag,
            index: self.index,
        })
    }
}

pub fn random_blinding<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut blinding = [0u8; 32];
    rng.fill_bytes(&mut blinding[..BLINDING_BYTES]);
    blinding
}
