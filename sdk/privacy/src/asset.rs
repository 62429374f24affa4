//! Addresses, assets and the per-transaction asset triple.
//!
//! ```text
//! circuit key  = int_be( sha256(asset_id)[1..32] )      // 248 bits, below the prime
//! asset triple = [ native, primary token, reserved ]
//!   circuit    = [ key(native), key(token) | SENTINEL, 0 ]
//! ```

use std::fmt;
use std::str::FromStr;

use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::AssetSlot;
use crate::error::{NoteError, Result};
use crate::field::Fr;
use crate::note::Note;

/// A 32-byte ledger address, displayed as base58.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(pub String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ParseAddressError(format!("{s}: {e}")))?;
        let len = bytes.len();
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseAddressError(format!("{s}: expected 32 bytes, got {len}")))?;
        Ok(Self(arr))
    }
}

/// Identifier of an asset (token mint). The all-zero address is the native asset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub Address);

impl AssetId {
    pub const NATIVE: Self = Self(Address::ZERO);

    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    /// Hash of the asset id truncated to 31 bytes so it always fits the field.
    pub fn circuit_key(&self) -> Fr {
        let digest = Sha256::digest(self.0.as_bytes());
        Fr::from_be_bytes_mod_order(&digest[1..32])
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            f.write_str("native")
        } else {
            self.0.fmt(f)
        }
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}

impl FromStr for AssetId {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "native" {
            return Ok(Self::NATIVE);
        }
        s.parse().map(Self)
    }
}

/// Identifier of a verifier program that scopes app notes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub Address);

impl ProgramId {
    pub fn circuit_key(&self) -> Fr {
        AssetId(self.0).circuit_key()
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramId({self})")
    }
}

impl FromStr for ProgramId {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

// ============================================================================
// Asset triple
// ============================================================================

/// Circuit value standing in for the token slot when no token is involved.
/// No note ever carries it, so the token public amount stays zero.
pub const NO_TOKEN_SENTINEL: u64 = 1;

/// The three asset slots of a transaction: native, primary token, reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTriple {
    assets: [AssetId; 3],
    circuit: [Fr; 3],
}

impl AssetTriple {
    /// Build the triple for a transaction moving at most one token.
    pub fn for_token(token: Option<AssetId>) -> Result<Self> {
        let native = AssetId::NATIVE;
        let (token_id, token_key) = match token {
            Some(t) => (t, t.circuit_key()),
            None => (native, Fr::from(NO_TOKEN_SENTINEL)),
        };
        Self::from_parts(
            [native, token_id, native],
            [native.circuit_key(), token_key, Fr::from(0u64)],
        )
    }

    /// Derive the triple from the token carried by the given notes.
    pub fn from_notes<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Result<Self> {
        let mut token: Option<AssetId> = None;
        for note in notes {
            let asset = note.asset(AssetSlot::Token);
            if asset.is_native() {
                continue;
            }
            match token {
                None => token = Some(asset),
                Some(t) if t == asset => {}
                Some(t) => return Err(NoteError::TooManyAssets(t, asset)),
            }
        }
        Self::for_token(token)
    }

    /// Circuit values must be pairwise distinct.
    pub fn from_parts(assets: [AssetId; 3], circuit: [Fr; 3]) -> Result<Self> {
        if circuit[0] == circuit[1] || circuit[0] == circuit[2] || circuit[1] == circuit[2] {
            return Err(NoteError::AssetsNotDistinct);
        }
        Ok(Self { assets, circuit })
    }

    pub fn assets(&self) -> &[AssetId; 3] {
        &self.assets
    }

    pub fn circuit(&self) -> &[Fr; 3] {
        &self.circuit
    }

    /// The token this transaction moves, if any.
    pub fn token(&self) -> Option<AssetId> {
        (!self.assets[1].is_native()).then_some(self.assets[1])
    }
}

// ============================================================================
// Lookup tables
// ============================================================================

/// Index tables shared by sender and recipient so that note plaintexts can
/// carry a small index instead of a full asset or verifier address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTables {
    assets: Vec<AssetId>,
    verifiers: Vec<ProgramId>,
}

impl LookupTables {
    /// The native asset always sits at index 0.
    pub fn new(tokens: impl IntoIterator<Item = AssetId>, verifiers: Vec<ProgramId>) -> Self {
        let mut assets = vec![AssetId::NATIVE];
        for token in tokens {
            if !assets.contains(&token) {
                assets.push(token);
            }
        }
        Self { assets, verifiers }
    }

    pub fn asset_index(&self, asset: &AssetId) -> Result<u64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| i as u64)
            .ok_or(NoteError::UnknownAsset(*asset))
    }

    pub fn asset_at(&self, index: u64) -> Option<AssetId> {
        usize::try_from(index).ok().and_then(|i| self.assets.get(i)).copied()
    }

    /// 0 encodes "no verifier"; table entries start at 1.
    pub fn verifier_index(&self, verifier: Option<&ProgramId>) -> Result<u64> {
        let Some(verifier) = verifier else {
            return Ok(0);
        };
        self.verifiers
            .iter()
            .position(|v| v == verifier)
            .map(|i| i as u64 + 1)
            .ok_or(NoteError::UnknownVerifier(*verifier))
    }

    pub fn verifier_at(&self, index: u64) -> Option<Option<ProgramId>> {
        if index == 0 {
            return Some(None);
        }
        usize::try_from(index - 1)
            .ok()
            .and_then(|i| self.verifiers.get(i))
            .map(|v| Some(*v))
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }
}

impl Default for LookupTables {
    fn default() -> Self {
        Self::new([], Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint() -> AssetId {
        AssetId(Address([7u8; 32]))
    }

    #[test]
    fn test_address_base58_roundtrip() {
        let addr = Address([9u8; 32]);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
        assert!("not-base58!".parse::<Address>().is_err());
    }

    #[test]
    fn test_native_parses_by_name() {
        assert_eq!("native".parse::<AssetId>().unwrap(), AssetId::NATIVE);
        assert_eq!(AssetId::NATIVE.to_string(), "native");
    }

    #[test]
    fn test_circuit_key_fits_31_bytes() {
        use ark_ff::BigInteger;
        let key = mint().circuit_key();
        assert!(key.into_bigint().num_bits() <= 248);
        assert_ne!(key, AssetId::NATIVE.circuit_key());
    }

    #[test]
    fn test_triple_distinct() {
        let triple = AssetTriple::for_token(Some(mint())).unwrap();
        assert_eq!(triple.token(), Some(mint()));

        let no_token = AssetTriple::for_token(None).unwrap();
        assert_eq!(no_token.token(), None);
        assert_eq!(no_token.circuit()[1], Fr::from(NO_TOKEN_SENTINEL));
    }

    #[test]
    fn test_triple_rejects_duplicates() {
        let native = AssetId::NATIVE;
        let err = AssetTriple::for_token(Some(native)).unwrap_err();
        assert_eq!(err, NoteError::AssetsNotDistinct);

        let key = mint().circuit_key();
        let err = AssetTriple::from_parts([native, mint(), mint()], [native.circuit_key(), key, key])
            .unwrap_err();
        assert_eq!(err, NoteError::AssetsNotDistinct);
    }

    #[test]
    fn test_lookup_tables() {
        let verifier = ProgramId(Address([3u8; 32]));
        let tables = LookupTables::new([mint(), mint()], vec![verifier]);

        assert_eq!(tables.assets().len(), 2, "duplicates are dropped");
        assert_eq!(tables.asset_index(&AssetId::NATIVE).unwrap(), 0);
        assert_eq!(tables.asset_index(&mint()).unwrap(), 1);
        assert_eq!(tables.asset_at(1), Some(mint()));
        assert_eq!(tables.asset_at(5), None);

        assert_eq!(tables.verifier_index(None).unwrap(), 0);
        assert_eq!(tables.verifier_index(Some(&verifier)).unwrap(), 1);
        assert_eq!(tables.verifier_at(0), Some(None));
        assert_eq!(tables.verifier_at(1), Some(Some(verifier)));
        assert_eq!(tables.verifier_at(2), None);
    }
}
