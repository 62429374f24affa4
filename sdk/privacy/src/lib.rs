//! Tessera Privacy SDK
//!
//! Note primitives for a shielded UTXO pool: commitments, nullifiers, amount
//! arithmetic over the BN254 scalar field, and the fixed-slot note codec.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Shielded Transaction                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Nullifiers  │  │ Commitments  │  │  Encrypted outputs    │  │
//! │  │  (spent)     │  │  (new notes) │  │  (one slot per note)  │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │              Public inputs of the spend proof             │  │
//! │  │  • root, public amounts, integrity hash                   │  │
//! │  │  • Σ outputs - Σ inputs = external amount (mod p)         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod amount;
pub mod asset;
pub mod commitment;
pub mod encryption;
pub mod error;
pub mod field;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod packing;

pub use amount::{Amount, AssetSlot, external_amount};
pub use asset::{Address, AssetId, AssetTriple, LookupTables, ProgramId};
pub use commitment::Commitment;
pub use encryption::{DecryptionMode, EncryptedNote, EncryptionMode, decrypt_note, encrypt_note};
pub use error::{NoteError, Result};
pub use field::{FIELD_PRIME, Fr};
pub use keys::{Account, Recipient, SpendingKey, ViewingKey};
pub use merkle::{MERKLE_TREE_HEIGHT, MerklePath, MerkleTree, RootHistory, empty_root};
pub use note::{Note, NoteBuilder};
pub use nullifier::Nullifier;
pub use packing::{SLOT_SIZE, pack_slots, pair_slots, slot};
