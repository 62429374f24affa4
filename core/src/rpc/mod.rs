//! Remote collaborators
//!
//! ```text
//! ┌──────────────┐  indexed_transactions()   ┌──────────────────┐
//! │              │ ◄──────────────────────── │                  │
//! │  Synchronizer│                           │ Indexer/Relayer  │
//! │  / Client    │ ────────────────────────► │                  │
//! │              │  submit(), update view    └──────────────────┘
//! │              │
//! │              │  account_exists()          ┌──────────────────┐
//! │              │ ─────────────────────────► │   Ledger RPC     │
//! └──────────────┘  latest_root(), recency    └──────────────────┘
//! ```
//!
//! Both collaborators are pure data sources/sinks. [`Retrying`] wraps either
//! with the shared [`RetryPolicy`].

mod http;
mod retry;

use std::future::Future;

use serde::{Deserialize, Serialize};

use tessera_privacy::{Address, Commitment, Nullifier};

use crate::error::RelayerError;
use crate::params::Action;

pub use http::HttpRelayer;
pub use retry::{RetryPolicy, Retrying};

/// One transaction of the remote append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTransaction {
    pub signature: String,
    pub first_leaf_index: u64,
    /// Output commitments, always an even count
    pub leaves: Vec<Commitment>,
    /// `leaves.len()` packed slots
    #[serde(with = "hex::serde")]
    pub encrypted_payload: Vec<u8>,
    pub nullifiers: Vec<Nullifier>,
    pub block_time: u64,
    #[serde(rename = "type")]
    pub kind: Action,
}

/// Everything the relayer needs to land a proven transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub verifier: Address,
    pub action: Action,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
    /// Big-endian field encodings, in circuit order
    pub public_inputs: Vec<String>,
    pub nullifiers: Vec<Nullifier>,
    pub leaves: Vec<Commitment>,
    #[serde(with = "hex::serde")]
    pub encrypted_outputs: Vec<u8>,
    pub relayer_fee: u64,
    pub accounts: EnvelopeAccounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub recency_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeAccounts {
    pub sender_native: Option<Address>,
    pub sender_token: Option<Address>,
    pub recipient_native: Option<Address>,
    pub recipient_token: Option<Address>,
    pub relayer: Option<Address>,
    pub relayer_fee_recipient: Option<Address>,
    pub merkle_tree: Address,
    pub native_pool: Address,
    pub token_pool: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub signature: String,
}

/// Source of the transaction log and sink for proven transactions.
pub trait Indexer: Send + Sync {
    /// The full log, oldest first.
    fn indexed_transactions(
        &self,
    ) -> impl Future<Output = Result<Vec<IndexedTransaction>, RelayerError>> + Send;

    fn submit(
        &self,
        envelope: &TransactionEnvelope,
    ) -> impl Future<Output = Result<TxResult, RelayerError>> + Send;

    /// Ask the relayer to move queued leaves into the tree.
    fn update_ledger_view(&self) -> impl Future<Output = Result<(), RelayerError>> + Send;
}

/// Read-only view of ledger accounts.
///
/// Nullifiers and queued leaves each live at an address derived from their
/// bytes; existence of that account is the only signal the core reads.
pub trait LedgerRpc: Send + Sync {
    fn account_exists(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<bool, RelayerError>> + Send;

    /// Little-endian root of the on-ledger merkle tree.
    fn latest_root(&self) -> impl Future<Output = Result<[u8; 32], RelayerError>> + Send;

    /// Fresh token binding a submission to recent ledger state.
    fn recency_token(&self) -> impl Future<Output = Result<String, RelayerError>> + Send;

    fn nullifier_account(&self, nullifier: &Nullifier) -> Address;

    fn queued_leaves_account(&self, left_leaf: &Commitment) -> Address;

    fn nullifier_exists(
        &self,
        nullifier: &Nullifier,
    ) -> impl Future<Output = Result<bool, RelayerError>> + Send {
        self.account_exists(self.nullifier_account(nullifier))
    }

    fn queued_leaves_exist(
        &self,
        left_leaf: &Commitment,
    ) -> impl Future<Output = Result<bool, RelayerError>> + Send {
        self.account_exists(self.queued_leaves_account(left_leaf))
    }
}

/// Address of the account recording `bytes` under `seed`.
pub fn derive_account(seed: &[u8], bytes: &[u8; 32]) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed);
    hasher.update(bytes);
    Address(*hasher.finalize().as_bytes())
}
