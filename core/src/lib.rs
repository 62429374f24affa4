//! Tessera Core
//!
//! Keeps a private balance in step with the shielded pool and turns spends
//! into proven, relayed transactions.
//!
//! ```text
//!              ┌──────────────────────────── ShieldedClient ───────────────────────────┐
//!              │                                                                        │
//! Indexer ───► │ Synchronizer ──► Balance / InboxBalance ──► ParameterBuilder ──► Prover │
//!   ▲          │      │                                            │                    │
//!   │          │      └── LedgerRpc (nullifiers, queue, root)      └── envelope ────────┼──┐
//!   │          └────────────────────────────────────────────────────────────────────────┘  │
//!   └──────────────────────────────── submit / update view ◄───────────────────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod params;
pub mod prover;
pub mod rpc;
pub mod sync;

pub use client::{ClientOptions, ShieldedClient, SpendOutcome};
pub use error::{ParameterError, ProofError, RelayerError, Result, SpendError, SyncError};
pub use params::{
    Action, Output, ParameterBuilder, PoolAccounts, Relayer, TransactionParameters, TxAccounts,
    VerifierConfig,
};
pub use prover::{MockProver, ProofOutput, Prover};
pub use rpc::{HttpRelayer, IndexedTransaction, Indexer, LedgerRpc, RetryPolicy, Retrying};
pub use sync::{SyncCursor, SyncReport, Synchronizer};
