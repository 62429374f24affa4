//! Tessera Balance Ledger
//!
//! Tracks an owner's notes per asset in three disjoint states with running
//! totals. The synchronizer is the only writer.
//!
//! ```text
//! Balance
//! ├── token_balances:   AssetId   → TokenBalance { spendable, queued, spent, totals }
//! ├── program_balances: ProgramId → ProgramBalance { AssetId → TokenBalance }
//! └── total_native:     Σ TokenBalance.total_native
//! ```

pub mod balance;
pub mod error;
pub mod token;

pub use balance::{Balance, InboxBalance, ProgramBalance};
pub use error::{BalanceError, Result};
pub use token::{NoteState, TokenBalance};
