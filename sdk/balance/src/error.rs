use thiserror::Error;

use tessera_privacy::{AssetId, Commitment};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Promoting a note that was never tracked as spendable.
    #[error("note {0} not found among spendable notes")]
    NoteNotFound(Commitment),

    #[error("note {0} holds no value")]
    ZeroBalanceNote(Commitment),

    #[error("note {commitment} holds no value in asset {asset}")]
    AssetMismatch {
        asset: AssetId,
        commitment: Commitment,
    },

    #[error("commitment {0} present in more than one state")]
    DuplicateState(Commitment),

    #[error("running total for {asset} is {tracked}, notes sum to {actual}")]
    TotalDrift {
        asset: AssetId,
        tracked: u128,
        actual: u128,
    },
}

pub type Result<T> = std::result::Result<T, BalanceError>;
