//! Error taxonomy for syncing, building and submitting spends.

use thiserror::Error;

use tessera_balance::BalanceError;
use tessera_privacy::{AssetId, Commitment, NoteError};

/// Failures talking to the indexer/relayer or the ledger RPC.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The relayer refused the transaction. Never retried.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("{operation} unavailable after {attempts} attempts: {last}")]
    Unavailable {
        operation: &'static str,
        attempts: u32,
        last: Box<RelayerError>,
    },

    #[error("submission failed after {attempts} attempts: {last}")]
    SubmissionFailed {
        attempts: u32,
        last: Box<RelayerError>,
    },
}

impl RelayerError {
    /// Transport failures and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayerError::Transport(_) => true,
            RelayerError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Relayer(#[from] RelayerError),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// A slot authenticated but its contents do not match the logged leaf.
    #[error("integrity failure at leaf {index}: {source}")]
    Integrity {
        index: u64,
        #[source]
        source: NoteError,
    },

    #[error("leaf gap: expected transaction at leaf {expected}, next starts at {found}")]
    LeafGap { expected: u64, found: u64 },

    #[error("transaction at leaf {first_leaf_index} has {count} leaves, expected an even count")]
    OddLeafCount { first_leaf_index: u64, count: usize },

    #[error("local merkle tree is full at {capacity} leaves")]
    TreeFull { capacity: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("{field} must be defined")]
    Undefined { field: &'static str },

    #[error("{field} must not be set for this action")]
    UnexpectedField { field: &'static str },

    #[error("public amount {field} does not fit in 64 bits")]
    PublicAmountNotU64 { field: &'static str },

    #[error("public amount {field} must be zero")]
    PublicAmountNotZero { field: &'static str },

    #[error("public amount {field} does not match the relayer fee")]
    FeeMismatch { field: &'static str },

    #[error("{count} notes exceed the limit of {capacity} per transaction")]
    TooManyCommitments { count: usize, capacity: usize },

    #[error("{count} outputs exceed the verifier's {capacity} output slots")]
    TooManyOutputs { count: usize, capacity: usize },

    #[error("more than one non-native asset in transaction: {0} and {1}")]
    TooManyAssets(AssetId, AssetId),

    #[error("insufficient {asset} balance: need {required}, have {available}")]
    InsufficientFunds {
        asset: AssetId,
        required: u128,
        available: u128,
    },

    #[error("no commitments provided")]
    NoCommitmentsProvided,

    #[error("inbox holds no {0} notes")]
    EmptyInbox(AssetId),

    #[error("commitment {0} not found in inbox")]
    CommitmentNotFound(Commitment),

    #[error("input {0} is not in the local merkle tree")]
    MissingMerklePath(Commitment),

    #[error(transparent)]
    Note(NoteError),
}

impl From<NoteError> for ParameterError {
    fn from(e: NoteError) -> Self {
        match e {
            NoteError::TooManyAssets(a, b) => ParameterError::TooManyAssets(a, b),
            other => ParameterError::Note(other),
        }
    }
}

/// Proof failures are never retried: the witness itself may be wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("prover rejected witness: {0}")]
    Rejected(String),

    #[error("invalid proof: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SpendError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Relayer(#[from] RelayerError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("local merkle root does not match the ledger; resync before spending")]
    StaleRoot,
}

pub type Result<T, E = SpendError> = std::result::Result<T, E>;
