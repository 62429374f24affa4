//! Errors raised while constructing, nullifying or decoding notes.

use thiserror::Error;

use crate::asset::{AssetId, ProgramId};
use crate::commitment::Commitment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("amount {0} is negative")]
    NegativeAmount(i128),

    #[error("amount {0} does not fit in 64 bits")]
    AmountNotU64(i128),

    #[error("token amount {0} set without a token asset in slot 1")]
    AmountWithoutAsset(u64),

    #[error("note index not provided")]
    IndexNotProvided,

    #[error("account holds no spending key")]
    NoPrivateKey,

    #[error("asset set is not pairwise distinct")]
    AssetsNotDistinct,

    #[error("more than one non-native asset in transaction: {0} and {1}")]
    TooManyAssets(AssetId, AssetId),

    #[error("asset {0} missing from lookup table")]
    UnknownAsset(AssetId),

    #[error("verifier {0} missing from lookup table")]
    UnknownVerifier(ProgramId),

    #[error("malformed note plaintext: {0}")]
    MalformedPlaintext(&'static str),

    #[error("decrypted commitment {actual} does not match claimed {expected}")]
    CommitmentMismatch {
        expected: Commitment,
        actual: Commitment,
    },

    #[error("ciphertext of {len} bytes exceeds slot size {max}")]
    SlotOverflow { len: usize, max: usize },

    #[error("note encryption failed")]
    Encryption,

    #[error("merkle tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },
}

pub type Result<T> = std::result::Result<T, NoteError>;
