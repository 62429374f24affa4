//! Integrity hash binding fee, accounts and encrypted outputs to the proof.
//!
//! ```text
//! keccak256( recipient_token ‖ fee_recipient ‖ payer ‖ fee_le ‖ encrypted ‖ message? ) mod p
//! ```

use ark_ff::PrimeField;
use sha3::{Digest, Keccak256};

use tessera_privacy::{Address, Fr};

pub struct IntegrityInputs<'a> {
    pub recipient_token: Address,
    pub fee_recipient: Address,
    pub payer: Address,
    pub fee: u64,
    pub encrypted_outputs: &'a [u8],
    pub message: Option<&'a [u8]>,
}

pub fn integrity_hash(inputs: &IntegrityInputs<'_>) -> Fr {
    let mut hasher = Keccak256::new();
    hasher.update(inputs.recipient_token.as_bytes());
    hasher.update(inputs.fee_recipient.as_bytes());
    hasher.update(inputs.payer.as_bytes());
    hasher.update(inputs.fee.to_le_bytes());
    hasher.update(inputs.encrypted_outputs);
    if let Some(message) = inputs.message {
        hasher.update(message);
    }
    Fr::from_be_bytes_mod_order(&hasher.finalize())
}
