//! Prover-facing view of a finalized transaction.

use std::fmt;

use tessera_privacy::field::{self, Fr};
use tessera_privacy::{AssetSlot, Note};

use super::VerifierConfig;

/// Public inputs in the order the circuit declares them.
///
/// ```text
/// [ root, public_amount_token, integrity_hash, public_amount_fee,
///   mint_circuit, nullifiers.., leaves.. ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputs {
    pub root: Fr,
    /// External amount of the token slot
    pub public_amount_token: Fr,
    pub integrity_hash: Fr,
    /// External amount of the native slot, which carries the relayer fee
    pub public_amount_fee: Fr,
    pub mint_circuit: Fr,
    pub nullifiers: Vec<Fr>,
    pub leaves: Vec<Fr>,
}

impl PublicInputs {
    pub fn ordered(&self) -> Vec<Fr> {
        let mut out = Vec::with_capacity(5 + self.nullifiers.len() + self.leaves.len());
        out.extend([
            self.root,
            self.public_amount_token,
            self.integrity_hash,
            self.public_amount_fee,
            self.mint_circuit,
        ]);
        out.extend_from_slice(&self.nullifiers);
        out.extend_from_slice(&self.leaves);
        out
    }

    /// Big-endian encoding the prover consumes.
    pub fn to_be_bytes(&self) -> Vec<[u8; 32]> {
        self.ordered().iter().map(field::to_be_bytes).collect()
    }
}

/// Field encoding of one note's private data.
#[derive(Clone, PartialEq, Eq)]
pub struct NoteWitness {
    pub amounts: [Fr; 2],
    pub owner: Fr,
    pub blinding: Fr,
    pub asset_keys: [Fr; 2],
    pub app_data_hash: Fr,
    pub verifier_key: Fr,
}

impl From<&Note> for NoteWitness {
    fn from(note: &Note) -> Self {
        Self {
            amounts: AssetSlot::ALL.map(|s| note.amount(s).to_field()),
            owner: field::from_le_bytes(note.owner_pk()),
            blinding: field::from_le_bytes(note.blinding()),
            asset_keys: AssetSlot::ALL.map(|s| note.circuit_key(s)),
            app_data_hash: note
                .app_data_hash()
                .map(field::from_le_bytes)
                .unwrap_or_default(),
            verifier_key: note
                .verifier_tag()
                .map(|v| v.circuit_key())
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct InputWitness {
    pub note: NoteWitness,
    pub leaf_index: u64,
    pub path_elements: Vec<Fr>,
}

/// Everything the external prover needs. Holds the spending key, so its
/// `Debug` output is redacted.
#[derive(Clone)]
pub struct ProverWitness {
    pub verifier: VerifierConfig,
    pub public: PublicInputs,
    pub private_key: Fr,
    pub asset_keys: [Fr; 3],
    pub inputs: Vec<InputWitness>,
    pub outputs: Vec<NoteWitness>,
}

impl fmt::Debug for ProverWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProverWitness")
            .field("verifier", &self.verifier)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}
