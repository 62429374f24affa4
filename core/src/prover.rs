//! Proof generation seam.
//!
//! The prover itself is external. The client only hands over a
//! [`ProverWitness`] and checks that what comes back is shaped like a proof
//! over the same public inputs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use crate::error::ProofError;
use crate::params::ProverWitness;

/// Groth16 proof size on the wire
pub const PROOF_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOutput {
    pub proof_bytes: Vec<u8>,
    /// Public signals as the prover saw them, big-endian
    pub public_signals: Vec<[u8; 32]>,
}

pub trait Prover: Send + Sync {
    fn prove(
        &self,
        witness: &ProverWitness,
    ) -> impl Future<Output = Result<ProofOutput, ProofError>> + Send;
}

/// Reject proofs of the wrong length or over different public inputs.
pub fn check_proof(output: &ProofOutput, expected: &[[u8; 32]]) -> Result<(), ProofError> {
    if output.proof_bytes.len() != PROOF_LEN {
        return Err(ProofError::Invalid(format!(
            "proof is {} bytes, expected {PROOF_LEN}",
            output.proof_bytes.len()
        )));
    }
    if output.public_signals.len() != expected.len() {
        return Err(ProofError::Invalid(format!(
            "{} public signals, expected {}",
            output.public_signals.len(),
            expected.len()
        )));
    }
    if let Some(i) = output
        .public_signals
        .iter()
        .zip(expected)
        .position(|(got, want)| got != want)
    {
        return Err(ProofError::Invalid(format!("public signal {i} differs")));
    }
    Ok(())
}

/// Deterministic stand-in prover for tests and local runs.
#[derive(Debug, Default)]
pub struct MockProver {
    calls: AtomicUsize,
    tamper_next: AtomicBool,
    reject_next: AtomicBool,
}

impl MockProver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Flip a public signal in the next proof.
    pub fn tamper_next(&self) {
        self.tamper_next.store(true, Ordering::SeqCst);
    }

    pub fn reject_next(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    fn mock_proof(witness: &ProverWitness) -> ProofOutput {
        let public_signals = witness.public.to_be_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(witness.verifier.name().as_bytes());
        for signal in &public_signals {
            hasher.update(signal);
        }
        let hash = hasher.finalize();

        let mut proof_bytes = Vec::with_capacity(PROOF_LEN);
        while proof_bytes.len() < PROOF_LEN {
            proof_bytes.extend_from_slice(hash.as_bytes());
        }
        proof_bytes.truncate(PROOF_LEN);

        ProofOutput {
            proof_bytes,
            public_signals,
        }
    }
}

impl Prover for MockProver {
    async fn prove(&self, witness: &ProverWitness) -> Result<ProofOutput, ProofError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(ProofError::Rejected("mock prover refused".to_string()));
        }

        let mut output = Self::mock_proof(witness);
        if self.tamper_next.swap(false, Ordering::SeqCst) {
            if let Some(first) = output.public_signals.first_mut() {
                first[31] ^= 1;
            }
        }
        debug!(verifier = witness.verifier.name(), "mock proof generated");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_proof_length() {
        let output = ProofOutput {
            proof_bytes: vec![0u8; 10],
            public_signals: vec![],
        };
        assert!(matches!(check_proof(&output, &[]), Err(ProofError::Invalid(_))));
    }

    #[test]
    fn test_check_proof_signals() {
        let expected = vec![[1u8; 32], [2u8; 32]];
        let mut output = ProofOutput {
            proof_bytes: vec![0u8; PROOF_LEN],
            public_signals: expected.clone(),
        };
        assert!(check_proof(&output, &expected).is_ok());

        output.public_signals[1][0] = 9;
        assert_eq!(
            check_proof(&output, &expected),
            Err(ProofError::Invalid("public signal 1 differs".to_string()))
        );

        output.public_signals.pop();
        assert!(check_proof(&output, &expected).is_err(), "count must match");
    }
}
