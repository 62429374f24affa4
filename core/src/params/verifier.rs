//! Verifier circuits a spend can be proven against.

use tessera_config::VerifierToml;
use tessera_privacy::{Address, ProgramId};

/// Closed set of circuits. Each fixes the input/output arity the prover
/// expects and which optional fields it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifierConfig {
    /// General purpose transfers
    TwoInTwoOut,
    /// Merges of up to ten notes
    TenInTwoOut,
    /// Transfers carrying app data for a verifier program
    FourInFourOut,
    /// Two-in-two-out with an attached message
    Storage,
}

impl VerifierConfig {
    pub const fn inputs(self) -> usize {
        match self {
            VerifierConfig::TwoInTwoOut | VerifierConfig::Storage => 2,
            VerifierConfig::TenInTwoOut => 10,
            VerifierConfig::FourInFourOut => 4,
        }
    }

    pub const fn outputs(self) -> usize {
        match self {
            VerifierConfig::FourInFourOut => 4,
            _ => 2,
        }
    }

    pub const fn requires_message(self) -> bool {
        matches!(self, VerifierConfig::Storage)
    }

    pub const fn supports_app_data(self) -> bool {
        matches!(self, VerifierConfig::FourInFourOut)
    }

    pub const fn name(self) -> &'static str {
        match self {
            VerifierConfig::TwoInTwoOut => "verifier-zero",
            VerifierConfig::TenInTwoOut => "verifier-one",
            VerifierConfig::FourInFourOut => "verifier-two",
            VerifierConfig::Storage => "verifier-storage",
        }
    }

    /// On-ledger program that verifies proofs for this circuit.
    pub fn program_id(self) -> ProgramId {
        let seed = format!("tessera-{}", self.name());
        ProgramId(Address(*blake3::hash(seed.as_bytes()).as_bytes()))
    }
}

impl From<VerifierToml> for VerifierConfig {
    fn from(v: VerifierToml) -> Self {
        match v {
            VerifierToml::TwoInTwoOut => VerifierConfig::TwoInTwoOut,
            VerifierToml::TenInTwoOut => VerifierConfig::TenInTwoOut,
            VerifierToml::FourInFourOut => VerifierConfig::FourInFourOut,
            VerifierToml::Storage => VerifierConfig::Storage,
        }
    }
}
