//! Account keys
//!
//! ```text
//! spending key ──┬── public key     = Poseidon(DOMAIN_PK, sk)
//!                ├── viewing key    = blake3_derive("tessera-viewing-key-v1", sk)
//!                └── encryption key = blake3_derive("tessera-encryption-key-v1", sk)  (X25519)
//! ```
//!
//! A watch-only account keeps the viewing and encryption secrets and the
//! public key. It can decrypt and track notes but cannot derive nullifiers.

use std::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{NoteError, Result};
use crate::field::{self, Fr};

const DOMAIN_PK: u64 = 0x504b; // "PK"
const VIEWING_CONTEXT: &str = "tessera-viewing-key-v1";
const ENCRYPTION_CONTEXT: &str = "tessera-encryption-key-v1";
const SYMMETRIC_CONTEXT: &str = "tessera-note-symmetric-v1";

/// Spending key - required to nullify notes.
#[derive(Clone)]
pub struct SpendingKey {
    key: [u8; 32],
}

impl SpendingKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// The key reduced into the field, as consumed by the circuit.
    pub fn as_field(&self) -> Fr {
        field::from_le_bytes(&self.key)
    }

    pub fn public_key(&self) -> [u8; 32] {
        let pk = field::poseidon(&[Fr::from(DOMAIN_PK), self.as_field()]);
        field::to_le_bytes(&pk)
    }

    pub fn viewing_key(&self) -> ViewingKey {
        ViewingKey {
            key: blake3::derive_key(VIEWING_CONTEXT, &self.key),
        }
    }

    pub fn encryption_secret(&self) -> StaticSecret {
        StaticSecret::from(blake3::derive_key(ENCRYPTION_CONTEXT, &self.key))
    }
}

impl fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpendingKey(..)")
    }
}

/// Viewing key - decrypts self-addressed notes.
#[derive(Clone)]
pub struct ViewingKey {
    key: [u8; 32],
}

impl ViewingKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// AEAD key for symmetric (self-addressed) note encryption.
    pub fn symmetric_key(&self) -> [u8; 32] {
        blake3::derive_key(SYMMETRIC_CONTEXT, &self.key)
    }
}

impl fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewingKey(..)")
    }
}

/// Public half of an account: what a sender needs to address a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// Shielded owner key the note commits to
    pub public_key: [u8; 32],
    /// X25519 key the note ciphertext is encrypted to
    pub encryption_key: [u8; 32],
}

/// Key material of one shielded account.
#[derive(Clone)]
pub struct Account {
    spending_key: Option<SpendingKey>,
    viewing_key: ViewingKey,
    encryption_secret: StaticSecret,
    public_key: [u8; 32],
}

impl Account {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_spending_key(SpendingKey::random(rng))
    }

    pub fn from_spending_key(spending_key: SpendingKey) -> Self {
        Self {
            viewing_key: spending_key.viewing_key(),
            encryption_secret: spending_key.encryption_secret(),
            public_key: spending_key.public_key(),
            spending_key: Some(spending_key),
        }
    }

    pub fn watch_only(
        viewing_key: ViewingKey,
        encryption_secret: [u8; 32],
        public_key: [u8; 32],
    ) -> Self {
        Self {
            spending_key: None,
            viewing_key,
            encryption_secret: StaticSecret::from(encryption_secret),
            public_key,
        }
    }

    /// Same account with the spending key dropped.
    pub fn to_watch_only(&self) -> Self {
        Self {
            spending_key: None,
            ..self.clone()
        }
    }

    pub fn is_watch_only(&self) -> bool {
        self.spending_key.is_none()
    }

    pub fn spending_key(&self) -> Result<&SpendingKey> {
        self.spending_key.as_ref().ok_or(NoteError::NoPrivateKey)
    }

    pub fn viewing_key(&self) -> &ViewingKey {
        &self.viewing_key
    }

    pub fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption_secret
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    pub fn encryption_public_key(&self) -> [u8; 32] {
        *PublicKey::from(&self.encryption_secret).as_bytes()
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            public_key: self.public_key,
            encryption_key: self.encryption_public_key(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("public_key", &hex::encode(self.public_key))
            .field("watch_only", &self.is_watch_only())
            .finish()
    }
}
