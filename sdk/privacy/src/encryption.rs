//! Note Encryption
//!
//! Two modes, chosen when an output note is constructed:
//!
//! ```text
//! Symmetric (self-addressed):
//!   key        = blake3_derive("tessera-note-symmetric-v1", viewing_key)
//!   ciphertext = ChaCha20-Poly1305(key, nonce, plaintext)             111 bytes
//!
//! Asymmetric (recipient-addressed):
//!   1. Sender generates ephemeral keypair (epk, esk)
//!   2. Shared secret = ECDH(esk, recipient_encryption_key)
//!   3. key = blake3_derive("tessera-note-v1", shared ‖ epk)
//!   4. ciphertext = epk ‖ ChaCha20-Poly1305(key, nonce, plaintext)    143 bytes
//!
//! Plaintext (95 bytes):
//!   blinding[0..31] ‖ amount_0 ‖ amount_1 ‖ asset_index ‖ verifier_index ‖ app_data_hash
//!                      u64 LE     u64 LE     u64 LE        u64 LE           32 bytes
//! ```
//!
//! Both modes emit fixed-length ciphertexts so every note fits one slot.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::amount::AssetSlot;
use crate::asset::LookupTables;
use crate::commitment::Commitment;
use crate::error::{NoteError, Result};
use crate::keys::Account;
use crate::note::{BLINDING_BYTES, Note};

pub const PLAINTEXT_LEN: usize = BLINDING_BYTES + 4 * 8 + 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const EPK_LEN: usize = 32;
pub const SYMMETRIC_CIPHERTEXT_LEN: usize = PLAINTEXT_LEN + TAG_LEN;
pub const ASYMMETRIC_CIPHERTEXT_LEN: usize = EPK_LEN + SYMMETRIC_CIPHERTEXT_LEN;

const NOTE_KEY_CONTEXT: &str = "tessera-note-v1";

/// How an output note is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// To the sender's own viewing key
    Symmetric,
    /// To a recipient's X25519 encryption key
    Asymmetric { recipient: [u8; 32] },
}

/// Which key a scanner tries against a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionMode {
    Symmetric,
    Asymmetric,
}

impl DecryptionMode {
    pub fn ciphertext_len(self) -> usize {
        match self {
            DecryptionMode::Symmetric => SYMMETRIC_CIPHERTEXT_LEN,
            DecryptionMode::Asymmetric => ASYMMETRIC_CIPHERTEXT_LEN,
        }
    }
}

/// Ciphertext and nonce of one note, before slot padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedNote {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl EncryptedNote {
    pub fn len(&self) -> usize {
        self.ciphertext.len() + NONCE_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

pub fn encrypt_note<R: RngCore + CryptoRng>(
    note: &Note,
    mode: EncryptionMode,
    sender: &Account,
    tables: &LookupTables,
    rng: &mut R,
) -> Result<EncryptedNote> {
    let plaintext = encode_plaintext(note, tables)?;

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let ciphertext = match mode {
        EncryptionMode::Symmetric => {
            seal(&sender.viewing_key().symmetric_key(), &nonce, &plaintext)?
        }
        EncryptionMode::Asymmetric { recipient } => {
            let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
            let ephemeral_pk = PublicKey::from(&ephemeral_secret);
            let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(recipient));
            let key = derive_note_key(shared.as_bytes(), ephemeral_pk.as_bytes());

            let mut out = Vec::with_capacity(ASYMMETRIC_CIPHERTEXT_LEN);
            out.extend_from_slice(ephemeral_pk.as_bytes());
            out.extend_from_slice(&seal(&key, &nonce, &plaintext)?);
            out
        }
    };

    Ok(EncryptedNote { ciphertext, nonce })
}

/// Try to recover a note from one packed slot.
///
/// Returns `Ok(None)` when the slot is not addressed to `account`. A slot that
/// authenticates but does not reproduce `claimed` is an integrity error.
pub fn decrypt_note(
    slot: &[u8],
    mode: DecryptionMode,
    account: &Account,
    tables: &LookupTables,
    claimed: &Commitment,
    index: u64,
) -> Result<Option<Note>> {
    let ct_len = mode.ciphertext_len();
    if slot.len() < ct_len + NONCE_LEN {
        return Ok(None);
    }
    let (ciphertext, rest) = slot.split_at(ct_len);
    let nonce = &rest[..NONCE_LEN];

    let opened = match mode {
        DecryptionMode::Symmetric => {
            open(&account.viewing_key().symmetric_key(), nonce, ciphertext)
        }
        DecryptionMode::Asymmetric => {
            let (epk, sealed) = ciphertext.split_at(EPK_LEN);
            let mut epk_bytes = [0u8; EPK_LEN];
            epk_bytes.copy_from_slice(epk);
            let shared = account
                .encryption_secret()
                .diffie_hellman(&PublicKey::from(epk_bytes));
            open(&derive_note_key(shared.as_bytes(), &epk_bytes), nonce, sealed)
        }
    };
    let Some(plaintext) = opened else {
        return Ok(None);
    };

    let note = decode_plaintext(&plaintext, account.public_key(), tables, index)?;
    let actual = note.commitment();
    if &actual != claimed {
        return Err(NoteError::CommitmentMismatch {
            expected: *claimed,
            actual,
        });
    }
    Ok(Some(note))
}

fn seal(key: &[u8; 32], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| NoteError::Encryption)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| NoteError::Encryption)
}

fn open(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).ok()?;
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

/// Derive encryption key from shared secret
fn derive_note_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(NOTE_KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

fn encode_plaintext(note: &Note, tables: &LookupTables) -> Result<[u8; PLAINTEXT_LEN]> {
    let asset_index = tables.asset_index(&note.asset(AssetSlot::Token))?;
    let verifier_index = tables.verifier_index(note.verifier_tag())?;

    let mut out = [0u8; PLAINTEXT_LEN];
    let mut cursor = 0;
    let mut put = |bytes: &[u8]| {
        out[cursor..cursor + bytes.len()].copy_from_slice(bytes);
        cursor += bytes.len();
    };
    put(&note.blinding()[..BLINDING_BYTES]);
    put(&note.amount(AssetSlot::Native).as_u64().to_le_bytes());
    put(&note.amount(AssetSlot::Token).as_u64().to_le_bytes());
    put(&asset_index.to_le_bytes());
    put(&verifier_index.to_le_bytes());
    put(note.app_data_hash().unwrap_or(&[0u8; 32]));
    Ok(out)
}

fn decode_plaintext(
    bytes: &[u8],
    owner_pk: [u8; 32],
    tables: &LookupTables,
    index: u64,
) -> Result<Note> {
    if bytes.len() != PLAINTEXT_LEN {
        return Err(NoteError::MalformedPlaintext("unexpected length"));
    }
    let (blinding_bytes, rest) = bytes.split_at(BLINDING_BYTES);
    let (words, app_data) = rest.split_at(32);
    let word = |i: usize| {
        let mut w = [0u8; 8];
        w.copy_from_slice(&words[i * 8..(i + 1) * 8]);
        u64::from_le_bytes(w)
    };

    let mut blinding = [0u8; 32];
    blinding[..BLINDING_BYTES].copy_from_slice(blinding_bytes);
    let asset = tables
        .asset_at(word(2))
        .ok_or(NoteError::MalformedPlaintext("asset index out of range"))?;
    let verifier = tables
        .verifier_at(word(3))
        .ok_or(NoteError::MalformedPlaintext("verifier index out of range"))?;
    let mut app_data_hash = [0u8; 32];
    app_data_hash.copy_from_slice(app_data);

    Note::builder(owner_pk)
        .native(word(0))
        .token(asset, word(1))
        .app_data(Some(app_data_hash), verifier)
        .index(index)
        .recover(blinding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn slot_bytes(enc: &EncryptedNote) -> Vec<u8> {
        let mut bytes = enc.ciphertext.clone();
        bytes.extend_from_slice(&enc.nonce);
        bytes
    }

    #[test]
    fn test_fixed_ciphertext_lengths() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let note = Note::builder(account.public_key())
            .native(1)
            .build(&mut OsRng)
            .unwrap();

        let sym = encrypt_note(&note, EncryptionMode::Symmetric, &account, &tables, &mut OsRng)
            .unwrap();
        assert_eq!(sym.ciphertext.len(), SYMMETRIC_CIPHERTEXT_LEN);

        let mode = EncryptionMode::Asymmetric {
            recipient: account.encryption_public_key(),
        };
        let asym = encrypt_note(&note, mode, &account, &tables, &mut OsRng).unwrap();
        assert_eq!(asym.ciphertext.len(), ASYMMETRIC_CIPHERTEXT_LEN);
    }

    #[test]
    fn test_wrong_key_is_not_mine() {
        let owner = Account::random(&mut OsRng);
        let other = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let note = Note::builder(owner.public_key())
            .native(1000)
            .build(&mut OsRng)
            .unwrap();

        let enc = encrypt_note(&note, EncryptionMode::Symmetric, &owner, &tables, &mut OsRng)
            .unwrap();
        let result = decrypt_note(
            &slot_bytes(&enc),
            DecryptionMode::Symmetric,
            &other,
            &tables,
            &note.commitment(),
            0,
        );
        assert_eq!(result, Ok(None), "wrong key should not decrypt");
    }

    #[test]
    fn test_short_slot_is_not_mine() {
        let account = Account::random(&mut OsRng);
        let result = decrypt_note(
            &[0u8; 10],
            DecryptionMode::Asymmetric,
            &account,
            &LookupTables::default(),
            &Commitment([0u8; 32]),
            0,
        );
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_commitment_mismatch_is_fatal() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let note = Note::builder(account.public_key())
            .native(1000)
            .build(&mut OsRng)
            .unwrap();

        let enc = encrypt_note(&note, EncryptionMode::Symmetric, &account, &tables, &mut OsRng)
            .unwrap();
        let wrong = Commitment([9u8; 32]);
        let err = decrypt_note(
            &slot_bytes(&enc),
            DecryptionMode::Symmetric,
            &account,
            &tables,
            &wrong,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, NoteError::CommitmentMismatch { expected, .. } if expected == wrong));
    }

    #[test]
    fn test_tampered_ciphertext_is_not_mine() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let note = Note::builder(account.public_key())
            .native(1000)
            .build(&mut OsRng)
            .unwrap();

        let enc = encrypt_note(&note, EncryptionMode::Symmetric, &account, &tables, &mut OsRng)
            .unwrap();
        let mut bytes = slot_bytes(&enc);
        bytes[0] ^= 0x01;

        let result = decrypt_note(
            &bytes,
            DecryptionMode::Symmetric,
            &account,
            &tables,
            &note.commitment(),
            0,
        );
        assert_eq!(result, Ok(None));
    }
}
