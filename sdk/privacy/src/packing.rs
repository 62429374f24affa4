//! Fixed-slot packing of encrypted outputs.
//!
//! ```text
//! payload = slot_0 ‖ slot_1 ‖ ... ‖ slot_{n-1}          n = output count
//! slot_i  = ciphertext ‖ nonce ‖ zero pad                SLOT_SIZE bytes
//!           payload[i * SLOT_SIZE .. (i + 1) * SLOT_SIZE]
//! ```
//!
//! The log stores the payload as raw bytes with no length prefix, so slot
//! boundaries are positional. Leaf pair `k` of a transaction owns slots
//! `2k` (left) and `2k + 1` (right).

use crate::encryption::{ASYMMETRIC_CIPHERTEXT_LEN, EncryptedNote, NONCE_LEN};
use crate::error::{NoteError, Result};

pub const SLOT_SIZE: usize = 160;

const _: () = assert!(ASYMMETRIC_CIPHERTEXT_LEN + NONCE_LEN <= SLOT_SIZE);

/// Pack encrypted notes into consecutive slots.
pub fn pack_slots(notes: &[EncryptedNote]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(notes.len() * SLOT_SIZE);
    for note in notes {
        if note.len() > SLOT_SIZE {
            return Err(NoteError::SlotOverflow {
                len: note.len(),
                max: SLOT_SIZE,
            });
        }
        let start = payload.len();
        payload.extend_from_slice(&note.ciphertext);
        payload.extend_from_slice(&note.nonce);
        payload.resize(start + SLOT_SIZE, 0);
    }
    Ok(payload)
}

/// Byte range of slot `i`, or `None` when the payload is too short.
pub fn slot(payload: &[u8], i: usize) -> Option<&[u8]> {
    let start = i.checked_mul(SLOT_SIZE)?;
    payload.get(start..start.checked_add(SLOT_SIZE)?)
}

/// Left and right slots of leaf pair `pair`.
pub fn pair_slots(payload: &[u8], pair: usize) -> (Option<&[u8]>, Option<&[u8]>) {
    (slot(payload, 2 * pair), slot(payload, 2 * pair + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(fill: u8, len: usize) -> EncryptedNote {
        EncryptedNote {
            ciphertext: vec![fill; len],
            nonce: [fill; NONCE_LEN],
        }
    }

    #[test]
    fn test_slots_have_fixed_size() {
        let payload = pack_slots(&[enc(1, 111), enc(2, 143)]).unwrap();
        assert_eq!(payload.len(), 2 * SLOT_SIZE);

        let s0 = slot(&payload, 0).unwrap();
        assert_eq!(&s0[..111], &[1u8; 111][..]);
        assert_eq!(&s0[111..123], &[1u8; NONCE_LEN][..]);
        assert!(s0[123..].iter().all(|b| *b == 0), "slot should be zero padded");

        let s1 = slot(&payload, 1).unwrap();
        assert_eq!(s1[0], 2);
        assert!(slot(&payload, 2).is_none());
    }

    #[test]
    fn test_oversized_ciphertext_rejected() {
        let err = pack_slots(&[enc(1, SLOT_SIZE)]).unwrap_err();
        assert_eq!(
            err,
            NoteError::SlotOverflow {
                len: SLOT_SIZE + NONCE_LEN,
                max: SLOT_SIZE
            }
        );
    }

    #[test]
    fn test_pair_slots() {
        let payload = pack_slots(&[enc(1, 10), enc(2, 10), enc(3, 10), enc(4, 10)]).unwrap();
        let (l, r) = pair_slots(&payload, 1);
        assert_eq!(l.unwrap()[0], 3);
        assert_eq!(r.unwrap()[0], 4);
        assert_eq!(pair_slots(&payload, 2), (None, None));
    }
}
