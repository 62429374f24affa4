//! Choosing which spendable notes feed a transaction.

use tracing::debug;

use tessera_balance::{Balance, InboxBalance};
use tessera_privacy::{AssetId, AssetSlot, Commitment, Note};

use crate::error::ParameterError;

/// Hard cap on inputs of one merge transaction.
pub const MERGE_CAP: usize = 10;

fn amount(note: &Note, slot: AssetSlot) -> u128 {
    u128::from(note.amount(slot).as_u64())
}

/// Pick the fewest largest notes covering `token_needed` of `asset` and
/// `native_needed` of the native asset.
pub fn select_spend(
    balance: &Balance,
    asset: AssetId,
    token_needed: u64,
    native_needed: u64,
    capacity: usize,
) -> Result<Vec<Note>, ParameterError> {
    let mut selected: Vec<Note> = Vec::new();
    let mut native_sum = 0u128;
    let mut token_sum = 0u128;

    if !asset.is_native() && token_needed > 0 {
        let candidates = balance.spendable_notes(&asset);
        for note in &candidates {
            if token_sum >= u128::from(token_needed) {
                break;
            }
            token_sum += amount(note, AssetSlot::Token);
            native_sum += amount(note, AssetSlot::Native);
            selected.push((*note).clone());
        }
        if token_sum < u128::from(token_needed) {
            return Err(ParameterError::InsufficientFunds {
                asset,
                required: u128::from(token_needed),
                available: token_sum,
            });
        }
    }

    let natives = balance.spendable_notes(&AssetId::NATIVE);
    for note in &natives {
        if native_sum >= u128::from(native_needed) {
            break;
        }
        native_sum += amount(note, AssetSlot::Native);
        selected.push((*note).clone());
    }
    if native_sum < u128::from(native_needed) {
        return Err(ParameterError::InsufficientFunds {
            asset: AssetId::NATIVE,
            required: u128::from(native_needed),
            available: native_sum,
        });
    }

    if selected.len() > capacity {
        return Err(ParameterError::TooManyCommitments {
            count: selected.len(),
            capacity,
        });
    }
    Ok(selected)
}

/// Notes already held for `asset`; token merges also sweep native notes.
fn existing_notes(balance: &Balance, asset: &AssetId) -> Vec<Note> {
    let mut notes: Vec<Note> = Vec::new();
    if !asset.is_native() {
        notes.extend(balance.spendable_notes(asset).into_iter().cloned());
    }
    notes.extend(balance.spendable_notes(&AssetId::NATIVE).into_iter().cloned());
    notes
}

/// Existing notes followed by every inbox note of `asset`, largest first,
/// truncated to `cap`.
pub fn merge_all(
    balance: &Balance,
    inbox: &InboxBalance,
    asset: AssetId,
    cap: usize,
) -> Result<Vec<Note>, ParameterError> {
    let inbox_notes = inbox.spendable_notes(&asset);
    if inbox_notes.is_empty() {
        return Err(ParameterError::EmptyInbox(asset));
    }

    let mut inputs = existing_notes(balance, &asset);
    inputs.extend(inbox_notes.into_iter().cloned());
    if inputs.len() > cap {
        debug!(available = inputs.len(), cap, "truncating merge inputs");
        inputs.truncate(cap);
    }
    Ok(inputs)
}

/// Existing notes of `asset` plus the named inbox notes. Exceeding `cap` is
/// an error, never a truncation.
pub fn merge_commitments(
    balance: &Balance,
    inbox: &InboxBalance,
    asset: AssetId,
    commitments: &[Commitment],
    cap: usize,
) -> Result<Vec<Note>, ParameterError> {
    if commitments.is_empty() {
        return Err(ParameterError::NoCommitmentsProvided);
    }
    let inbox_balance = inbox
        .token_balance(&asset)
        .filter(|b| !b.spendable().is_empty())
        .ok_or(ParameterError::EmptyInbox(asset))?;

    let mut inputs: Vec<Note> = balance.spendable_notes(&asset).into_iter().cloned().collect();
    for commitment in commitments {
        let note = inbox_balance
            .spendable()
            .get(commitment)
            .ok_or(ParameterError::CommitmentNotFound(*commitment))?;
        inputs.push(note.clone());
    }

    if inputs.len() > cap {
        return Err(ParameterError::TooManyCommitments {
            count: inputs.len(),
            capacity: cap,
        });
    }
    Ok(inputs)
}
