//! State Synchronizer
//!
//! ```text
//!  indexed log ──► sort by first leaf ──► skip seen ──► decrypt + classify
//!                                                          │
//!         ┌────────────────────────────────────────────────┘
//!         ▼
//!  decrypt left, then right slot of each pair ──► classify (concurrent reads)
//!         │                                           │
//!         ▼                                           ▼
//!  integrity failures reported             balance.insert_note (serial)
//!
//!  after the log: root cross-check ──► second pass ──► native total
//! ```

use futures::future::join_all;
use tracing::{debug, info, warn};

use tessera_balance::{Balance, InboxBalance, NoteState};
use tessera_privacy::{
    Account, AssetId, Commitment, DecryptionMode, LookupTables, MerkleTree, Note, RootHistory,
    decrypt_note, pair_slots,
};

use crate::error::SyncError;
use crate::rpc::{IndexedTransaction, Indexer, LedgerRpc};

/// Local roots kept for matching a ledger root that trails the log
pub const ROOT_HISTORY_SIZE: usize = 100;

type Result<T> = std::result::Result<T, SyncError>;

/// How far one view of the log has been replayed: the local tree and the
/// roots it has passed through.
pub struct SyncCursor {
    tree: MerkleTree,
    roots: RootHistory,
}

impl SyncCursor {
    pub fn new() -> Self {
        let tree = MerkleTree::new();
        let mut roots = RootHistory::new(ROOT_HISTORY_SIZE);
        roots.push(tree.root());
        Self { tree, roots }
    }

    pub fn next_leaf_index(&self) -> u64 {
        self.tree.next_position()
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn root(&self) -> [u8; 32] {
        self.tree.root()
    }

    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        self.roots.is_valid(root)
    }

    /// Append all of `leaves` or none of them.
    fn append(&mut self, leaves: &[Commitment]) -> Result<()> {
        let capacity = self.tree.capacity();
        if self.tree.next_position() + leaves.len() as u64 > capacity {
            return Err(SyncError::TreeFull { capacity });
        }
        for leaf in leaves {
            self.tree
                .insert(leaf)
                .map_err(|_| SyncError::TreeFull { capacity })?;
        }
        self.roots.push(self.tree.root());
        Ok(())
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub transactions_scanned: usize,
    pub leaves_added: u64,
    /// Non-zero notes decrypted in this run
    pub notes_found: usize,
    /// Notes that were new to the balance
    pub notes_inserted: usize,
    /// Notes moved to spent by the post-scan nullifier re-check
    pub promoted_in_second_pass: usize,
    /// Slots that authenticated but did not match their leaf. The scan
    /// continues past them.
    pub integrity_failures: Vec<SyncError>,
    /// Whether the ledger's root matches one the local tree passed through
    pub root_verified: bool,
}

/// A decrypted note and the left leaf of its pair.
struct Candidate {
    left_leaf: Commitment,
    note: Note,
}

pub struct Synchronizer<'a, I, L> {
    indexer: &'a I,
    ledger: &'a L,
    account: &'a Account,
    tables: &'a LookupTables,
}

impl<'a, I: Indexer, L: LedgerRpc> Synchronizer<'a, I, L> {
    pub fn new(indexer: &'a I, ledger: &'a L, account: &'a Account, tables: &'a LookupTables) -> Self {
        Self {
            indexer,
            ledger,
            account,
            tables,
        }
    }

    /// Replay the log into `balance`, picking up self-addressed notes.
    pub async fn sync_balance(&self, cursor: &mut SyncCursor, balance: &mut Balance) -> Result<SyncReport> {
        self.sync(DecryptionMode::Symmetric, cursor, balance).await
    }

    /// Replay the log into `inbox`, picking up notes sent by others.
    pub async fn sync_inbox(&self, cursor: &mut SyncCursor, inbox: &mut InboxBalance) -> Result<SyncReport> {
        let report = self.sync(DecryptionMode::Asymmetric, cursor, inbox).await?;
        let count = inbox.recount();
        debug!(count, "inbox recounted");
        Ok(report)
    }

    async fn sync(
        &self,
        mode: DecryptionMode,
        cursor: &mut SyncCursor,
        balance: &mut Balance,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut log = self.indexer.indexed_transactions().await?;
        log.sort_by_key(|tx| tx.first_leaf_index);

        for tx in &log {
            let expected = cursor.next_leaf_index();
            let end = tx.first_leaf_index + tx.leaves.len() as u64;
            if end <= expected {
                continue;
            }
            if tx.first_leaf_index != expected {
                return Err(SyncError::LeafGap {
                    expected,
                    found: tx.first_leaf_index,
                });
            }
            if tx.leaves.len() % 2 != 0 {
                return Err(SyncError::OddLeafCount {
                    first_leaf_index: tx.first_leaf_index,
                    count: tx.leaves.len(),
                });
            }

            // Classify before advancing the cursor: a failed read leaves the
            // transaction unseen, so the next sync scans it again.
            let candidates = self.decrypt_transaction(tx, mode, &mut report);
            let states = join_all(candidates.iter().map(|c| self.classify(c)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;

            cursor.append(&tx.leaves)?;
            report.transactions_scanned += 1;
            report.leaves_added += tx.leaves.len() as u64;
            report.notes_found += candidates.len();

            for (candidate, state) in candidates.into_iter().zip(states) {
                let commitment = candidate.note.commitment();
                let index = candidate.note.index();
                if balance.insert_note(commitment, candidate.note, state)? {
                    report.notes_inserted += 1;
                    info!(?index, %commitment, ?state, "note classified");
                }
            }
        }

        let ledger_root = self.ledger.latest_root().await?;
        report.root_verified = cursor.is_known_root(&ledger_root);
        if !report.root_verified {
            warn!(
                local = %hex::encode(cursor.root()),
                ledger = %hex::encode(ledger_root),
                "ledger root not among local roots"
            );
        }

        report.promoted_in_second_pass = self.recheck(cursor, balance).await?;
        let total = balance.recompute_native_total();

        info!(
            transactions = report.transactions_scanned,
            found = report.notes_found,
            inserted = report.notes_inserted,
            promoted = report.promoted_in_second_pass,
            total_native = %total,
            "sync complete"
        );
        Ok(report)
    }

    /// Left slot strictly before right slot, pair by pair.
    fn decrypt_transaction(
        &self,
        tx: &IndexedTransaction,
        mode: DecryptionMode,
        report: &mut SyncReport,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (pair_index, pair) in tx.leaves.chunks(2).enumerate() {
            let (left, right) = pair_slots(&tx.encrypted_payload, pair_index);
            let left_index = tx.first_leaf_index + 2 * pair_index as u64;

            for (offset, slot) in [left, right].into_iter().enumerate() {
                let Some(slot) = slot else {
                    continue;
                };
                let index = left_index + offset as u64;
                match decrypt_note(slot, mode, self.account, self.tables, &pair[offset], index) {
                    Ok(Some(note)) if !note.is_zero() => candidates.push(Candidate {
                        left_leaf: pair[0],
                        note,
                    }),
                    Ok(_) => {}
                    Err(source) => {
                        warn!(index, error = %source, "slot failed integrity check");
                        report.integrity_failures.push(SyncError::Integrity { index, source });
                    }
                }
            }
        }
        candidates
    }

    async fn classify(&self, candidate: &Candidate) -> Result<NoteState> {
        self.state_on_ledger(&candidate.note, &candidate.left_leaf).await
    }

    /// Spent when its nullifier exists, queued while its pair waits for the
    /// tree, spendable otherwise. Watch-only accounts cannot derive
    /// nullifiers and never see `Spent`.
    async fn state_on_ledger(&self, note: &Note, left_leaf: &Commitment) -> Result<NoteState> {
        if !self.account.is_watch_only() {
            let nullifier = note.nullifier(self.account).map_err(|source| SyncError::Integrity {
                index: note.index().unwrap_or_default(),
                source,
            })?;
            if self.ledger.nullifier_exists(&nullifier).await? {
                return Ok(NoteState::Spent);
            }
        }
        if self.ledger.queued_leaves_exist(left_leaf).await? {
            return Ok(NoteState::Queued);
        }
        Ok(NoteState::Spendable)
    }

    /// Re-read the ledger state of every spendable or queued note. A note
    /// can be seen spendable before the transaction spending it is scanned,
    /// and a queued note settles after its transaction was scanned.
    async fn recheck(&self, cursor: &SyncCursor, balance: &mut Balance) -> Result<usize> {
        let tracked: Vec<(NoteState, Commitment, Note)> = balance
            .token_balances()
            .values()
            .chain(
                balance
                    .program_balances()
                    .values()
                    .flat_map(|p| p.token_balances().values()),
            )
            .flat_map(|b| {
                let spendable = b.spendable().iter().map(|(c, n)| (NoteState::Spendable, *c, n.clone()));
                let queued = b.queued().iter().map(|(c, n)| (NoteState::Queued, *c, n.clone()));
                spendable.chain(queued)
            })
            .collect();

        let states = join_all(tracked.iter().map(|(_, commitment, note)| {
            let left_leaf = note
                .index()
                .and_then(|i| cursor.tree().get(i & !1))
                .unwrap_or(*commitment);
            async move { self.state_on_ledger(note, &left_leaf).await }
        }))
        .await;

        let mut promoted = 0;
        for ((old, commitment, note), new) in tracked.into_iter().zip(states) {
            let new = new?;
            if new == old {
                continue;
            }
            match (old, new) {
                (NoteState::Spendable, NoteState::Spent) if !note.is_app_note() => {
                    let asset: AssetId = note.balance_asset();
                    balance.promote_to_spent(&asset, &commitment)?;
                }
                (NoteState::Spendable, NoteState::Queued) => continue,
                _ => {
                    balance.insert_note(commitment, note, new)?;
                }
            }
            if new == NoteState::Spent {
                promoted += 1;
                debug!(%commitment, "late nullifier, note promoted to spent");
            }
        }
        Ok(promoted)
    }
}
