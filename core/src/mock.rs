//! In-memory ledger and relayer for tests and local runs.
//!
//! A submitted transaction lands in two steps, as on the real ledger: its
//! nullifiers and leaves are recorded at once and its leaves sit in a queue
//! until [`Indexer::update_ledger_view`] moves them into the tree.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use tessera_privacy::{Address, Commitment, MerkleTree, Nullifier};

use crate::error::RelayerError;
use crate::rpc::{
    IndexedTransaction, Indexer, LedgerRpc, TransactionEnvelope, TxResult, derive_account,
};

const NULLIFIER_SEED: &[u8] = b"nullifier";
const QUEUED_LEAVES_SEED: &[u8] = b"leaves";

struct LedgerState {
    accounts: HashSet<Address>,
    tree: MerkleTree,
    /// Leaves recorded but not yet in the tree
    queued: Vec<Commitment>,
    root: [u8; 32],
    recency: u64,
    failing_reads: u32,
}

/// Ledger accounts, the on-ledger tree and its published root.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        let tree = MerkleTree::new();
        let root = tree.root();
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                accounts: HashSet::new(),
                tree,
                queued: Vec::new(),
                root,
                recency: 0,
                failing_reads: 0,
            })),
        }
    }

    pub async fn add_nullifier(&self, nullifier: &Nullifier) {
        let address = self.nullifier_account(nullifier);
        self.state.lock().await.accounts.insert(address);
    }

    /// Record leaves as queued; their left leaves mark the queue.
    pub async fn queue_leaves(&self, leaves: &[Commitment]) {
        let mut state = self.state.lock().await;
        for pair in leaves.chunks(2) {
            state.accounts.insert(derive_account(QUEUED_LEAVES_SEED, &pair[0].0));
        }
        state.queued.extend_from_slice(leaves);
    }

    /// Move queued leaves into the tree and publish the new root.
    pub async fn flush_queue(&self) -> usize {
        let mut state = self.state.lock().await;
        let queued = std::mem::take(&mut state.queued);
        for pair in queued.chunks(2) {
            state
                .accounts
                .remove(&derive_account(QUEUED_LEAVES_SEED, &pair[0].0));
        }
        for leaf in &queued {
            if let Err(err) = state.tree.insert(leaf) {
                warn!(%err, "dropping queued leaves");
                break;
            }
        }
        state.root = state.tree.root();
        queued.len()
    }

    /// Append leaves straight into the tree and publish the new root.
    pub async fn append_leaves(&self, leaves: &[Commitment]) {
        let mut state = self.state.lock().await;
        for leaf in leaves {
            if let Err(err) = state.tree.insert(leaf) {
                warn!(%err, "dropping appended leaves");
                break;
            }
        }
        state.root = state.tree.root();
    }

    pub async fn publish_root(&self, root: [u8; 32]) {
        self.state.lock().await.root = root;
    }

    pub async fn root(&self) -> [u8; 32] {
        self.state.lock().await.root
    }

    /// Number of leaves recorded, queued ones included.
    pub async fn leaf_count(&self) -> u64 {
        let state = self.state.lock().await;
        state.tree.next_position() + state.queued.len() as u64
    }

    /// Fail the next `n` reads with a transport error.
    pub async fn fail_next_reads(&self, n: u32) {
        self.state.lock().await.failing_reads = n;
    }

    async fn read<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> Result<T, RelayerError> {
        let mut state = self.state.lock().await;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(RelayerError::Transport("ledger rpc unreachable".to_string()));
        }
        Ok(f(&mut state))
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerRpc for MockLedger {
    async fn account_exists(&self, address: Address) -> Result<bool, RelayerError> {
        self.read(|s| s.accounts.contains(&address)).await
    }

    async fn latest_root(&self) -> Result<[u8; 32], RelayerError> {
        self.read(|s| s.root).await
    }

    async fn recency_token(&self) -> Result<String, RelayerError> {
        self.read(|s| {
            s.recency += 1;
            format!("recency-{}", s.recency)
        })
        .await
    }

    fn nullifier_account(&self, nullifier: &Nullifier) -> Address {
        derive_account(NULLIFIER_SEED, &nullifier.0)
    }

    fn queued_leaves_account(&self, left_leaf: &Commitment) -> Address {
        derive_account(QUEUED_LEAVES_SEED, &left_leaf.0)
    }
}

#[derive(Default)]
struct RelayerState {
    log: Vec<IndexedTransaction>,
    submissions: Vec<TransactionEnvelope>,
    failing_fetches: u32,
    failing_submits: u32,
    lost_responses: u32,
    reject_next: Option<String>,
}

/// Indexer and relayer backed by a [`MockLedger`].
#[derive(Clone)]
pub struct MockRelayer {
    ledger: MockLedger,
    state: Arc<Mutex<RelayerState>>,
}

impl MockRelayer {
    pub fn new(ledger: MockLedger) -> Self {
        Self {
            ledger,
            state: Arc::new(Mutex::new(RelayerState::default())),
        }
    }

    pub fn ledger(&self) -> &MockLedger {
        &self.ledger
    }

    /// Leaf index the next transaction will start at.
    pub async fn next_leaf_index(&self) -> u64 {
        self.ledger.leaf_count().await
    }

    /// Log a transaction that has already landed in the tree.
    pub async fn push_transaction(&self, tx: IndexedTransaction) {
        for nullifier in &tx.nullifiers {
            self.ledger.add_nullifier(nullifier).await;
        }
        self.ledger.append_leaves(&tx.leaves).await;
        self.state.lock().await.log.push(tx);
    }

    /// Log a transaction without touching the ledger.
    pub async fn push_log_only(&self, tx: IndexedTransaction) {
        self.state.lock().await.log.push(tx);
    }

    pub async fn fail_next_fetches(&self, n: u32) {
        self.state.lock().await.failing_fetches = n;
    }

    pub async fn fail_next_submits(&self, n: u32) {
        self.state.lock().await.failing_submits = n;
    }

    /// Land the next `n` submissions but report a transport error.
    pub async fn lose_next_responses(&self, n: u32) {
        self.state.lock().await.lost_responses = n;
    }

    pub async fn reject_next(&self, reason: &str) {
        self.state.lock().await.reject_next = Some(reason.to_string());
    }

    /// Every envelope received, landed or not.
    pub async fn submissions(&self) -> Vec<TransactionEnvelope> {
        self.state.lock().await.submissions.clone()
    }

    async fn land(&self, envelope: &TransactionEnvelope) -> TxResult {
        let first_leaf_index = self.ledger.leaf_count().await;
        for nullifier in &envelope.nullifiers {
            self.ledger.add_nullifier(nullifier).await;
        }
        self.ledger.queue_leaves(&envelope.leaves).await;

        let mut state = self.state.lock().await;
        let signature = format!("mock-sig-{}", state.log.len());
        let block_time = state.log.len() as u64;
        state.log.push(IndexedTransaction {
            signature: signature.clone(),
            first_leaf_index,
            leaves: envelope.leaves.clone(),
            encrypted_payload: envelope.encrypted_outputs.clone(),
            nullifiers: envelope.nullifiers.clone(),
            block_time,
            kind: envelope.action,
        });
        debug!(%signature, first_leaf_index, "mock relayer landed transaction");
        TxResult { signature }
    }
}

impl Indexer for MockRelayer {
    async fn indexed_transactions(&self) -> Result<Vec<IndexedTransaction>, RelayerError> {
        let mut state = self.state.lock().await;
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(RelayerError::Transport("indexer unreachable".to_string()));
        }
        Ok(state.log.clone())
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxResult, RelayerError> {
        let lose_response = {
            let mut state = self.state.lock().await;
            state.submissions.push(envelope.clone());
            if let Some(reason) = state.reject_next.take() {
                return Err(RelayerError::Rejected(reason));
            }
            if state.failing_submits > 0 {
                state.failing_submits -= 1;
                return Err(RelayerError::Transport("relayer unreachable".to_string()));
            }
            let lose = state.lost_responses > 0;
            if lose {
                state.lost_responses -= 1;
            }
            lose
        };

        let result = self.land(envelope).await;
        if lose_response {
            return Err(RelayerError::Transport("response lost".to_string()));
        }
        Ok(result)
    }

    async fn update_ledger_view(&self) -> Result<(), RelayerError> {
        let flushed = self.ledger.flush_queue().await;
        debug!(flushed, "mock ledger view updated");
        Ok(())
    }
}
