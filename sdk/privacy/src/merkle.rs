//! Commitment Tree
//!
//! Local mirror of the pool's append-only commitment tree. It is rebuilt
//! leaf by leaf from the indexed log and yields the authentication paths a
//! spend needs and the root that is cross-checked against the ledger.
//!
//! ```text
//!  level 2            r
//!                   /   \
//!  level 1        n0     n1
//!                /  \   /  \
//!  level 0      c0  c1 c2  z      z = empty leaf, never stored
//! ```
//!
//! Only the filled prefix of each level is stored; everything to its right
//! is the empty subtree of that level.

use std::collections::VecDeque;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::{NoteError, Result};
use crate::field::{self, Fr};

/// Tree height (supports 2^18 notes)
pub const MERKLE_TREE_HEIGHT: usize = 18;

/// Root of an empty subtree at each level, leaves first.
static EMPTY: LazyLock<[[u8; 32]; MERKLE_TREE_HEIGHT + 1]> = LazyLock::new(|| {
    let mut empty = [[0u8; 32]; MERKLE_TREE_HEIGHT + 1];
    empty[0] = field::to_le_bytes(&field::poseidon(&[Fr::from(0u64)]));
    for level in 1..=MERKLE_TREE_HEIGHT {
        empty[level] = hash_pair(&empty[level - 1], &empty[level - 1]);
    }
    empty
});

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    field::to_le_bytes(&field::poseidon(&[
        field::from_le_bytes(left),
        field::from_le_bytes(right),
    ]))
}

/// Root of the tree with no leaves.
pub fn empty_root() -> [u8; 32] {
    EMPTY[MERKLE_TREE_HEIGHT]
}

/// Authentication path of one leaf. The direction at each level is the
/// matching bit of `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes, leaf level first
    pub siblings: Vec<[u8; 32]>,
    pub position: u64,
}

impl MerklePath {
    /// Path of a zero-valued padding input: never checked by the circuit.
    pub fn empty() -> Self {
        Self {
            siblings: vec![[0u8; 32]; MERKLE_TREE_HEIGHT],
            position: 0,
        }
    }

    pub fn root_for(&self, leaf: &Commitment) -> [u8; 32] {
        self.siblings
            .iter()
            .enumerate()
            .fold(leaf.0, |node, (level, sibling)| {
                if (self.position >> level) & 1 == 1 {
                    hash_pair(sibling, &node)
                } else {
                    hash_pair(&node, sibling)
                }
            })
    }

    pub fn verify(&self, leaf: &Commitment, root: &[u8; 32]) -> bool {
        self.siblings.len() == MERKLE_TREE_HEIGHT && &self.root_for(leaf) == root
    }

    pub fn to_field_elements(&self) -> Vec<Fr> {
        self.siblings.iter().map(field::from_le_bytes).collect()
    }
}

/// Append-only Poseidon tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves; `levels[height]` the root once a leaf
    /// exists.
    levels: Vec<Vec<[u8; 32]>>,
    height: usize,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::with_height(MERKLE_TREE_HEIGHT)
    }

    /// Tree of a lower height. Heights above `MERKLE_TREE_HEIGHT` are not
    /// supported.
    pub fn with_height(height: usize) -> Self {
        debug_assert!(height <= MERKLE_TREE_HEIGHT);
        Self {
            levels: vec![Vec::new(); height + 1],
            height,
        }
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels[self.height]
            .first()
            .copied()
            .unwrap_or(EMPTY[self.height])
    }

    /// Number of leaves appended so far.
    pub fn next_position(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Append a commitment and return its position.
    pub fn insert(&mut self, commitment: &Commitment) -> Result<u64> {
        let position = self.next_position();
        if position >= self.capacity() {
            return Err(NoteError::TreeFull {
                capacity: self.capacity(),
            });
        }
        self.levels[0].push(commitment.0);

        let mut index = position as usize;
        for level in 0..self.height {
            let left = index & !1;
            let parent = hash_pair(&self.node(level, left), &self.node(level, left + 1));
            index /= 2;
            let above = &mut self.levels[level + 1];
            if index < above.len() {
                above[index] = parent;
            } else {
                above.push(parent);
            }
        }
        Ok(position)
    }

    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_position() {
            return None;
        }
        let mut index = position as usize;
        let siblings = (0..self.height)
            .map(|level| {
                let sibling = self.node(level, index ^ 1);
                index /= 2;
                sibling
            })
            .collect();
        Some(MerklePath { siblings, position })
    }

    pub fn get(&self, position: u64) -> Option<Commitment> {
        self.levels[0].get(position as usize).copied().map(Commitment)
    }

    fn node(&self, level: usize, index: usize) -> [u8; 32] {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(EMPTY[level])
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded set of recent roots, newest first.
#[derive(Debug, Default, Clone)]
pub struct RootHistory {
    roots: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl RootHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `root` unless it is already the newest.
    pub fn push(&mut self, root: [u8; 32]) {
        if self.roots.front() != Some(&root) {
            self.roots.push_front(root);
            self.roots.truncate(self.capacity);
        }
    }

    pub fn is_valid(&self, root: &[u8; 32]) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&[u8; 32]> {
        self.roots.front()
    }
}
