//! Inclusion proofs in the node wire format.

use alloy_primitives::{B256, keccak256};

use super::{
    error::{MerkleError, Result},
    hasher::hash_pair,
};

/// Inclusion proof for one leaf.
///
/// `lemma` is `[leaf, sibling_0, .., sibling_n, root]` listed bottom-up, and
/// `path[i]` is `true` when the running node is the left child at level `i`. A
/// proof for the only leaf of a tree is the single entry `[root]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Proof {
    /// Leaf hash, sibling hashes, root hash.
    pub lemma: Vec<B256>,
    /// Side of the running node at each level.
    pub path: Vec<bool>,
}

impl Proof {
    /// Creates a proof from its parts without validating them.
    pub const fn new(lemma: Vec<B256>, path: Vec<bool>) -> Self {
        Self { lemma, path }
    }

    /// The proven leaf hash.
    pub fn leaf(&self) -> Option<&B256> {
        self.lemma.first()
    }

    /// The root the proof claims.
    pub fn root(&self) -> Option<&B256> {
        self.lemma.last()
    }

    /// Sibling hashes, bottom-up.
    pub fn siblings(&self) -> &[B256] {
        match self.lemma.len() {
            0..=2 => &[],
            len => &self.lemma[1..len - 1],
        }
    }

    /// Checks that the lemma and path lengths agree.
    pub fn validate_format(&self) -> Result<()> {
        let expected = if self.path.is_empty() {
            1
        } else {
            self.path.len() + 2
        };
        if self.lemma.len() != expected {
            return Err(MerkleError::wrong_format(self.lemma.len(), self.path.len()));
        }
        Ok(())
    }

    /// Validates the proof for `content`, hashed as a single leaf.
    pub fn validate(
        &self,
        root: &B256,
        content: &[u8],
        position: usize,
        num_leaves: usize,
    ) -> Result<()> {
        self.validate_hash(root, &keccak256(content), position, num_leaves)
    }

    /// Validates the proof for a leaf whose hash is already known.
    ///
    /// Checks, in order: the format, the leaf, the root, the proof depth for
    /// `position` in a tree of `num_leaves` leaves, the position the path leads
    /// to, and finally that folding the siblings reproduces the root.
    pub fn validate_hash(
        &self,
        root: &B256,
        leaf: &B256,
        position: usize,
        num_leaves: usize,
    ) -> Result<()> {
        self.validate_format()?;

        if self.leaf() != Some(leaf) {
            return Err(MerkleError::ContentMismatch);
        }
        if self.root() != Some(root) {
            return Err(MerkleError::RootMismatch);
        }

        let expected = leaf_depth(position, num_leaves)
            .ok_or(MerkleError::index_out_of_range(position, num_leaves))?;
        if expected != self.path.len() {
            return Err(MerkleError::DepthMismatch {
                expected,
                actual: self.path.len(),
            });
        }

        match self.position(num_leaves) {
            Some(actual) if actual == position => {}
            actual => {
                return Err(MerkleError::PositionMismatch {
                    expected: position,
                    actual: actual.unwrap_or(usize::MAX),
                });
            }
        }

        if !self.validate_root() {
            return Err(MerkleError::ValidationFailure);
        }
        Ok(())
    }

    /// Folds the siblings onto the leaf and compares against the claimed root.
    pub fn validate_root(&self) -> bool {
        let Some(mut hash) = self.leaf().copied() else {
            return false;
        };
        for (is_left, sibling) in self.path.iter().zip(&self.lemma[1..]) {
            hash = if *is_left {
                hash_pair(&hash, sibling)
            } else {
                hash_pair(sibling, &hash)
            };
        }
        self.root() == Some(&hash)
    }

    /// Leaf index the path selects in a tree of `num_leaves` leaves.
    ///
    /// Walks the path top-down; the left subtree of a node over `n` leaves holds
    /// `next_pow2(n) / 2` of them. Returns `None` when the path is longer than the
    /// tree allows.
    pub fn position(&self, num_leaves: usize) -> Option<usize> {
        let mut position = 0;
        let mut leaves = num_leaves;
        for is_left in self.path.iter().rev() {
            if leaves <= 1 {
                return None;
            }
            let half = leaves.next_power_of_two() / 2;
            if *is_left {
                leaves = half;
            } else {
                position += half;
                leaves -= half;
            }
        }
        Some(position)
    }
}

/// Number of proof steps from leaf `index` to the root of a `leaves` leaf tree.
pub(crate) const fn leaf_depth(mut index: usize, mut leaves: usize) -> Option<usize> {
    if index >= leaves {
        return None;
    }
    let mut depth = 0;
    while leaves > 1 {
        let half = leaves.next_power_of_two() / 2;
        if index < half {
            leaves = half;
        } else {
            index -= half;
            leaves -= half;
        }
        depth += 1;
    }
    Some(depth)
}
