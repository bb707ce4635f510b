//! Append-only Merkle tree construction.

use alloy_primitives::{B256, keccak256};

use super::{
    ZERO_HASH,
    error::{MerkleError, Result},
    hasher::hash_pair,
    proof::Proof,
};

/// Collects leaves for a [`MerkleTree`].
///
/// Leaves can only be appended; calling [`build`](Self::build) freezes them into
/// an immutable tree.
#[derive(Debug, Clone, Default)]
pub struct MerkleTreeBuilder {
    leaves: Vec<B256>,
}

impl MerkleTreeBuilder {
    /// Creates an empty builder.
    pub const fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    /// Creates an empty builder with room for `capacity` leaves.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            leaves: Vec::with_capacity(capacity),
        }
    }

    /// Appends a leaf holding `keccak256(content)`.
    pub fn add_leaf(&mut self, content: &[u8]) -> &mut Self {
        self.leaves.push(keccak256(content));
        self
    }

    /// Appends a leaf whose hash is already known.
    pub fn add_leaf_by_hash(&mut self, hash: B256) -> &mut Self {
        self.leaves.push(hash);
        self
    }

    /// Number of leaves added so far.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether no leaves have been added.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Folds the leaves into a tree.
    ///
    /// Each level pairs neighbours left to right as `hash(left ‖ right)`. A node
    /// left without a partner is carried up to the next level unchanged.
    pub fn build(self) -> MerkleTree {
        if self.leaves.is_empty() {
            return MerkleTree { layers: Vec::new() };
        }

        let mut layers = vec![self.leaves];
        while let Some(level) = layers.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    _ => pair[0],
                })
                .collect();
            layers.push(next);
        }

        MerkleTree { layers }
    }
}

/// An immutable binary Merkle tree.
///
/// `layers[0]` holds the leaves and the last layer holds the root. A tree
/// without leaves has [`ZERO_HASH`] as its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Starts building a new tree.
    pub const fn builder() -> MerkleTreeBuilder {
        MerkleTreeBuilder::new()
    }

    /// Builds a tree directly from leaf hashes.
    pub fn from_leaf_hashes(leaves: impl IntoIterator<Item = B256>) -> Self {
        MerkleTreeBuilder {
            leaves: leaves.into_iter().collect(),
        }
        .build()
    }

    /// The root hash.
    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of levels above the leaves, `ceil(log2(num_leaves))`.
    pub fn height(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    /// Hash of leaf `index`.
    pub fn leaf(&self, index: usize) -> Option<B256> {
        self.layers
            .first()
            .and_then(|leaves| leaves.get(index))
            .copied()
    }

    /// Inclusion proof for leaf `index`.
    ///
    /// A single leaf tree yields the one-entry proof `[root]`.
    pub fn proof_at(&self, index: usize) -> Result<Proof> {
        let leaves = self.num_leaves();
        if index >= leaves {
            return Err(MerkleError::index_out_of_range(index, leaves));
        }
        if leaves == 1 {
            return Ok(Proof::new(vec![self.root()], Vec::new()));
        }

        let mut lemma = Vec::with_capacity(self.layers.len() + 1);
        let mut path = Vec::with_capacity(self.layers.len());
        lemma.push(self.layers[0][index]);

        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            if position % 2 == 1 {
                lemma.push(layer[position - 1]);
                path.push(false);
            } else if position + 1 < layer.len() {
                lemma.push(layer[position + 1]);
                path.push(true);
            }
            // otherwise the node was promoted without a sibling
            position /= 2;
        }

        lemma.push(self.root());
        Ok(Proof::new(lemma, path))
    }

    /// Checks that `content` is leaf `index` of a `num_leaves` tree rooted at `root`.
    ///
    /// Fails closed: any malformed or mismatching proof yields `false`.
    pub fn verify(
        root: &B256,
        content: &[u8],
        index: usize,
        num_leaves: usize,
        proof: &Proof,
    ) -> bool {
        proof.validate(root, content, index, num_leaves).is_ok()
    }
}
