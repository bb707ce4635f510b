use thiserror::Error;

/// Errors raised while building trees or checking proofs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// The lemma and path lengths do not describe a proof.
    #[error("invalid merkle proof format: {lemma} lemma entries for {path} path entries")]
    WrongFormat {
        /// Number of lemma entries.
        lemma: usize,
        /// Number of path entries.
        path: usize,
    },

    /// The first lemma entry is not the hash of the proven content.
    #[error("merkle proof content mismatch")]
    ContentMismatch,

    /// The last lemma entry is not the expected root.
    #[error("merkle proof root mismatch")]
    RootMismatch,

    /// The proof length does not match the depth of the claimed leaf.
    #[error("merkle proof depth mismatch: expected {expected}, got {actual}")]
    DepthMismatch {
        /// Depth of the leaf in a tree of the claimed size.
        expected: usize,
        /// Number of path entries in the proof.
        actual: usize,
    },

    /// The path leads to a different leaf than the one claimed.
    #[error("merkle proof position mismatch: expected {expected}, got {actual}")]
    PositionMismatch {
        /// Claimed leaf index.
        expected: usize,
        /// Index the path leads to.
        actual: usize,
    },

    /// Folding the siblings does not reproduce the root.
    #[error("failed to validate merkle proof")]
    ValidationFailure,

    /// A leaf index beyond the tree.
    #[error("leaf index {index} out of range for {leaves} leaves")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of leaves in the tree.
        leaves: usize,
    },
}

impl MerkleError {
    pub(crate) const fn wrong_format(lemma: usize, path: usize) -> Self {
        Self::WrongFormat { lemma, path }
    }

    pub(crate) const fn index_out_of_range(index: usize, leaves: usize) -> Self {
        Self::IndexOutOfRange { index, leaves }
    }
}

/// Result type for Merkle operations.
pub type Result<T> = std::result::Result<T, MerkleError>;
