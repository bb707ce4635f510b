//! The descriptor a file is registered with on chain.

use alloy_primitives::{B256, U256};
use bytes::Bytes;

use crate::layout::{compute_padded_size, next_pow2};

/// One power-of-two sized subtree of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubmissionNode {
    /// Root of the subtree.
    pub root: B256,
    /// `log2` of the number of chunks under the subtree.
    pub height: u64,
}

impl SubmissionNode {
    /// Number of chunks (sectors) this node commits to.
    pub const fn sectors(&self) -> u64 {
        1 << self.height
    }
}

/// Everything the flow contract needs to register a file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubmissionDescriptor {
    /// Root of the file tree.
    pub root: B256,
    /// File size in bytes.
    pub length: u64,
    /// Opaque caller supplied tags.
    pub tags: Bytes,
    /// The padded file split into power-of-two subtrees, largest first.
    pub nodes: Vec<SubmissionNode>,
}

impl SubmissionDescriptor {
    /// Total number of sectors paid for.
    pub fn sectors(&self) -> u64 {
        self.nodes.iter().map(SubmissionNode::sectors).sum()
    }

    /// Storage fee for the given market price per sector.
    pub fn fee(&self, price_per_sector: U256) -> U256 {
        U256::from(self.sectors()) * price_per_sector
    }
}

/// Splits the padded form of a `chunks` chunk file into power-of-two pieces.
///
/// ```
/// use zgs_primitives::submission::split_nodes;
///
/// assert_eq!(split_nodes(1025), vec![1024, 128]);
/// assert_eq!(split_nodes(5), vec![4, 1]);
/// assert!(split_nodes(0).is_empty());
/// ```
pub fn split_nodes(chunks: u64) -> Vec<u64> {
    let mut remaining = compute_padded_size(chunks);
    let mut size = next_pow2(chunks);
    let mut nodes = Vec::new();
    while remaining > 0 {
        if remaining >= size {
            remaining -= size;
            nodes.push(size);
        }
        size /= 2;
    }
    nodes
}
