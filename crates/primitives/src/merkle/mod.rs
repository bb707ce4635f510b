//! Keccak-256 Merkle trees over chunks and segments.
//!
//! Two trees are stacked to commit to a file. Each segment is cut into chunks and
//! the chunk hashes are folded into a segment root ([`segment_root`]). The segment
//! roots are then the leaves of the file tree. Both trees pair nodes left to
//! right and carry an unpaired node up unchanged, so the root is bit-for-bit the
//! one the storage network computes.

use alloy_primitives::{B256, b256};

pub mod error;
pub mod hasher;
pub mod proof;
pub mod tree;

pub use error::{MerkleError, Result};
pub use hasher::{hash_pair, segment_root, segment_root_with_chunk_size};
pub use proof::Proof;
pub use tree::{MerkleTree, MerkleTreeBuilder};

/// `keccak256` of one chunk of zeros, used for padding chunks.
pub const EMPTY_CHUNK_HASH: B256 =
    b256!("d397b3b043d87fcd6fad1291ff0bfd16401c274896d8c63a923727f077b8e0b5");

/// Root of an empty file and of a tree without leaves.
pub const ZERO_HASH: B256 = B256::ZERO;

#[cfg(test)]
mod tests;
