//! Keccak helpers shared by the tree, proofs and segment roots.

use alloy_primitives::{B256, Keccak256, keccak256};

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use super::{EMPTY_CHUNK_HASH, MerkleTree, ZERO_HASH};
use crate::layout::CHUNK_SIZE;

/// Hash of an interior node: `keccak256(left ‖ right)`.
#[inline]
pub fn hash_pair(left: &B256, right: &B256) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(left.as_slice());
    hasher.update(right.as_slice());
    B256::from_slice(hasher.finalize().as_slice())
}

/// Hashes each `chunk_size` chunk of `data`, zero-filling a short trailing chunk.
///
/// Output order follows input order even when hashing runs in parallel.
fn chunk_hashes(data: &[u8], chunk_size: usize) -> Vec<B256> {
    let hash_chunk = |chunk: &[u8]| {
        if chunk.len() == chunk_size {
            keccak256(chunk)
        } else {
            let mut padded = vec![0u8; chunk_size];
            padded[..chunk.len()].copy_from_slice(chunk);
            keccak256(&padded)
        }
    };

    #[cfg(not(target_arch = "wasm32"))]
    {
        data.par_chunks(chunk_size).map(hash_chunk).collect()
    }

    #[cfg(target_arch = "wasm32")]
    {
        data.chunks(chunk_size).map(hash_chunk).collect()
    }
}

/// Hash of a chunk of zeros.
fn empty_chunk_hash(chunk_size: usize) -> B256 {
    if chunk_size == CHUNK_SIZE {
        EMPTY_CHUNK_HASH
    } else {
        keccak256(vec![0u8; chunk_size])
    }
}

/// Root of the chunk tree of one segment, using the network chunk size.
///
/// `segment` is split into 256 byte chunks (the last one zero-filled) and
/// `empty_chunks_padded` copies of [`EMPTY_CHUNK_HASH`] are appended as further
/// leaves, so a padded segment can be hashed without materializing its zeros.
/// An empty segment with no padding hashes to [`ZERO_HASH`].
///
/// ```
/// use zgs_primitives::merkle::{EMPTY_CHUNK_HASH, segment_root};
///
/// assert_eq!(segment_root(&[0u8; 256], 0), EMPTY_CHUNK_HASH);
/// assert_eq!(segment_root(&[], 1), EMPTY_CHUNK_HASH);
/// ```
pub fn segment_root(segment: &[u8], empty_chunks_padded: usize) -> B256 {
    segment_root_with_chunk_size(segment, empty_chunks_padded, CHUNK_SIZE)
}

/// [`segment_root`] for an arbitrary chunk size.
pub fn segment_root_with_chunk_size(
    segment: &[u8],
    empty_chunks_padded: usize,
    chunk_size: usize,
) -> B256 {
    let mut builder = MerkleTree::builder();
    for hash in chunk_hashes(segment, chunk_size) {
        builder.add_leaf_by_hash(hash);
    }
    if empty_chunks_padded > 0 {
        let empty = empty_chunk_hash(chunk_size);
        for _ in 0..empty_chunks_padded {
            builder.add_leaf_by_hash(empty);
        }
    }

    let tree = builder.build();
    if tree.is_empty() {
        ZERO_HASH
    } else {
        tree.root()
    }
}
