//! Segments and their Merkle leaves.

use alloy_primitives::B256;
use bytes::{Bytes, BytesMut};

use crate::{
    layout::{Layout, num_splits},
    merkle::{MerkleError, Proof, segment_root_with_chunk_size},
};

/// A segment of file data.
///
/// `data` holds the raw file bytes; only the last segment of a file may be
/// shorter than a full segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Index of the segment within the file.
    pub index: u64,
    /// Raw file bytes of the segment.
    pub data: Bytes,
}

impl Segment {
    /// Creates a segment.
    pub const fn new(index: u64, data: Bytes) -> Self {
        Self { index, data }
    }

    /// Length of the raw data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the segment carries no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The data zero-filled up to a whole number of chunks, as nodes store it.
    pub fn chunk_aligned(&self, layout: &Layout) -> Bytes {
        let chunk = layout.chunk_size();
        let aligned = self.data.len().div_ceil(chunk) * chunk;
        if aligned == self.data.len() {
            return self.data.clone();
        }
        let mut buf = BytesMut::with_capacity(aligned);
        buf.extend_from_slice(&self.data);
        buf.resize(aligned, 0);
        buf.freeze()
    }
}

/// Merkle leaf of segment `index` of a `file_size` byte file holding `data`.
///
/// `data` may be raw or chunk aligned; the remaining flow padding of the segment
/// is accounted for with empty chunk hashes. Returns `None` when the index lies
/// beyond the padded file or `data` is longer than the padded segment.
pub fn segment_leaf(layout: &Layout, file_size: u64, index: u64, data: &[u8]) -> Option<B256> {
    let chunk = layout.chunk_size() as u64;
    let padded_len = layout.padded_segment_len(file_size, index)?;
    let data_chunks = num_splits(data.len() as u64, chunk);
    let padded_chunks = padded_len / chunk;
    if data_chunks > padded_chunks {
        return None;
    }
    let empty = (padded_chunks - data_chunks) as usize;
    Some(segment_root_with_chunk_size(data, empty, layout.chunk_size()))
}

/// Checks that `data` is segment `index` of the file committed to by `root`.
pub fn verify_segment(
    layout: &Layout,
    root: &B256,
    file_size: u64,
    index: u64,
    data: &[u8],
    proof: &Proof,
) -> Result<(), MerkleError> {
    let leaves = layout.padded_segments(file_size) as usize;
    let out_of_range = MerkleError::IndexOutOfRange {
        index: index as usize,
        leaves,
    };
    let leaf = segment_leaf(layout, file_size, index, data).ok_or(out_of_range)?;
    proof.validate_hash(root, &leaf, index as usize, leaves)
}
