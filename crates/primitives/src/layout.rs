//! Chunk and segment arithmetic.
//!
//! A file is cut into chunks of [`CHUNK_SIZE`] bytes, and chunks are grouped into
//! segments of at most [`SEGMENT_MAX_CHUNKS`] chunks. Before a file is committed to
//! the flow it is padded with zero chunks up to a size the flow accepts, see
//! [`compute_padded_size`].

use crate::file::FileError;

/// Size of a chunk in bytes.
pub const CHUNK_SIZE: usize = 256;

/// Maximum number of chunks in a segment.
pub const SEGMENT_MAX_CHUNKS: usize = 1024;

/// Size of a full segment in bytes.
pub const SEGMENT_SIZE: usize = CHUNK_SIZE * SEGMENT_MAX_CHUNKS;

/// Number of `unit`-sized pieces needed to hold `total` items.
///
/// Zero items need zero pieces.
#[inline]
pub const fn num_splits(total: u64, unit: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (total - 1) / unit + 1
    }
}

/// Smallest power of two greater than or equal to `value`, with `0` mapping to `0`.
#[inline]
pub const fn next_pow2(value: u64) -> u64 {
    if value == 0 {
        0
    } else {
        value.next_power_of_two()
    }
}

/// Number of chunks a file of `chunks` chunks occupies in the flow once padded.
///
/// Files whose chunk count is a power of two are not padded. Otherwise the count is
/// rounded up to a multiple of one sixteenth of the next power of two (at least one
/// chunk).
///
/// ```
/// use zgs_primitives::layout::compute_padded_size;
///
/// assert_eq!(compute_padded_size(0), 0);
/// assert_eq!(compute_padded_size(1024), 1024);
/// assert_eq!(compute_padded_size(1025), 1152);
/// assert_eq!(compute_padded_size(5), 5);
/// ```
pub const fn compute_padded_size(chunks: u64) -> u64 {
    let next = next_pow2(chunks);
    if next == chunks {
        return next;
    }

    let min_chunk = if next >= 16 { next / 16 } else { 1 };
    num_splits(chunks, min_chunk) * min_chunk
}

/// Chunk and segment geometry used to cut a file.
///
/// [`Layout::DEFAULT`] is the geometry the network commits to; other layouts are
/// only meaningful for local experiments since their roots will not match any
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Layout {
    chunk_size: usize,
    segment_max_chunks: usize,
}

impl Default for Layout {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Layout {
    /// The network's layout: 256 byte chunks, 1024 chunks per segment.
    pub const DEFAULT: Self = Self {
        chunk_size: CHUNK_SIZE,
        segment_max_chunks: SEGMENT_MAX_CHUNKS,
    };

    /// Creates a layout, rejecting zero sizes and non power of two segment widths.
    pub fn new(chunk_size: usize, segment_max_chunks: usize) -> Result<Self, FileError> {
        if chunk_size == 0 {
            return Err(FileError::invalid_layout("chunk size must be non-zero"));
        }
        if !segment_max_chunks.is_power_of_two() {
            return Err(FileError::invalid_layout(format!(
                "segment width {segment_max_chunks} is not a power of two"
            )));
        }
        Ok(Self {
            chunk_size,
            segment_max_chunks,
        })
    }

    /// Chunk size in bytes.
    #[inline]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks per full segment.
    #[inline]
    pub const fn segment_max_chunks(&self) -> usize {
        self.segment_max_chunks
    }

    /// Full segment size in bytes.
    #[inline]
    pub const fn segment_size(&self) -> usize {
        self.chunk_size * self.segment_max_chunks
    }

    /// Number of chunks in a file of `size` bytes.
    #[inline]
    pub const fn num_chunks(&self, size: u64) -> u64 {
        num_splits(size, self.chunk_size as u64)
    }

    /// Number of segments in a file of `size` bytes.
    #[inline]
    pub const fn num_segments(&self, size: u64) -> u64 {
        num_splits(self.num_chunks(size), self.segment_max_chunks as u64)
    }

    /// Number of chunks the file occupies in the flow after padding.
    #[inline]
    pub const fn padded_chunks(&self, size: u64) -> u64 {
        compute_padded_size(self.num_chunks(size))
    }

    /// Padded size in bytes.
    #[inline]
    pub const fn padded_size(&self, size: u64) -> u64 {
        self.padded_chunks(size) * self.chunk_size as u64
    }

    /// Number of Merkle leaves of the file tree, one per padded segment.
    #[inline]
    pub const fn padded_segments(&self, size: u64) -> u64 {
        num_splits(self.padded_chunks(size), self.segment_max_chunks as u64)
    }

    /// Byte range `[start, end)` of segment `index` within the unpadded file.
    ///
    /// Returns `None` when the segment lies past the end of the file.
    pub const fn segment_bounds(&self, size: u64, index: u64) -> Option<(u64, u64)> {
        let start = index * self.segment_size() as u64;
        if start >= size {
            return None;
        }
        let end = start + self.segment_size() as u64;
        Some((start, if end < size { end } else { size }))
    }

    /// Length in bytes of padded segment `index`, or `None` when out of range.
    pub const fn padded_segment_len(&self, size: u64, index: u64) -> Option<u64> {
        let padded = self.padded_size(size);
        let start = index * self.segment_size() as u64;
        if start >= padded {
            return None;
        }
        let len = padded - start;
        let segment = self.segment_size() as u64;
        Some(if len < segment { len } else { segment })
    }
}
