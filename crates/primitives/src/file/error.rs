use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or reading a file source.
#[derive(Error, Debug)]
pub enum FileError {
    /// A path could not be opened.
    #[error("cannot open {path}: {source}")]
    Unreadable {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The length of the source could not be determined.
    #[error("source length is unknown: {0}")]
    UnknownLength(#[source] std::io::Error),

    /// Reading from the source failed.
    #[error("read of {len} bytes at offset {offset} failed: {source}")]
    Read {
        /// Offset of the failed read.
        offset: u64,
        /// Length of the failed read.
        len: usize,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The handle was closed.
    #[error("file handle is closed")]
    Closed,

    /// A segment index beyond the file.
    #[error("segment {index} out of range for {segments} segments")]
    SegmentOutOfRange {
        /// Requested segment.
        index: u64,
        /// Number of segments available.
        segments: u64,
    },

    /// Chunk or segment geometry is unusable.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

impl FileError {
    pub(crate) fn invalid_layout<S: Into<String>>(msg: S) -> Self {
        Self::InvalidLayout(msg.into())
    }

    pub(crate) const fn segment_out_of_range(index: u64, segments: u64) -> Self {
        Self::SegmentOutOfRange { index, segments }
    }
}
