//! Byte sources cut into chunks and segments.

mod error;
mod handle;
mod segment;

pub use error::FileError;
pub use handle::{FileHandle, Segments, Source};
pub use segment::{Segment, segment_leaf, verify_segment};

#[cfg(test)]
mod tests;
