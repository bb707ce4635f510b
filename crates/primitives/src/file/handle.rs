//! Exclusive, closable access to a byte source.

use std::{
    fmt,
    fs::File,
    io::{Cursor, Read, Seek, SeekFrom},
    path::Path,
};

use alloy_primitives::B256;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use super::{FileError, Segment, segment_leaf};
use crate::{
    cache::OnceCache,
    error::Result,
    layout::{Layout, num_splits},
    merkle::{MerkleTree, Proof, segment_root_with_chunk_size},
    submission::{SubmissionDescriptor, SubmissionNode, split_nodes},
};

/// A readable, seekable byte source.
pub trait Source: Read + Seek + Send {}

impl<T: Read + Seek + Send> Source for T {}

/// Owns a byte source and exposes it as chunks and segments.
///
/// The source is released by [`close`](Self::close) or when the handle is
/// dropped, whichever comes first. Reads after closing fail with
/// [`FileError::Closed`]. The Merkle tree is computed on first use and cached.
pub struct FileHandle {
    layout: Layout,
    size: u64,
    source: Mutex<Option<Box<dyn Source>>>,
    tree: OnceCache<MerkleTree>,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("layout", &self.layout)
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    /// Opens a source with the network layout.
    pub fn open<S: Source + 'static>(source: S) -> std::result::Result<Self, FileError> {
        Self::open_with_layout(source, Layout::DEFAULT)
    }

    /// Opens a source with a custom layout.
    ///
    /// The size is taken by seeking to the end of the source.
    pub fn open_with_layout<S: Source + 'static>(
        mut source: S,
        layout: Layout,
    ) -> std::result::Result<Self, FileError> {
        let size = source
            .seek(SeekFrom::End(0))
            .map_err(FileError::UnknownLength)?;
        source.rewind().map_err(FileError::UnknownLength)?;
        Ok(Self {
            layout,
            size,
            source: Mutex::new(Some(Box::new(source))),
            tree: OnceCache::new(),
        })
    }

    /// Opens a file on disk.
    pub fn open_path(path: impl AsRef<Path>) -> std::result::Result<Self, FileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| FileError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::open(file)
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            layout: Layout::DEFAULT,
            size: data.len() as u64,
            source: Mutex::new(Some(Box::new(Cursor::new(data)))),
            tree: OnceCache::new(),
        }
    }

    /// The layout used to cut the file.
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// File size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of chunks.
    pub const fn num_chunks(&self) -> u64 {
        self.layout.num_chunks(self.size)
    }

    /// Number of segments.
    pub const fn num_segments(&self) -> u64 {
        self.layout.num_segments(self.size)
    }

    /// Number of leaves in the file tree.
    pub const fn num_padded_segments(&self) -> u64 {
        self.layout.padded_segments(self.size)
    }

    /// Whether the source has been released.
    pub fn is_closed(&self) -> bool {
        self.source.lock().is_none()
    }

    /// Releases the source. Closing twice is a no-op.
    pub fn close(&self) {
        self.source.lock().take();
    }

    /// Reads `len` bytes at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> std::result::Result<Bytes, FileError> {
        let mut guard = self.source.lock();
        let source = guard.as_mut().ok_or(FileError::Closed)?;
        let mut buf = vec![0u8; len];
        source
            .seek(SeekFrom::Start(offset))
            .and_then(|_| source.read_exact(&mut buf))
            .map_err(|source| FileError::Read {
                offset,
                len,
                source,
            })?;
        Ok(buf.into())
    }

    /// Reads segment `index` without padding.
    pub fn read_segment(&self, index: u64) -> std::result::Result<Segment, FileError> {
        let (start, end) = self
            .layout
            .segment_bounds(self.size, index)
            .ok_or(FileError::segment_out_of_range(index, self.num_segments()))?;
        Ok(Segment::new(index, self.read_at(start, (end - start) as usize)?))
    }

    /// Reads flow segment `index` zero-filled to its padded length.
    ///
    /// Indices past the last data segment are valid up to the padded segment
    /// count and read back as all zeros.
    pub fn read_padded_segment(&self, index: u64) -> std::result::Result<Segment, FileError> {
        let len = self
            .layout
            .padded_segment_len(self.size, index)
            .ok_or(FileError::segment_out_of_range(index, self.num_padded_segments()))?;
        let start = index * self.layout.segment_size() as u64;
        let end = (start + len).min(self.size);
        let mut buf = BytesMut::zeroed(len as usize);
        if start < end {
            let len = (end - start) as usize;
            buf[..len].copy_from_slice(&self.read_at(start, len)?);
        }
        Ok(Segment::new(index, buf.freeze()))
    }

    /// Lazily reads every segment in order.
    pub fn iterate_segments(&self) -> Segments<'_> {
        Segments {
            file: self,
            next: 0,
            end: self.num_segments(),
        }
    }

    /// Root of the padded byte range `[start, start + len)`.
    ///
    /// Bytes past the end of the file count as empty chunks.
    fn range_root(&self, start: u64, len: u64) -> std::result::Result<B256, FileError> {
        let chunk = self.layout.chunk_size() as u64;
        let end = (start + len).min(self.size);
        let data = if start < end {
            self.read_at(start, (end - start) as usize)?
        } else {
            Bytes::new()
        };
        let empty = len / chunk - num_splits(data.len() as u64, chunk);
        Ok(segment_root_with_chunk_size(&data, empty as usize, self.layout.chunk_size()))
    }

    /// The file tree, computed on first call from the zero-padded segments.
    pub fn merkle_tree(&self) -> std::result::Result<&MerkleTree, FileError> {
        self.tree.get_or_try_compute(|| {
            let leaves = self.num_padded_segments();
            let mut builder = MerkleTree::builder();
            for index in 0..leaves {
                let segment = self.read_padded_segment(index)?;
                let leaf = segment_leaf(&self.layout, self.size, index, &segment.data)
                    .ok_or(FileError::segment_out_of_range(index, leaves))?;
                builder.add_leaf_by_hash(leaf);
            }
            Ok(builder.build())
        })
    }

    /// Root hash of the file.
    pub fn root_hash(&self) -> std::result::Result<B256, FileError> {
        Ok(self.merkle_tree()?.root())
    }

    /// Inclusion proof of segment `index` against the file root.
    pub fn proof_at(&self, index: u64) -> Result<Proof> {
        Ok(self.merkle_tree()?.proof_at(index as usize)?)
    }

    /// Builds the on-chain submission for this file.
    pub fn submission(
        &self,
        tags: impl Into<Bytes>,
    ) -> std::result::Result<SubmissionDescriptor, FileError> {
        let chunk = self.layout.chunk_size() as u64;
        let max_chunks = self.layout.segment_max_chunks() as u64;

        let mut nodes = Vec::new();
        let mut offset = 0u64;
        for chunks in split_nodes(self.num_chunks()) {
            let batch = chunks.min(max_chunks) * chunk;
            let size = chunks * chunk;
            let mut builder = MerkleTree::builder();
            let mut done = 0u64;
            while done < size {
                builder.add_leaf_by_hash(self.range_root(offset + done, batch)?);
                done += batch;
            }
            nodes.push(SubmissionNode {
                root: builder.build().root(),
                height: chunks.trailing_zeros() as u64,
            });
            offset += size;
        }

        Ok(SubmissionDescriptor {
            root: self.root_hash()?,
            length: self.size,
            tags: tags.into(),
            nodes,
        })
    }
}

/// Lazy iterator over the segments of a [`FileHandle`].
#[derive(Debug)]
pub struct Segments<'a> {
    file: &'a FileHandle,
    next: u64,
    end: u64,
}

impl Iterator for Segments<'_> {
    type Item = std::result::Result<Segment, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let segment = self.file.read_segment(self.next);
        // a failed read ends the iteration
        self.next = if segment.is_ok() {
            self.next + 1
        } else {
            self.end
        };
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}
