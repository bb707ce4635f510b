//! Core primitives for 0G storage
//!
//! This crate turns a byte source into the commitment the storage network
//! expects: chunks and segments, the Keccak-256 Merkle root over them, inclusion
//! proofs for individual segments, and the descriptor a file is registered with
//! on chain.
//!
//! ## Key Components
//!
//! - **Layout**: chunk, segment and flow padding arithmetic ([`Layout`])
//! - **FileHandle**: exclusive access to a source, segment reads, cached tree ([`FileHandle`])
//! - **Merkle trees**: roots, proofs and verification ([`MerkleTree`], [`Proof`])
//! - **Submissions**: the on-chain descriptor ([`SubmissionDescriptor`])
//!
//! ## Usage Examples
//!
//! ```
//! use zgs_primitives::{FileHandle, verify_segment};
//!
//! let file = FileHandle::from_bytes(vec![7u8; 600_000]);
//! let root = file.root_hash().unwrap();
//!
//! let segment = file.read_segment(1).unwrap();
//! let proof = file.proof_at(1).unwrap();
//! assert!(verify_segment(file.layout(), &root, file.size(), 1, &segment.data, &proof).is_ok());
//!
//! let submission = file.submission(Vec::new()).unwrap();
//! assert_eq!(submission.root, root);
//! file.close();
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

// Re-export dependencies that are part of our public API
pub use bytes;

mod cache;
pub mod error;
pub mod file;
pub mod layout;
pub mod merkle;
pub mod submission;

// Re-export core constants
pub use layout::{CHUNK_SIZE, SEGMENT_MAX_CHUNKS, SEGMENT_SIZE};
pub use merkle::{EMPTY_CHUNK_HASH, ZERO_HASH};

// Re-export core types
pub use error::{PrimitivesError, Result};
pub use file::{FileError, FileHandle, Segment, segment_leaf, verify_segment};
pub use layout::Layout;
pub use merkle::{MerkleError, MerkleTree, MerkleTreeBuilder, Proof};
pub use submission::{SubmissionDescriptor, SubmissionNode};
