//! Error types for the zgs-primitives crate
//!
//! The crate uses a two-level error hierarchy:
//!
//! - `PrimitivesError`: The top-level error type that wraps all other errors
//! - Component-specific errors: [`FileError`](crate::file::FileError) for
//!   unreadable or out-of-range input and [`MerkleError`](crate::merkle::MerkleError)
//!   for tree and proof failures
//!
//! ```
//! use zgs_primitives::{FileHandle, PrimitivesError};
//!
//! let file = FileHandle::from_bytes(vec![1u8; 300]);
//! match file.proof_at(5) {
//!     Err(PrimitivesError::Merkle(err)) => println!("proof error: {err}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Result type for operations in the primitives crate
pub type Result<T> = std::result::Result<T, PrimitivesError>;

/// Main error type for the primitives crate
#[derive(Error, Debug)]
pub enum PrimitivesError {
    /// Errors reading or validating input
    #[error(transparent)]
    File(#[from] crate::file::FileError),

    /// Errors from tree and proof operations
    #[error(transparent)]
    Merkle(#[from] crate::merkle::MerkleError),
}
