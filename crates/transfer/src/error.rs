//! Error types for node access, selection, submission and transfers.

use std::{path::PathBuf, time::Duration};

use alloy_primitives::B256;
use thiserror::Error;
use zgs_primitives::{FileError, PrimitivesError};

use crate::node::NodeAddress;

/// Crate-level error.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Node communication failed.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// No usable set of nodes.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// Upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Failure talking to a single storage node or indexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// No answer in time.
    #[error("request to {node} timed out")]
    Timeout {
        /// Node that timed out.
        node: NodeAddress,
    },

    /// The connection dropped mid-request.
    #[error("connection to {node} was reset")]
    ConnectionReset {
        /// Node that dropped the connection.
        node: NodeAddress,
    },

    /// The node could not be reached at all.
    #[error("connection to {node} refused")]
    Refused {
        /// Unreachable node.
        node: NodeAddress,
    },

    /// The node asked the client to slow down.
    #[error("{node} is busy: {message}")]
    Backpressure {
        /// Overloaded node.
        node: NodeAddress,
        /// Message sent by the node.
        message: String,
    },

    /// A method that must return data returned null.
    #[error("{node} returned no result for {method}")]
    EmptyResponse {
        /// Node that answered.
        node: NodeAddress,
        /// RPC method called.
        method: &'static str,
    },

    /// The node answered with a JSON-RPC error.
    #[error("{node} rejected the request ({code}): {message}")]
    Rpc {
        /// Node that answered.
        node: NodeAddress,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("malformed response from {node}: {message}")]
    Decode {
        /// Node that answered.
        node: NodeAddress,
        /// Decoder message.
        message: String,
    },
}

impl NodeError {
    /// The node the error concerns.
    pub const fn node(&self) -> &NodeAddress {
        match self {
            Self::Timeout { node }
            | Self::ConnectionReset { node }
            | Self::Refused { node }
            | Self::Backpressure { node, .. }
            | Self::EmptyResponse { node, .. }
            | Self::Rpc { node, .. }
            | Self::Decode { node, .. } => node,
        }
    }

    /// Whether retrying the same request against the same node may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionReset { .. }
                | Self::Backpressure { .. }
                | Self::EmptyResponse { .. }
        )
    }

    /// Whether the node reports the data as already stored and finalized.
    pub fn is_already_finalized(&self) -> bool {
        let Self::Rpc { message, .. } = self else {
            return false;
        };
        let message = message.to_ascii_lowercase();
        message.contains("already uploaded and finalized")
            || (message.contains("invalid params") && message.contains("already uploaded"))
    }

    /// Maps a JSON-RPC error object onto an error variant.
    pub(crate) fn from_rpc(node: &NodeAddress, code: i64, message: String) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("too many data writing") {
            Self::Backpressure {
                node: node.clone(),
                message,
            }
        } else {
            Self::Rpc {
                node: node.clone(),
                code,
                message,
            }
        }
    }

    pub(crate) fn decode(node: &NodeAddress, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            node: node.clone(),
            message: err.to_string(),
        }
    }
}

/// No set of nodes satisfies a placement request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The request can never be met with the known nodes.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Too few distinct healthy nodes cover a segment.
    #[error("segment {segment} is covered by {available} eligible nodes, {required} required")]
    InsufficientNodes {
        /// File-relative segment index.
        segment: u64,
        /// Distinct eligible nodes covering the segment.
        available: usize,
        /// Required replica count.
        required: usize,
    },
}

impl SelectionError {
    pub(crate) fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
}

/// On-chain submission failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// The transaction was rejected or reverted.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// The chain could not be reached.
    #[error("chain unreachable: {0}")]
    Unreachable(String),

    /// The receipt carries no flow `Submit` event.
    #[error("transaction {tx_hash} emitted no submit event")]
    MissingSubmitLog {
        /// Transaction hash.
        tx_hash: B256,
    },
}

/// Upload failure.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Reading the file failed.
    #[error(transparent)]
    File(#[from] FileError),

    /// Building a proof failed.
    #[error(transparent)]
    Primitives(#[from] PrimitivesError),

    /// No usable node placement.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The on-chain submission failed. No segment was sent.
    #[error("submission failed: {0}")]
    Contract(#[from] ContractError),

    /// A segment reached no node at all.
    #[error("segment {segment} reached no node, last tried {node} {attempts} times: {source}")]
    Replication {
        /// File-relative segment index.
        segment: u64,
        /// Last node tried.
        node: NodeAddress,
        /// Attempts made against that node.
        attempts: u32,
        /// Last failure.
        #[source]
        source: NodeError,
    },

    /// Replicas did not report the file finalized within the poll limit.
    #[error("file not finalized on {} nodes", nodes.len())]
    NotFinalized {
        /// Nodes still pending.
        nodes: Vec<NodeAddress>,
    },

    /// The configured operation timeout elapsed.
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Download failure.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Location lookup failed.
    #[error("location lookup failed: {0}")]
    Lookup(#[source] NodeError),

    /// No node knows the file.
    #[error("file {root} not found")]
    NotFound {
        /// Requested root.
        root: B256,
    },

    /// Nodes know the file but none holds all of it yet.
    #[error("file {root} is not finalized on any node")]
    NotFinalized {
        /// Requested root.
        root: B256,
    },

    /// The destination already exists.
    #[error("destination {0} already exists")]
    DestinationExists(PathBuf),

    /// A segment could not be fetched from any candidate.
    #[error("segment {segment} unavailable after {attempts} attempts{}", fmt_last(.last_error))]
    IncompleteFile {
        /// File-relative segment index.
        segment: u64,
        /// Attempts over all candidates.
        attempts: u32,
        /// Last failure seen.
        last_error: Option<String>,
    },

    /// No usable node placement.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// Writing the destination failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configured operation timeout elapsed.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
}

fn fmt_last(last: &Option<String>) -> String {
    last.as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}
