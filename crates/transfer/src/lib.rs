//! Upload and download of files on 0G storage nodes.
//!
//! An upload registers a file's commitment with the flow contract, waits for
//! the storage nodes to see the log entry, then pushes every segment with its
//! inclusion proof to enough nodes in each shard to reach the requested
//! replica count. A download finds the nodes holding a file through an
//! indexer and reassembles it in order, optionally checking every segment
//! against the file root.
//!
//! ## Key Components
//!
//! - **Node access**: the [`NodeRpc`], [`Indexer`] and [`Submitter`] seams,
//!   with JSON-RPC clients over any [`Transport`]
//! - **Selection**: replica placement across sharded nodes ([`NodeSelector`])
//! - **Upload**: tasks, retries and replication tracking ([`Uploader`])
//! - **Download**: ordered, verified reassembly ([`Downloader`])
//! - **Testing**: an in-memory network of nodes ([`MemoryNetwork`])
//!
//! ## Usage Examples
//!
//! ```
//! use zgs_primitives::FileHandle;
//! use zgs_transfer::{
//!     DownloadOptions, Downloader, MemoryNetwork, ShardConfig, TransferConfig, UploadOptions,
//!     UploadOutcome, Uploader,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let network = MemoryNetwork::new();
//! network.add_node("http://node-0", ShardConfig::new(0, 2));
//! network.add_node("http://node-1", ShardConfig::new(1, 2));
//!
//! let config = TransferConfig::default();
//! let uploader = Uploader::new(network.clone(), network.clone(), config.clone());
//! let file = FileHandle::from_bytes(vec![3u8; 600_000]);
//! let nodes = network.node_infos();
//! let result = uploader.upload(&file, &nodes, &UploadOptions::default()).await.unwrap();
//! assert_eq!(result.outcome, UploadOutcome::Complete);
//!
//! let downloader = Downloader::new(network.clone(), network, config);
//! let mut data = Vec::new();
//! downloader.download_to(result.root, &mut data, &DownloadOptions::verified()).await.unwrap();
//! assert_eq!(data, vec![3u8; 600_000]);
//! # });
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod flow;
pub mod memory;
pub mod node;
pub mod retry;
pub mod rpc;
pub mod selector;
pub mod task;
pub mod upload;

pub use config::{DownloadOptions, TransferConfig, UploadOptions};
pub use discovery::{discover_nodes, probe_nodes};
pub use download::Downloader;
pub use error::{
    ContractError, DownloadError, NodeError, Result, SelectionError, TransferError, UploadError,
};
pub use flow::{receipt_from_logs, submit_calldata};
pub use memory::MemoryNetwork;
pub use node::{
    FileInfo, Indexer, NodeAddress, NodeHealth, NodeLocation, NodeRpc, NodeShardInfo,
    SegmentWithProof, ShardConfig, ShardedNodes, Status, SubmitReceipt, Submitter, TxInfo,
};
pub use retry::{Backoff, Exhausted, RetryPolicy};
pub use rpc::{JsonRpcIndexer, JsonRpcNodes, Transport};
pub use selector::{NodeSelector, Selection};
pub use task::{PushFailure, TaskStatus, UploadTask};
pub use upload::{ReplicationShortfall, SubmissionResult, UploadOutcome, Uploader};

