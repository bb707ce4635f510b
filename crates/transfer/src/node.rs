//! Storage node identities, shard placement and the capabilities the transfer
//! engine consumes.
//!
//! The wire types mirror the camelCase JSON returned by storage nodes and the
//! indexer. The capability traits ([`NodeRpc`], [`Indexer`], [`Submitter`])
//! are the only seams to the outside world; [`JsonRpcNodes`](crate::JsonRpcNodes)
//! and [`MemoryNetwork`](crate::MemoryNetwork) implement them.

use std::{fmt, future::Future};

use alloy_primitives::{B256, U256};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zgs_primitives::{Proof, SubmissionDescriptor};

use crate::error::{ContractError, NodeError};

/// Address of a storage node, usually its RPC URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Creates an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for NodeAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl AsRef<str> for NodeAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The residue class of segments a node stores.
///
/// A node with `shard_id = s` and `num_shard = k` is responsible for every
/// segment whose global flow index `i` satisfies `i % k == s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardConfig {
    /// Residue served by the node.
    pub shard_id: u64,
    /// Number of shards the segment space is cut into.
    pub num_shard: u64,
}

impl Default for ShardConfig {
    #[inline]
    fn default() -> Self {
        Self::FULL
    }
}

impl ShardConfig {
    /// A node that stores every segment.
    pub const FULL: Self = Self {
        shard_id: 0,
        num_shard: 1,
    };

    /// Creates a shard config without validating it.
    pub const fn new(shard_id: u64, num_shard: u64) -> Self {
        Self {
            shard_id,
            num_shard,
        }
    }

    /// Whether `num_shard` is a non-zero power of two and `shard_id` lies below it.
    pub const fn is_valid(&self) -> bool {
        self.num_shard.is_power_of_two() && self.shard_id < self.num_shard
    }

    /// Whether the node is responsible for global segment `index`.
    #[inline]
    pub const fn covers(&self, index: u64) -> bool {
        self.num_shard > 0 && index % self.num_shard == self.shard_id
    }

    /// Smallest index `>= from` covered by this shard. The config must be valid.
    pub const fn next_index(&self, from: u64) -> u64 {
        let residue = from % self.num_shard;
        if residue <= self.shard_id {
            from + self.shard_id - residue
        } else {
            from + self.num_shard - residue + self.shard_id
        }
    }
}

impl fmt::Display for ShardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard_id, self.num_shard)
    }
}

/// Availability of a node, best first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    /// Reachable and in sync.
    #[default]
    Healthy,
    /// Reachable but lagging or unconfirmed. Used only as a fallback.
    Degraded,
    /// Not reachable. Never selected.
    Unavailable,
}

/// A node together with its advertised shard and observed health.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeShardInfo {
    /// Where to reach the node.
    pub address: NodeAddress,
    /// Segments the node stores.
    pub config: ShardConfig,
    /// Observed availability.
    pub health: NodeHealth,
}

impl NodeShardInfo {
    /// A healthy node.
    pub fn healthy(address: impl Into<NodeAddress>, config: ShardConfig) -> Self {
        Self {
            address: address.into(),
            config,
            health: NodeHealth::Healthy,
        }
    }

    /// Replaces the health flag.
    #[must_use]
    pub const fn with_health(mut self, health: NodeHealth) -> Self {
        self.health = health;
        self
    }
}

// Wire types

/// `zgs_getStatus` result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Connected peers.
    #[serde(default)]
    pub connected_peers: u64,
    /// Highest synced log entry.
    #[serde(default)]
    pub log_sync_height: u64,
    /// Block hash of the synced height.
    #[serde(default)]
    pub log_sync_block: B256,
    /// Next transaction sequence the node expects.
    #[serde(default)]
    pub next_tx_seq: u64,
}

/// A flow log entry as seen by a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    /// Transaction sequence of the submission.
    pub seq: u64,
    /// File root committed by the submission.
    pub data_merkle_root: B256,
    /// First flow entry (chunk) of the file.
    pub start_entry_index: u64,
    /// File size in bytes.
    pub size: u64,
}

/// `zgs_getFileInfo` result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// The log entry of the file.
    pub tx: TxInfo,
    /// Whether the node holds every segment it is responsible for.
    pub finalized: bool,
    /// Whether the node only caches the data.
    #[serde(default)]
    pub is_cached: bool,
    /// Segments received so far.
    #[serde(default)]
    pub uploaded_seg_num: u64,
}

/// A segment with its inclusion proof, as uploaded and downloaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentWithProof {
    /// Root of the file.
    pub root: B256,
    /// Segment bytes zero-filled to a whole chunk, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    /// File-relative segment index.
    pub index: u64,
    /// Proof of the segment leaf against `root`.
    pub proof: Proof,
    /// Size of the whole file.
    pub file_size: u64,
}

/// A node known to the indexer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLocation {
    /// RPC address of the node.
    pub url: NodeAddress,
    /// Shard advertised to the indexer.
    pub shard_config: ShardConfig,
}

/// `indexer_getShardedNodes` result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardedNodes {
    /// Nodes run by the indexer operator.
    #[serde(default)]
    pub trusted: Vec<NodeLocation>,
    /// Nodes found through peer discovery.
    #[serde(default)]
    pub discovered: Vec<NodeLocation>,
}

/// Outcome of an on-chain submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Root recorded by the flow contract.
    pub root: B256,
    /// Submission index assigned by the flow contract.
    pub tx_seq: u64,
}

pub(crate) mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(crate) fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

// Capabilities

/// Per-node storage RPC.
pub trait NodeRpc: Send + Sync {
    /// Sync status of a node.
    fn status(&self, node: &NodeAddress) -> impl Future<Output = Result<Status, NodeError>> + Send;

    /// Shard a node serves.
    fn shard_config(
        &self,
        node: &NodeAddress,
    ) -> impl Future<Output = Result<ShardConfig, NodeError>> + Send;

    /// File info by root, `None` when the node has no log entry for it.
    fn file_info(
        &self,
        node: &NodeAddress,
        root: &B256,
        need_available: bool,
    ) -> impl Future<Output = Result<Option<FileInfo>, NodeError>> + Send;

    /// File info by transaction sequence.
    fn file_info_by_tx_seq(
        &self,
        node: &NodeAddress,
        tx_seq: u64,
    ) -> impl Future<Output = Result<Option<FileInfo>, NodeError>> + Send;

    /// Uploads segments, letting the node find the log entry by root.
    fn upload_segments(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
    ) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Uploads segments of the log entry `tx_seq`.
    fn upload_segments_by_tx_seq(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
        tx_seq: u64,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Raw bytes of file chunks `[start_chunk, end_chunk)`.
    fn download_segment(
        &self,
        node: &NodeAddress,
        root: &B256,
        start_chunk: u64,
        end_chunk: u64,
    ) -> impl Future<Output = Result<Bytes, NodeError>> + Send;

    /// Segment `index` with its inclusion proof.
    fn download_segment_with_proof(
        &self,
        node: &NodeAddress,
        root: &B256,
        index: u64,
    ) -> impl Future<Output = Result<SegmentWithProof, NodeError>> + Send;
}

/// Lookup of nodes and file locations.
pub trait Indexer: Send + Sync {
    /// Every node the indexer knows.
    fn sharded_nodes(&self) -> impl Future<Output = Result<ShardedNodes, NodeError>> + Send;

    /// Nodes that store the file committed to by `root`.
    fn file_locations(
        &self,
        root: &B256,
    ) -> impl Future<Output = Result<Vec<NodeLocation>, NodeError>> + Send;
}

/// On-chain registration of submissions.
pub trait Submitter: Send + Sync {
    /// Submits `descriptor` to the flow contract paying `fee`.
    fn submit(
        &self,
        descriptor: &SubmissionDescriptor,
        fee: U256,
    ) -> impl Future<Output = Result<SubmitReceipt, ContractError>> + Send;
}
