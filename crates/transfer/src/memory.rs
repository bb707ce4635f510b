//! In-process storage network for tests.
//!
//! [`MemoryNetwork`] plays every external party at once: the flow contract
//! ([`Submitter`]), the indexer ([`Indexer`]) and any number of storage nodes
//! ([`NodeRpc`]). Nodes validate uploads the way real nodes do, and faults can
//! be injected per node.

use std::{
    collections::{BTreeMap, HashMap},
    future::pending,
    sync::Arc,
};

use alloy_primitives::{Address, B256, U256, keccak256};
use alloy_sol_types::SolEvent;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;
use zgs_contracts::IFlow;
use zgs_primitives::{Layout, SubmissionDescriptor, verify_segment};

use crate::{
    error::{ContractError, NodeError},
    flow::receipt_from_logs,
    node::{
        FileInfo, Indexer, NodeAddress, NodeLocation, NodeRpc, NodeShardInfo, SegmentWithProof,
        ShardConfig, ShardedNodes, Status, SubmitReceipt, Submitter, TxInfo,
    },
};

const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

/// Reply of a node that already holds every segment of a file.
const ALREADY_FINALIZED: &str = "segments already uploaded and finalized";

#[derive(Debug, Default)]
struct MemoryNode {
    config: ShardConfig,
    offline: bool,
    hang: bool,
    transient_failures: u32,
    backpressure: u32,
    finalized_replies: u32,
    tamper: bool,
    upload_calls: usize,
    segments: HashMap<(u64, u64), SegmentWithProof>,
}

impl MemoryNode {
    /// Whether the node holds every data segment of `tx` it is responsible for.
    fn finalized(&self, layout: &Layout, tx: &TxInfo) -> bool {
        let start = tx.start_entry_index / layout.segment_max_chunks() as u64;
        (0..layout.num_segments(tx.size))
            .filter(|index| self.config.covers(start + index))
            .all(|index| self.segments.contains_key(&(tx.seq, index)))
    }

    fn held(&self, tx_seq: u64) -> u64 {
        let held = self.segments.keys().filter(|(seq, _)| *seq == tx_seq);
        held.count() as u64
    }

    fn file_info(&self, layout: &Layout, tx: &TxInfo) -> FileInfo {
        FileInfo {
            tx: tx.clone(),
            finalized: self.finalized(layout, tx),
            is_cached: false,
            uploaded_seg_num: self.held(tx.seq),
        }
    }

    /// Consumes one injected data path fault, if any is left.
    fn take_fault(&mut self, node: &NodeAddress) -> Result<(), NodeError> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(NodeError::Timeout { node: node.clone() });
        }
        if self.backpressure > 0 {
            self.backpressure -= 1;
            return Err(NodeError::Backpressure {
                node: node.clone(),
                message: "too many data writing".into(),
            });
        }
        Ok(())
    }
}

fn already_finalized(node: &NodeAddress) -> NodeError {
    NodeError::Rpc {
        node: node.clone(),
        code: SERVER_ERROR,
        message: ALREADY_FINALIZED.into(),
    }
}

#[derive(Debug, Default)]
struct State {
    layout: Layout,
    next_entry: u64,
    txs: Vec<TxInfo>,
    nodes: BTreeMap<NodeAddress, MemoryNode>,
    reject_submissions: bool,
}

impl State {
    fn node(&self, address: &NodeAddress) -> Result<&MemoryNode, NodeError> {
        match self.nodes.get(address) {
            Some(node) if !node.offline => Ok(node),
            _ => Err(NodeError::Refused {
                node: address.clone(),
            }),
        }
    }

    fn node_mut(&mut self, address: &NodeAddress) -> Result<&mut MemoryNode, NodeError> {
        match self.nodes.get_mut(address) {
            Some(node) if !node.offline => Ok(node),
            _ => Err(NodeError::Refused {
                node: address.clone(),
            }),
        }
    }

    /// Latest log entry committing to `root`.
    fn tx_by_root(&self, root: &B256) -> Option<&TxInfo> {
        self.txs
            .iter()
            .rev()
            .find(|tx| tx.data_merkle_root == *root)
    }

    fn store(
        &mut self,
        address: &NodeAddress,
        segments: &[SegmentWithProof],
        tx: TxInfo,
    ) -> Result<(), NodeError> {
        let layout = self.layout;
        let node = self.node_mut(address)?;
        node.upload_calls += 1;
        node.take_fault(address)?;
        if node.finalized_replies > 0 {
            node.finalized_replies -= 1;
            return Err(already_finalized(address));
        }
        if node.finalized(&layout, &tx) {
            return Err(already_finalized(address));
        }

        let reject = |message: String| NodeError::Rpc {
            node: address.clone(),
            code: INVALID_PARAMS,
            message,
        };
        let start = tx.start_entry_index / layout.segment_max_chunks() as u64;
        for segment in segments {
            let index = segment.index;
            if segment.root != tx.data_merkle_root {
                return Err(reject(format!("root mismatch for segment {index}")));
            }
            if !node.config.covers(start + index) {
                let shard = node.config;
                return Err(reject(format!("segment {index} is not in shard {shard}")));
            }
            verify_segment(
                &layout,
                &tx.data_merkle_root,
                tx.size,
                index,
                &segment.data,
                &segment.proof,
            )
            .map_err(|err| reject(format!("invalid proof for segment {index}: {err}")))?;
        }
        for segment in segments {
            node.segments
                .insert((tx.seq, segment.index), segment.clone());
        }
        trace!(node = %address, tx_seq = tx.seq, segments = segments.len(), "Stored segments");
        Ok(())
    }

    /// A stored segment, corrupted when the node is set to tamper.
    fn load(
        &mut self,
        address: &NodeAddress,
        root: &B256,
        index: u64,
    ) -> Result<SegmentWithProof, NodeError> {
        let not_found = |message: String| NodeError::Rpc {
            node: address.clone(),
            code: SERVER_ERROR,
            message,
        };
        let seq = self
            .tx_by_root(root)
            .map(|tx| tx.seq)
            .ok_or_else(|| not_found("file not found".into()))?;
        let node = self.node_mut(address)?;
        node.take_fault(address)?;
        let mut segment = node
            .segments
            .get(&(seq, index))
            .cloned()
            .ok_or_else(|| not_found(format!("segment {index} not available")))?;
        if node.tamper {
            let mut data = BytesMut::from(&segment.data[..]);
            if let Some(byte) = data.first_mut() {
                *byte ^= 0xff;
            }
            segment.data = data.freeze();
        }
        Ok(segment)
    }
}

/// A shared, in-memory flow contract, indexer and set of storage nodes.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<State>>,
}

impl MemoryNetwork {
    /// An empty network with the default layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node serving `config`.
    pub fn add_node(&self, address: impl Into<NodeAddress>, config: ShardConfig) -> NodeAddress {
        let address = address.into();
        let node = MemoryNode {
            config,
            ..Default::default()
        };
        self.state.lock().nodes.insert(address.clone(), node);
        address
    }

    /// Every node as the uploader would learn it, all reported healthy.
    pub fn node_infos(&self) -> Vec<NodeShardInfo> {
        let state = self.state.lock();
        state
            .nodes
            .iter()
            .map(|(address, node)| NodeShardInfo::healthy(address.clone(), node.config))
            .collect()
    }

    fn with_node(&self, address: &NodeAddress, f: impl FnOnce(&mut MemoryNode)) {
        if let Some(node) = self.state.lock().nodes.get_mut(address) {
            f(node);
        }
    }

    /// Makes a node refuse every request.
    pub fn set_offline(&self, address: &NodeAddress, offline: bool) {
        self.with_node(address, |node| node.offline = offline);
    }

    /// Makes segment uploads and downloads to a node never answer.
    pub fn set_hang(&self, address: &NodeAddress, hang: bool) {
        self.with_node(address, |node| node.hang = hang);
    }

    /// Makes the next `count` data requests to a node time out.
    pub fn fail_next(&self, address: &NodeAddress, count: u32) {
        self.with_node(address, |node| node.transient_failures = count);
    }

    /// Makes the next `count` data requests to a node signal backpressure.
    pub fn backpressure_next(&self, address: &NodeAddress, count: u32) {
        self.with_node(address, |node| node.backpressure = count);
    }

    /// Makes the next `count` uploads to a node answer that the segments are
    /// already finalized, without storing them.
    pub fn finalized_next(&self, address: &NodeAddress, count: u32) {
        self.with_node(address, |node| node.finalized_replies = count);
    }

    /// Makes a node corrupt every segment it serves.
    pub fn set_tamper(&self, address: &NodeAddress, tamper: bool) {
        self.with_node(address, |node| node.tamper = tamper);
    }

    /// Makes the flow contract revert every submission.
    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }

    /// Number of accepted submissions.
    pub fn submissions(&self) -> usize {
        self.state.lock().txs.len()
    }

    /// Segments a node holds over all files.
    pub fn stored_segments(&self, address: &NodeAddress) -> usize {
        let state = self.state.lock();
        state
            .nodes
            .get(address)
            .map_or(0, |node| node.segments.len())
    }

    /// Upload requests a node received, rejected ones included.
    pub fn upload_calls(&self, address: &NodeAddress) -> usize {
        let state = self.state.lock();
        state.nodes.get(address).map_or(0, |node| node.upload_calls)
    }

    /// Never completes while the node is set to hang.
    async fn stall(&self, address: &NodeAddress) {
        let hang = self
            .state
            .lock()
            .nodes
            .get(address)
            .is_some_and(|node| node.hang);
        if hang {
            pending::<()>().await;
        }
    }
}

impl NodeRpc for MemoryNetwork {
    async fn status(&self, node: &NodeAddress) -> Result<Status, NodeError> {
        let state = self.state.lock();
        state.node(node)?;
        Ok(Status {
            connected_peers: state.nodes.len().saturating_sub(1) as u64,
            log_sync_height: state.next_entry,
            log_sync_block: B256::ZERO,
            next_tx_seq: state.txs.len() as u64,
        })
    }

    async fn shard_config(&self, node: &NodeAddress) -> Result<ShardConfig, NodeError> {
        Ok(self.state.lock().node(node)?.config)
    }

    async fn file_info(
        &self,
        node: &NodeAddress,
        root: &B256,
        _need_available: bool,
    ) -> Result<Option<FileInfo>, NodeError> {
        let state = self.state.lock();
        let node = state.node(node)?;
        let layout = &state.layout;
        Ok(state.tx_by_root(root).map(|tx| node.file_info(layout, tx)))
    }

    async fn file_info_by_tx_seq(
        &self,
        node: &NodeAddress,
        tx_seq: u64,
    ) -> Result<Option<FileInfo>, NodeError> {
        let state = self.state.lock();
        let node = state.node(node)?;
        let tx = state.txs.get(tx_seq as usize);
        Ok(tx.map(|tx| node.file_info(&state.layout, tx)))
    }

    async fn upload_segments(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
    ) -> Result<(), NodeError> {
        self.stall(node).await;
        let mut state = self.state.lock();
        let Some(root) = segments.first().map(|segment| segment.root) else {
            return Ok(());
        };
        let tx = state.tx_by_root(&root).cloned().ok_or_else(|| NodeError::Rpc {
            node: node.clone(),
            code: INVALID_PARAMS,
            message: format!("no log entry for {root}"),
        })?;
        state.store(node, segments, tx)
    }

    async fn upload_segments_by_tx_seq(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
        tx_seq: u64,
    ) -> Result<(), NodeError> {
        self.stall(node).await;
        let mut state = self.state.lock();
        let tx = state.txs.get(tx_seq as usize).cloned().ok_or_else(|| NodeError::Rpc {
            node: node.clone(),
            code: INVALID_PARAMS,
            message: format!("unknown tx seq {tx_seq}"),
        })?;
        state.store(node, segments, tx)
    }

    async fn download_segment(
        &self,
        node: &NodeAddress,
        root: &B256,
        start_chunk: u64,
        end_chunk: u64,
    ) -> Result<Bytes, NodeError> {
        self.stall(node).await;
        let mut state = self.state.lock();
        let layout = state.layout;
        let max_chunks = layout.segment_max_chunks() as u64;
        let segment = state.load(node, root, start_chunk / max_chunks)?;
        let len = (end_chunk.saturating_sub(start_chunk) * layout.chunk_size() as u64) as usize;
        Ok(segment.data.slice(..len.min(segment.data.len())))
    }

    async fn download_segment_with_proof(
        &self,
        node: &NodeAddress,
        root: &B256,
        index: u64,
    ) -> Result<SegmentWithProof, NodeError> {
        self.stall(node).await;
        self.state.lock().load(node, root, index)
    }
}

impl Indexer for MemoryNetwork {
    async fn sharded_nodes(&self) -> Result<ShardedNodes, NodeError> {
        let state = self.state.lock();
        let trusted = state
            .nodes
            .iter()
            .map(|(address, node)| NodeLocation {
                url: address.clone(),
                shard_config: node.config,
            })
            .collect();
        Ok(ShardedNodes {
            trusted,
            discovered: Vec::new(),
        })
    }

    async fn file_locations(&self, root: &B256) -> Result<Vec<NodeLocation>, NodeError> {
        let state = self.state.lock();
        let Some(tx) = state.tx_by_root(root) else {
            return Ok(Vec::new());
        };
        // the index is not refreshed on outages, offline nodes stay listed
        Ok(state
            .nodes
            .iter()
            .filter(|(_, node)| node.held(tx.seq) > 0 || node.finalized(&state.layout, tx))
            .map(|(address, node)| NodeLocation {
                url: address.clone(),
                shard_config: node.config,
            })
            .collect())
    }
}

impl Submitter for MemoryNetwork {
    async fn submit(
        &self,
        descriptor: &SubmissionDescriptor,
        fee: U256,
    ) -> Result<SubmitReceipt, ContractError> {
        let mut state = self.state.lock();
        if state.reject_submissions {
            return Err(ContractError::Rejected("execution reverted".into()));
        }

        let max_chunks = state.layout.segment_max_chunks() as u64;
        let seq = state.txs.len() as u64;
        let start = state.next_entry.div_ceil(max_chunks) * max_chunks;
        let length = state.layout.padded_chunks(descriptor.length);
        state.next_entry = start + length;
        state.txs.push(TxInfo {
            seq,
            data_merkle_root: descriptor.root,
            start_entry_index: start,
            size: descriptor.length,
        });

        let mut preimage = seq.to_be_bytes().to_vec();
        preimage.extend_from_slice(descriptor.root.as_slice());
        let tx_hash = keccak256(&preimage);

        let event = IFlow::Submit {
            sender: Address::ZERO,
            identity: keccak256(descriptor.root),
            submissionIndex: U256::from(seq),
            startPos: U256::from(start),
            length: U256::from(length),
            submission: descriptor.into(),
        };
        let log = event.encode_log_data();
        trace!(tx_seq = seq, start = start, fee = %fee, "Accepted submission");
        receipt_from_logs(tx_hash, descriptor.root, [(log.topics(), &log.data[..])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zgs_primitives::FileHandle;

    fn segments(file: &FileHandle, root: B256) -> Vec<SegmentWithProof> {
        file.iterate_segments()
            .map(|segment| {
                let segment = segment.unwrap();
                SegmentWithProof {
                    root,
                    data: segment.chunk_aligned(file.layout()),
                    index: segment.index,
                    proof: file.proof_at(segment.index).unwrap(),
                    file_size: file.size(),
                }
            })
            .collect()
    }

    async fn submit(network: &MemoryNetwork, file: &FileHandle) -> SubmitReceipt {
        let descriptor = file.submission(Vec::new()).unwrap();
        network.submit(&descriptor, U256::ZERO).await.unwrap()
    }

    #[tokio::test]
    async fn test_submissions_are_segment_aligned() {
        let network = MemoryNetwork::new();
        let small = FileHandle::from_bytes(vec![1u8; 100]);
        let first = submit(&network, &small).await;
        let second = submit(&network, &small).await;
        assert_eq!((first.tx_seq, second.tx_seq), (0, 1));
        assert_ne!(first.tx_hash, second.tx_hash);

        let state = network.state.lock();
        assert_eq!(state.txs[1].start_entry_index, 1024);
    }

    #[tokio::test]
    async fn test_node_finalizes_its_residue() {
        let network = MemoryNetwork::new();
        let even = network.add_node("even", ShardConfig::new(0, 2));
        let file = FileHandle::from_bytes(vec![3u8; 3 * 262_144]);
        let root = file.root_hash().unwrap();
        let seq = submit(&network, &file).await.tx_seq;
        let all = segments(&file, root);

        // segment 1 belongs to the odd shard
        let misplaced = network
            .upload_segments_by_tx_seq(&even, &all[1..2], seq)
            .await;
        assert!(misplaced.is_err());

        network
            .upload_segments_by_tx_seq(&even, &all[..1], seq)
            .await
            .unwrap();
        let info = network
            .file_info(&even, &root, true)
            .await
            .unwrap()
            .unwrap();
        assert!(!info.finalized);

        network.upload_segments(&even, &all[2..]).await.unwrap();
        let info = network
            .file_info(&even, &root, true)
            .await
            .unwrap()
            .unwrap();
        assert!(info.finalized);
        assert_eq!(info.uploaded_seg_num, 2);

        let again = network
            .upload_segments_by_tx_seq(&even, &all[..1], seq)
            .await
            .unwrap_err();
        assert!(again.is_already_finalized());
        assert!(!again.is_transient());
    }

    #[tokio::test]
    async fn test_rejects_bad_proof() {
        let network = MemoryNetwork::new();
        let node = network.add_node("n", ShardConfig::FULL);
        let file = FileHandle::from_bytes(vec![9u8; 2 * 262_144]);
        let root = file.root_hash().unwrap();
        let seq = submit(&network, &file).await.tx_seq;

        let mut all = segments(&file, root);
        all[0].proof = all[1].proof.clone();
        let err = network
            .upload_segments_by_tx_seq(&node, &all[..1], seq)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Rpc { code: INVALID_PARAMS, .. }));
        assert_eq!(network.stored_segments(&node), 0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let network = MemoryNetwork::new();
        let node = network.add_node("n", ShardConfig::FULL);

        network.fail_next(&node, 1);
        network.backpressure_next(&node, 1);
        network.finalized_next(&node, 1);
        let unknown = network.upload_segments_by_tx_seq(&node, &[], 0).await;
        assert!(matches!(unknown, Err(NodeError::Rpc { .. })));

        submit(&network, &FileHandle::from_bytes(vec![0u8; 10])).await;
        let upload = || network.upload_segments_by_tx_seq(&node, &[], 0);
        assert!(matches!(upload().await, Err(NodeError::Timeout { .. })));
        assert!(matches!(upload().await, Err(NodeError::Backpressure { .. })));
        assert!(upload().await.unwrap_err().is_already_finalized());
        assert!(upload().await.is_ok());
        assert_eq!(network.stored_segments(&node), 0);

        network.set_offline(&node, true);
        assert!(matches!(network.status(&node).await, Err(NodeError::Refused { .. })));
        network.set_offline(&node, false);
        assert!(network.status(&node).await.is_ok());

        network.reject_submissions(true);
        let descriptor = FileHandle::from_bytes(vec![0u8; 10])
            .submission(Vec::new())
            .unwrap();
        let rejected = network.submit(&descriptor, U256::ZERO).await;
        assert!(matches!(rejected, Err(ContractError::Rejected(_))));
        assert_eq!(network.submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_node() {
        let network = MemoryNetwork::new();
        let node = network.add_node("n", ShardConfig::FULL);
        let file = FileHandle::from_bytes(vec![2u8; 1000]);
        let root = file.root_hash().unwrap();
        let seq = submit(&network, &file).await.tx_seq;
        let all = segments(&file, root);

        network.set_hang(&node, true);
        let upload = network.upload_segments_by_tx_seq(&node, &all, seq);
        let timeout = std::time::Duration::from_secs(5);
        assert!(tokio::time::timeout(timeout, upload).await.is_err());
        assert_eq!(network.upload_calls(&node), 0);
        // control queries still answer
        assert!(network.status(&node).await.is_ok());

        network.set_hang(&node, false);
        network
            .upload_segments_by_tx_seq(&node, &all, seq)
            .await
            .unwrap();
        assert_eq!(network.stored_segments(&node), 1);
    }

    #[tokio::test]
    async fn test_indexer_lists_holders() {
        let network = MemoryNetwork::new();
        let holder = network.add_node("holder", ShardConfig::FULL);
        network.add_node("idle", ShardConfig::FULL);
        let file = FileHandle::from_bytes(vec![4u8; 1000]);
        let root = file.root_hash().unwrap();
        let seq = submit(&network, &file).await.tx_seq;
        let all = segments(&file, root);
        network
            .upload_segments_by_tx_seq(&holder, &all, seq)
            .await
            .unwrap();

        assert_eq!(network.sharded_nodes().await.unwrap().trusted.len(), 2);
        let locations = network.file_locations(&root).await.unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].url, holder);
        let unknown = network.file_locations(&B256::ZERO).await.unwrap();
        assert!(unknown.is_empty());
    }
}
