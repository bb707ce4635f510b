//! Sharded, replicated file upload.
//!
//! An upload runs in four phases:
//!
//! 1. Build the file tree and submission descriptor, and check that the known
//!    nodes can hold the requested replicas before anything is paid for.
//! 2. Short-circuit when a node already has the file finalized, otherwise
//!    submit the descriptor (or reuse an existing log entry with `skip_tx`)
//!    and wait until nodes see the log entry.
//! 3. Cut the segments into tasks and push every segment to its target nodes
//!    with bounded concurrency, retrying transient failures.
//! 4. Tally acknowledgements, optionally wait for finality, and report the
//!    outcome together with any replication shortfall.

use std::{collections::BTreeSet, sync::OnceLock};

use alloy_primitives::B256;
use futures::{StreamExt, TryStreamExt, future::join_all, stream};
use tracing::{debug, info, instrument, warn};
use zgs_primitives::FileHandle;

use crate::{
    config::{TransferConfig, UploadOptions},
    error::{NodeError, SelectionError, UploadError},
    node::{FileInfo, NodeAddress, NodeRpc, NodeShardInfo, SegmentWithProof, Submitter, TxInfo},
    selector::NodeSelector,
    task::{Ledger, PushFailure, SegmentTally, TaskStatus, UploadTask},
};

/// A segment that did not reach every target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationShortfall {
    /// File-relative segment index.
    pub segment: u64,
    /// Nodes that acknowledged the segment.
    pub acknowledged: usize,
    /// Nodes the segment was sent to.
    pub targets: usize,
    /// Acknowledgements the upload asked for.
    pub required: usize,
    /// Pushes that failed.
    pub failures: Vec<PushFailure>,
}

/// How an upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every segment reached every target.
    Complete,
    /// Every segment reached at least one node but some pushes failed.
    CompleteWithWarnings(Vec<ReplicationShortfall>),
    /// A node already had the file finalized; nothing was sent.
    AlreadyFinalized,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    /// File root.
    pub root: B256,
    /// Submission transaction, `None` when no transaction was sent.
    pub tx_hash: Option<B256>,
    /// Log entry of the file, when one is known.
    pub tx_seq: Option<u64>,
    /// Replication outcome.
    pub outcome: UploadOutcome,
}

impl SubmissionResult {
    /// Whether the upload succeeded only partially.
    pub const fn has_warnings(&self) -> bool {
        matches!(self.outcome, UploadOutcome::CompleteWithWarnings(_))
    }

    /// Shortfalls reported by the upload, empty unless it has warnings.
    pub fn shortfalls(&self) -> &[ReplicationShortfall] {
        match &self.outcome {
            UploadOutcome::CompleteWithWarnings(shortfalls) => shortfalls,
            _ => &[],
        }
    }
}

/// Uploads files to storage nodes.
#[derive(Debug)]
pub struct Uploader<N, S> {
    rpc: N,
    submitter: S,
    config: TransferConfig,
}

impl<N: NodeRpc, S: Submitter> Uploader<N, S> {
    /// Creates an uploader.
    pub const fn new(rpc: N, submitter: S, config: TransferConfig) -> Self {
        Self {
            rpc,
            submitter,
            config,
        }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads `file` to `nodes`.
    ///
    /// The whole operation is bounded by the configured timeout. Once it
    /// elapses outstanding pushes are dropped and no acknowledgement is
    /// recorded any more.
    #[instrument(skip_all, fields(size = file.size(), replica = options.expected_replica))]
    pub async fn upload(
        &self,
        file: &FileHandle,
        nodes: &[NodeShardInfo],
        options: &UploadOptions,
    ) -> Result<SubmissionResult, UploadError> {
        self.config.validate()?;
        let ledger = OnceLock::new();
        let timeout = self.config.timeout();

        match tokio::time::timeout(timeout, self.run(file, nodes, options, &ledger)).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(ledger) = ledger.get() {
                    ledger.close();
                }
                warn!(timeout_secs = timeout.as_secs(), "Upload timed out");
                Err(UploadError::Timeout(timeout))
            }
        }
    }

    async fn run(
        &self,
        file: &FileHandle,
        nodes: &[NodeShardInfo],
        options: &UploadOptions,
        slot: &OnceLock<Ledger>,
    ) -> Result<SubmissionResult, UploadError> {
        let layout = &self.config.layout;
        if file.layout() != layout {
            return Err(SelectionError::configuration(format!(
                "file layout {:?} differs from the configured layout {layout:?}",
                file.layout()
            ))
            .into());
        }
        let descriptor = file.submission(options.tags.clone())?;
        let root = descriptor.root;
        let num_segments = file.num_segments();

        let selector = NodeSelector::new(nodes.iter().cloned());
        selector.check_replica(options.expected_replica)?;
        let candidates: Vec<NodeAddress> = selector
            .nodes()
            .into_iter()
            .map(|n| n.address.clone())
            .collect();

        let existing = self.file_infos(&candidates, &root).await;
        if let Some(info) = existing.iter().find(|info| info.finalized) {
            info!(root = %root, tx_seq = info.tx.seq, "File already finalized, skipping upload");
            return Ok(SubmissionResult {
                root,
                tx_hash: None,
                tx_seq: Some(info.tx.seq),
                outcome: UploadOutcome::AlreadyFinalized,
            });
        }

        let (tx_hash, tx) = match existing.into_iter().next() {
            Some(info) if options.skip_tx => {
                info!(root = %root, tx_seq = info.tx.seq, "Reusing existing log entry");
                (None, info.tx)
            }
            existing => {
                if options.skip_tx && existing.is_none() {
                    debug!(root = %root, "No log entry to reuse, submitting");
                }
                let receipt = self.submitter.submit(&descriptor, options.fee).await?;
                info!(
                    root = %root,
                    tx_hash = %receipt.tx_hash,
                    tx_seq = receipt.tx_seq,
                    sectors = descriptor.sectors(),
                    "Submitted file"
                );
                let tx = self
                    .wait_for_log_entry(&candidates, &root, receipt.tx_seq)
                    .await;
                (Some(receipt.tx_hash), tx)
            }
        };

        let start = tx.start_entry_index / layout.segment_max_chunks() as u64;
        let selection = selector.select(start, num_segments, options.expected_replica)?;
        let tasks = UploadTask::partition(&selection, num_segments, options.task_size);
        let task_count = tasks.len();
        let required = if options.finality_required {
            options.expected_replica
        } else {
            1
        };
        let ledger = slot.get_or_init(|| Ledger::new(tasks, &selection, num_segments, required));
        info!(
            root = %root,
            tx_seq = tx.seq,
            segments = num_segments,
            tasks = task_count,
            nodes = selection.nodes().len(),
            "Uploading segments"
        );

        stream::iter(0..task_count)
            .map(|id| self.run_task(file, ledger, id, root, tx.seq))
            .buffer_unordered(self.config.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        debug!(settled = ledger.is_settled(), "Upload tasks ran");
        let tallies = ledger.close();
        let shortfalls = settle(&tallies, ledger.required())?;

        if options.finality_required {
            let failed: BTreeSet<&NodeAddress> = tallies
                .iter()
                .flat_map(|tally| tally.failures.iter().map(|f| &f.node))
                .collect();
            let replicas: Vec<NodeAddress> = selection
                .nodes()
                .into_iter()
                .filter(|node| !failed.contains(node))
                .cloned()
                .collect();
            self.wait_for_finality(&replicas, &root).await?;
        }

        let outcome = if shortfalls.is_empty() {
            info!(root = %root, "Upload complete");
            UploadOutcome::Complete
        } else {
            let segments = shortfalls.len();
            warn!(root = %root, segments = segments, "Upload complete with replication shortfall");
            UploadOutcome::CompleteWithWarnings(shortfalls)
        };
        Ok(SubmissionResult {
            root,
            tx_hash,
            tx_seq: Some(tx.seq),
            outcome,
        })
    }

    /// Pushes the segments of task `id` to each of their targets.
    async fn run_task(
        &self,
        file: &FileHandle,
        ledger: &Ledger,
        id: usize,
        root: B256,
        tx_seq: u64,
    ) -> Result<(), UploadError> {
        let Some(assignments) = ledger.start(id) else {
            return Ok(());
        };

        let indices: BTreeSet<u64> = assignments.values().flatten().copied().collect();
        let mut segments = Vec::with_capacity(indices.len());
        for index in indices {
            segments.push(self.segment_with_proof(file, root, index)?);
        }

        let pushes = assignments.iter().map(|(node, indices)| {
            let batch: Vec<SegmentWithProof> = segments
                .iter()
                .filter(|s| indices.contains(&s.index))
                .cloned()
                .collect();
            async move {
                let batch = &batch;
                let outcome = self
                    .config
                    .retry
                    .run(|attempt| async move {
                        debug!(
                            node = %node,
                            segments = batch.len(),
                            attempt = attempt,
                            "Pushing segments"
                        );
                        self.push(node, batch, tx_seq).await.map(|()| attempt)
                    })
                    .await;
                (node, indices, outcome)
            }
        });

        for (node, indices, outcome) in join_all(pushes).await {
            if let Err(exhausted) = &outcome {
                warn!(
                    node = %node,
                    segments = ?indices,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "Segment push failed"
                );
            }
            ledger.record(id, node, indices, outcome);
        }
        if let Some(TaskStatus::Failed { segment }) = ledger.finish(id) {
            warn!(task = id, segment = segment, "Upload task left a segment without any replica");
        }
        Ok(())
    }

    async fn push(
        &self,
        node: &NodeAddress,
        batch: &[SegmentWithProof],
        tx_seq: u64,
    ) -> Result<(), NodeError> {
        let outcome = self
            .rpc
            .upload_segments_by_tx_seq(node, batch, tx_seq)
            .await;
        match outcome {
            Err(err) if err.is_already_finalized() => {
                debug!(node = %node, "Segments already finalized on node");
                Ok(())
            }
            other => other,
        }
    }

    fn segment_with_proof(
        &self,
        file: &FileHandle,
        root: B256,
        index: u64,
    ) -> Result<SegmentWithProof, UploadError> {
        let segment = file.read_segment(index)?;
        let proof = file.proof_at(index)?;
        Ok(SegmentWithProof {
            root,
            data: segment.chunk_aligned(&self.config.layout),
            index,
            proof,
            file_size: file.size(),
        })
    }

    /// File info from every node that answers, finalized entries first.
    async fn file_infos(&self, nodes: &[NodeAddress], root: &B256) -> Vec<FileInfo> {
        let answers = join_all(nodes.iter().map(|node| async move {
            self.rpc.file_info(node, root, true).await.map_err(|err| {
                debug!(node = %node, error = %err, "File info query failed");
            })
        }))
        .await;
        let mut infos: Vec<FileInfo> = answers
            .into_iter()
            .filter_map(|answer| answer.ok().flatten())
            .collect();
        infos.sort_by_key(|info| !info.finalized);
        infos
    }

    /// Polls until a node reports log entry `tx_seq`.
    async fn wait_for_log_entry(&self, nodes: &[NodeAddress], root: &B256, tx_seq: u64) -> TxInfo {
        let mut polls = 0u64;
        loop {
            for node in nodes {
                match self.rpc.file_info_by_tx_seq(node, tx_seq).await {
                    Ok(Some(info)) if info.tx.data_merkle_root == *root => return info.tx,
                    Ok(Some(info)) => {
                        warn!(
                            node = %node,
                            tx_seq = tx_seq,
                            found = %info.tx.data_merkle_root,
                            "Log entry root differs"
                        );
                    }
                    Ok(None) => {}
                    Err(err) => debug!(node = %node, error = %err, "Log entry query failed"),
                }
            }
            polls += 1;
            debug!(tx_seq = tx_seq, polls = polls, "Waiting for log entry");
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Polls until every node in `nodes` reports the file finalized.
    async fn wait_for_finality(
        &self,
        nodes: &[NodeAddress],
        root: &B256,
    ) -> Result<(), UploadError> {
        let mut pending: Vec<&NodeAddress> = nodes.iter().collect();
        let mut polls = 0u32;
        loop {
            let mut still_pending = Vec::new();
            for node in pending {
                match self.rpc.file_info(node, root, true).await {
                    Ok(Some(info)) if info.finalized => {}
                    Ok(_) => still_pending.push(node),
                    Err(err) => {
                        debug!(node = %node, error = %err, "Finality query failed");
                        still_pending.push(node);
                    }
                }
            }
            pending = still_pending;
            if pending.is_empty() {
                info!(root = %root, nodes = nodes.len(), "File finalized");
                return Ok(());
            }

            polls += 1;
            let limit = self.config.finality_poll_limit;
            if limit.is_some_and(|limit| polls >= limit) {
                return Err(UploadError::NotFinalized {
                    nodes: pending.into_iter().cloned().collect(),
                });
            }
            debug!(root = %root, pending = pending.len(), "Waiting for finality");
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

/// Fails on a segment nobody acknowledged and collects the shortfalls.
fn settle(
    tallies: &[SegmentTally],
    required: usize,
) -> Result<Vec<ReplicationShortfall>, UploadError> {
    let mut shortfalls = Vec::new();
    for (segment, tally) in (0u64..).zip(tallies) {
        if tally.acks.is_empty() {
            if let Some(last) = tally.failures.last() {
                return Err(UploadError::Replication {
                    segment,
                    node: last.node.clone(),
                    attempts: last.attempts,
                    source: last.error.clone(),
                });
            }
        }
        if tally.acks.len() < required || !tally.failures.is_empty() {
            shortfalls.push(ReplicationShortfall {
                segment,
                acknowledged: tally.acks.len(),
                targets: tally.targets,
                required,
                failures: tally.failures.clone(),
            });
        }
    }
    Ok(shortfalls)
}
