//! Ordered, optionally verified file download.

use std::path::Path;

use alloy_primitives::B256;
use bytes::Bytes;
use futures::{StreamExt, future::join_all, stream};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use zgs_primitives::verify_segment;

use crate::{
    config::{DownloadOptions, TransferConfig},
    error::DownloadError,
    node::{FileInfo, Indexer, NodeHealth, NodeRpc, NodeShardInfo},
    selector::NodeSelector,
};

/// A resolved file: its log entry and the nodes serving it.
#[derive(Debug)]
struct Resolved {
    info: FileInfo,
    selector: NodeSelector,
}

/// Downloads files from storage nodes.
#[derive(Debug)]
pub struct Downloader<N, I> {
    rpc: N,
    indexer: I,
    config: TransferConfig,
}

impl<N: NodeRpc, I: Indexer> Downloader<N, I> {
    /// Creates a downloader.
    pub const fn new(rpc: N, indexer: I, config: TransferConfig) -> Self {
        Self {
            rpc,
            indexer,
            config,
        }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Downloads the file committed to by `root` into a new file at `path`.
    ///
    /// Refuses to overwrite an existing path. A partially written file is
    /// removed when the download fails.
    pub async fn download(
        &self,
        root: B256,
        path: impl AsRef<Path>,
        options: &DownloadOptions,
    ) -> Result<u64, DownloadError> {
        let path = path.as_ref();
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        let file = opened.map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                DownloadError::DestinationExists(path.to_path_buf())
            } else {
                DownloadError::Io(err)
            }
        })?;

        let mut writer = BufWriter::new(file);
        let result = self.download_to(root, &mut writer, options).await;
        drop(writer);
        if result.is_err() {
            if let Err(err) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %err, "Failed to remove partial download");
            }
        }
        result
    }

    /// Writes the file committed to by `root` to `writer` in order.
    ///
    /// Returns the number of bytes written. The whole operation is bounded by
    /// the configured timeout; nothing is written after it elapses.
    #[instrument(skip_all, fields(root = %root, verify = options.verify_proof))]
    pub async fn download_to<W: AsyncWrite + Unpin>(
        &self,
        root: B256,
        writer: &mut W,
        options: &DownloadOptions,
    ) -> Result<u64, DownloadError> {
        self.config.validate()?;
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.run(root, writer, options)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Download timed out");
                Err(DownloadError::Timeout(timeout))
            }
        }
    }

    async fn run<W: AsyncWrite + Unpin>(
        &self,
        root: B256,
        writer: &mut W,
        options: &DownloadOptions,
    ) -> Result<u64, DownloadError> {
        let Resolved { info, selector } = self.resolve(root).await?;
        let layout = &self.config.layout;
        let size = info.tx.size;
        let num_segments = layout.num_segments(size);
        let start = info.tx.start_entry_index / layout.segment_max_chunks() as u64;
        info!(
            size = size,
            segments = num_segments,
            nodes = selector.eligible(),
            "Downloading file"
        );

        let mut segments = stream::iter(0..num_segments)
            .map(|index| self.fetch(&selector, root, size, start + index, index, options))
            .buffered(self.config.concurrency);

        let mut written = 0u64;
        while let Some(data) = segments.next().await {
            let data = data?;
            writer.write_all(&data).await?;
            written += data.len() as u64;
        }
        writer.flush().await?;

        info!(bytes = written, "Download complete");
        Ok(written)
    }

    /// Looks up the nodes holding `root` and the file's log entry.
    async fn resolve(&self, root: B256) -> Result<Resolved, DownloadError> {
        let locations = self
            .indexer
            .file_locations(&root)
            .await
            .map_err(DownloadError::Lookup)?;
        if locations.is_empty() {
            return Err(DownloadError::NotFound { root });
        }

        let urls: Vec<_> = locations.iter().map(|location| &location.url).collect();
        let answers = join_all(urls.iter().map(|url| self.rpc.file_info(url, &root, true))).await;

        let mut best: Option<FileInfo> = None;
        let mut nodes = Vec::with_capacity(locations.len());
        for (location, answer) in locations.into_iter().zip(answers) {
            let health = match answer {
                Ok(Some(info)) => {
                    let health = if info.finalized {
                        NodeHealth::Healthy
                    } else {
                        NodeHealth::Degraded
                    };
                    if best.as_ref().is_none_or(|b| !b.finalized && info.finalized) {
                        best = Some(info);
                    }
                    health
                }
                Ok(None) => NodeHealth::Degraded,
                Err(err) => {
                    debug!(node = %location.url, error = %err, "File info query failed");
                    NodeHealth::Unavailable
                }
            };
            nodes.push(NodeShardInfo {
                address: location.url,
                config: location.shard_config,
                health,
            });
        }

        match best {
            None => Err(DownloadError::NotFound { root }),
            Some(info) if !info.finalized => Err(DownloadError::NotFinalized { root }),
            Some(info) => Ok(Resolved {
                info,
                selector: NodeSelector::new(nodes),
            }),
        }
    }

    /// Fetches file-relative segment `index` (global `global`), trying each
    /// candidate in turn.
    async fn fetch(
        &self,
        selector: &NodeSelector,
        root: B256,
        size: u64,
        global: u64,
        index: u64,
        options: &DownloadOptions,
    ) -> Result<Bytes, DownloadError> {
        let layout = &self.config.layout;
        let max_chunks = layout.segment_max_chunks() as u64;
        let start_chunk = index * max_chunks;
        let end_chunk = (start_chunk + max_chunks).min(layout.num_chunks(size));
        let expected_len = ((end_chunk - start_chunk) * layout.chunk_size() as u64) as usize;
        let remaining = size - index * layout.segment_size() as u64;
        let data_len = remaining.min(expected_len as u64) as usize;

        let rpc = &self.rpc;
        let mut attempts = 0u32;
        let mut last_error = None;
        for candidate in selector.responsible(global) {
            let node = &candidate.address;
            let fetched = if options.verify_proof {
                self.config
                    .retry
                    .run(|_| rpc.download_segment_with_proof(node, &root, index))
                    .await
                    .map(|segment| {
                        let checked = if segment.index != index || segment.root != root {
                            let (got, of) = (segment.index, segment.root);
                            Err(format!("node returned segment {got} of {of}"))
                        } else {
                            let (data, proof) = (&segment.data, &segment.proof);
                            verify_segment(layout, &root, size, index, data, proof)
                                .map_err(|err| err.to_string())
                        };
                        (segment.data, checked)
                    })
            } else {
                self.config
                    .retry
                    .run(|_| rpc.download_segment(node, &root, start_chunk, end_chunk))
                    .await
                    .map(|data| (data, Ok(())))
            };

            let (data, checked) = match fetched {
                Ok(fetched) => fetched,
                Err(exhausted) => {
                    attempts += exhausted.attempts;
                    warn!(
                        node = %node,
                        segment = index,
                        attempts = exhausted.attempts,
                        error = %exhausted.error,
                        "Segment fetch failed, trying next candidate"
                    );
                    last_error = Some(exhausted.error.to_string());
                    continue;
                }
            };
            attempts += 1;

            if data.len() != expected_len {
                warn!(
                    node = %node,
                    segment = index,
                    len = data.len(),
                    expected = expected_len,
                    "Segment length mismatch"
                );
                let len = data.len();
                last_error = Some(format!("{node} returned {len} bytes, expected {expected_len}"));
                continue;
            }
            if let Err(reason) = checked {
                warn!(
                    node = %node,
                    segment = index,
                    reason = %reason,
                    "Segment failed verification"
                );
                last_error = Some(format!("{node}: {reason}"));
                continue;
            }

            debug!(node = %node, segment = index, "Segment fetched");
            return Ok(data.slice(..data_len));
        }

        Err(DownloadError::IncompleteFile {
            segment: index,
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use crate::{
        memory::MemoryNetwork,
        node::{SegmentWithProof, ShardConfig, Submitter},
        retry::RetryPolicy,
    };
    use zgs_primitives::FileHandle;

    fn downloader(network: &MemoryNetwork) -> Downloader<MemoryNetwork, MemoryNetwork> {
        let config = TransferConfig {
            retry: RetryPolicy::immediate(2),
            ..Default::default()
        };
        Downloader::new(network.clone(), network.clone(), config)
    }

    #[tokio::test]
    async fn test_unknown_root() {
        let network = MemoryNetwork::new();
        network.add_node("http://a", ShardConfig::FULL);

        let mut out = Vec::new();
        let unknown = B256::repeat_byte(1);
        let options = DownloadOptions::default();
        let err = downloader(&network)
            .download_to(unknown, &mut out, &options)
            .await;
        assert!(matches!(err, Err(DownloadError::NotFound { .. })));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unfinalized_file() {
        let network = MemoryNetwork::new();
        let node = network.add_node("http://a", ShardConfig::FULL);
        let file = FileHandle::from_bytes(vec![7u8; 300_000]);
        let root = file.root_hash().unwrap();
        let descriptor = file.submission(Vec::new()).unwrap();
        let receipt = network.submit(&descriptor, U256::ZERO).await.unwrap();

        // only the first of two segments arrives
        let segment = file.read_segment(0).unwrap();
        let first = SegmentWithProof {
            root,
            data: segment.chunk_aligned(file.layout()),
            index: 0,
            proof: file.proof_at(0).unwrap(),
            file_size: file.size(),
        };
        network
            .upload_segments_by_tx_seq(&node, &[first], receipt.tx_seq)
            .await
            .unwrap();

        let options = DownloadOptions::default();
        let err = downloader(&network)
            .download_to(root, &mut Vec::new(), &options)
            .await;
        assert!(matches!(err, Err(DownloadError::NotFinalized { root: r }) if r == root));
    }
}
