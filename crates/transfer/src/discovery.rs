//! Building the node list an upload is placed on.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    error::Result,
    node::{Indexer, NodeAddress, NodeHealth, NodeLocation, NodeRpc, NodeShardInfo, ShardConfig},
};

/// Asks each node for its shard and status.
///
/// Nodes that do not answer the shard query are reported unavailable, nodes
/// that answer it but fail the status query are reported degraded.
pub async fn probe_nodes<N: NodeRpc>(rpc: &N, addresses: &[NodeAddress]) -> Vec<NodeShardInfo> {
    join_all(addresses.iter().map(|address| async move {
        let config = match rpc.shard_config(address).await {
            Ok(config) => config,
            Err(err) => {
                warn!(node = %address, error = %err, "Shard config query failed");
                return NodeShardInfo {
                    address: address.clone(),
                    config: ShardConfig::FULL,
                    health: NodeHealth::Unavailable,
                };
            }
        };
        let health = match rpc.status(address).await {
            Ok(status) => {
                debug!(
                    node = %address,
                    shard = %config,
                    next_tx_seq = status.next_tx_seq,
                    "Probed node"
                );
                NodeHealth::Healthy
            }
            Err(err) => {
                debug!(node = %address, error = %err, "Status query failed");
                NodeHealth::Degraded
            }
        };
        NodeShardInfo {
            address: address.clone(),
            config,
            health,
        }
    }))
    .await
}

/// Lists the indexer's nodes, trusted ones healthy and discovered ones degraded.
pub async fn discover_nodes<I: Indexer>(indexer: &I) -> Result<Vec<NodeShardInfo>> {
    let nodes = indexer.sharded_nodes().await?;
    let info = |location: NodeLocation, health| NodeShardInfo {
        address: location.url,
        config: location.shard_config,
        health,
    };
    let trusted = nodes
        .trusted
        .into_iter()
        .map(|location| info(location, NodeHealth::Healthy));
    let discovered = nodes
        .discovered
        .into_iter()
        .map(|location| info(location, NodeHealth::Degraded));
    Ok(trusted.chain(discovered).collect())
}
