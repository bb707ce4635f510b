//! Placement of segments on sharded storage nodes.
//!
//! Nodes are grouped by shard count. Within a group a residue table maps
//! `index % num_shard` straight to the nodes serving it, so a lookup costs a
//! modulo and an index once the table is built. Groups are never merged: a
//! replica count must be satisfiable inside one group.

use std::collections::{BTreeMap, btree_map::Entry};

use tracing::{debug, warn};

use crate::{
    error::SelectionError,
    node::{NodeAddress, NodeHealth, NodeShardInfo},
};

/// Nodes of one shard count, indexed by residue.
#[derive(Debug, Clone)]
struct ShardGroup {
    num_shard: u64,
    residues: Vec<Vec<NodeShardInfo>>,
}

impl ShardGroup {
    #[inline]
    fn nodes(&self, index: u64) -> &[NodeShardInfo] {
        &self.residues[(index % self.num_shard) as usize]
    }
}

/// Index of the eligible nodes of a network.
#[derive(Debug, Clone, Default)]
pub struct NodeSelector {
    groups: Vec<ShardGroup>,
    eligible: usize,
}

fn rank(node: &NodeShardInfo) -> (NodeHealth, &NodeAddress) {
    (node.health, &node.address)
}

impl NodeSelector {
    /// Indexes `nodes`.
    ///
    /// Nodes with an invalid shard config and unavailable nodes are dropped.
    /// A node listed more than once keeps its healthiest advertisement.
    pub fn new(nodes: impl IntoIterator<Item = NodeShardInfo>) -> Self {
        let mut unique: BTreeMap<NodeAddress, NodeShardInfo> = BTreeMap::new();
        for node in nodes {
            if !node.config.is_valid() {
                warn!(
                    node = %node.address,
                    shard = %node.config,
                    "Ignoring node with invalid shard config"
                );
                continue;
            }
            if node.health == NodeHealth::Unavailable {
                debug!(node = %node.address, "Skipping unavailable node");
                continue;
            }
            match unique.entry(node.address.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(node);
                }
                Entry::Occupied(mut entry) if node.health < entry.get().health => {
                    entry.insert(node);
                }
                Entry::Occupied(_) => {}
            }
        }

        let eligible = unique.len();
        let mut groups: BTreeMap<u64, ShardGroup> = BTreeMap::new();
        for node in unique.into_values() {
            let num_shard = node.config.num_shard;
            let group = groups.entry(num_shard).or_insert_with(|| ShardGroup {
                num_shard,
                residues: vec![Vec::new(); num_shard as usize],
            });
            group.residues[node.config.shard_id as usize].push(node);
        }
        for group in groups.values_mut() {
            for residue in &mut group.residues {
                residue.sort_by(|a, b| rank(a).cmp(&rank(b)));
            }
        }

        Self {
            groups: groups.into_values().collect(),
            eligible,
        }
    }

    /// Number of distinct selectable nodes.
    pub const fn eligible(&self) -> usize {
        self.eligible
    }

    /// Every selectable node, in address order.
    pub fn nodes(&self) -> Vec<&NodeShardInfo> {
        let mut nodes: Vec<_> = self
            .groups
            .iter()
            .flat_map(|g| g.residues.iter().flatten())
            .collect();
        nodes.sort_by(|a, b| a.address.cmp(&b.address));
        nodes
    }

    /// Every node serving global segment `index`, best first.
    pub fn responsible(&self, index: u64) -> Vec<&NodeShardInfo> {
        let mut nodes: Vec<_> = self.groups.iter().flat_map(|g| g.nodes(index)).collect();
        nodes.sort_by(|a, b| rank(a).cmp(&rank(b)));
        nodes
    }

    /// Checks that some group can hold `replica` copies of every residue.
    pub fn check_replica(&self, replica: usize) -> Result<(), SelectionError> {
        let span = self.groups.iter().map(|g| g.num_shard).max().unwrap_or(1);
        self.select(0, span, replica).map(drop)
    }

    /// Chooses `replica` nodes for each of the `count` segments starting at
    /// global index `start`.
    ///
    /// The group with the fewest shards that satisfies every segment wins.
    pub fn select(
        &self,
        start: u64,
        count: u64,
        replica: usize,
    ) -> Result<Selection, SelectionError> {
        if replica == 0 {
            return Err(SelectionError::configuration("replica count must be at least one"));
        }
        if replica > self.eligible {
            return Err(SelectionError::configuration(format!(
                "replica count {replica} exceeds the {} eligible nodes",
                self.eligible
            )));
        }

        for group in &self.groups {
            // a full period of residues decides every index
            let span = count.min(group.num_shard);
            if (start..start + span).all(|index| group.nodes(index).len() >= replica) {
                debug!(
                    num_shard = group.num_shard,
                    replica = replica,
                    start = start,
                    count = count,
                    "Selected shard group"
                );
                let targets = group
                    .residues
                    .iter()
                    .map(|nodes| {
                        nodes
                            .iter()
                            .take(replica)
                            .map(|n| n.address.clone())
                            .collect()
                    })
                    .collect();
                return Ok(Selection {
                    start,
                    count,
                    num_shard: group.num_shard,
                    targets,
                });
            }
        }

        let span = count.min(self.groups.iter().map(|g| g.num_shard).max().unwrap_or(1));
        for index in start..start + span {
            let available = self.responsible(index).len();
            if available < replica {
                return Err(SelectionError::InsufficientNodes {
                    segment: index - start,
                    available,
                    required: replica,
                });
            }
        }
        Err(SelectionError::configuration(format!(
            "replica count {replica} is only reachable by mixing shard generations"
        )))
    }
}

/// Target nodes of a run of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    start: u64,
    count: u64,
    num_shard: u64,
    targets: Vec<Vec<NodeAddress>>,
}

impl Selection {
    /// Global index of the first segment.
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Number of segments.
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Shard count of the chosen group.
    pub const fn num_shard(&self) -> u64 {
        self.num_shard
    }

    /// Targets of file-relative segment `index`, best first.
    pub fn targets(&self, index: u64) -> &[NodeAddress] {
        &self.targets[((self.start + index) % self.num_shard) as usize]
    }

    /// Every node receiving at least one segment, in address order.
    pub fn nodes(&self) -> Vec<&NodeAddress> {
        let period = self.count.min(self.num_shard);
        let mut nodes: Vec<_> = (0..period).flat_map(|i| self.targets(i)).collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}
