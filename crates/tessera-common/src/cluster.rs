use serde::{Deserialize, Serialize};

use crate::{NodeRecord, NodeStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub total_capacity_cores: u64,
    pub active_requests: u64,
}

/// Read view returned by `GET /cluster/status`. Computed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub stats: ClusterStats,
}

impl ClusterSnapshot {
    pub fn from_nodes(nodes: Vec<NodeRecord>) -> Self {
        let stats = ClusterStats {
            total_nodes: nodes.len(),
            healthy_nodes: nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Healthy)
                .count(),
            total_capacity_cores: nodes
                .iter()
                .map(|n| u64::from(n.capabilities.cpu_cores))
                .sum(),
            active_requests: nodes
                .iter()
                .map(|n| u64::from(n.metrics.active_requests))
                .sum(),
        };
        Self { nodes, stats }
    }
}
