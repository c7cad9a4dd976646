use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tessera_common::{
    now_ms, ClusterSnapshot, NodePatch, NodeRecord, NodeRegistration, NodeStatus, ProbeVerdict,
};

use crate::liveness::LivenessTimers;

pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(30);

/// Registry-side bookkeeping around a record.
#[derive(Debug)]
struct Slot {
    /// First-registration order, used for listing.
    seq: u64,
    /// Bumped on every register/update; a timer expiry carrying an older
    /// epoch is stale and ignored.
    epoch: u64,
    live: bool,
    verdict: ProbeVerdict,
    record: NodeRecord,
}

impl Slot {
    fn touch(&mut self, epoch: u64, now: u64) {
        self.epoch = epoch;
        self.live = true;
        self.record.last_seen = now;
        self.record.status = NodeStatus::derive(self.live, self.verdict);
    }
}

/// Authoritative in-memory map of node id -> node record.
///
/// All writers (registration handler, health monitor, liveness timers) go
/// through the per-entry lock of the underlying `DashMap`, so a reader never
/// observes a half-applied update. Reads hand out cloned records.
pub struct NodeRegistry {
    nodes: DashMap<String, Slot>,
    next_seq: AtomicU64,
    next_epoch: AtomicU64,
    timers: LivenessTimers,
    liveness_window: Duration,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.nodes.len())
            .field("liveness_window", &self.liveness_window)
            .finish()
    }
}

impl NodeRegistry {
    /// Creates the registry and spawns its liveness scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(liveness_window: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| Self {
            nodes: DashMap::new(),
            next_seq: AtomicU64::new(0),
            next_epoch: AtomicU64::new(1),
            timers: LivenessTimers::spawn(liveness_window, weak.clone()),
            liveness_window,
        })
    }

    fn next_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Upserts a node and (re)arms its liveness timer.
    ///
    /// A new node starts `healthy`. A known node keeps its listing position and
    /// its last probe verdict; everything else is replaced by `reg`.
    pub fn register(&self, reg: NodeRegistration) -> NodeRecord {
        let now = now_ms();
        let id = reg.id.clone();

        // epochs are drawn under the entry lock so a slot's epoch always
        // matches the last timer armed for it
        match self.nodes.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let epoch = self.next_epoch();
                let slot = occupied.get_mut();
                slot.record = NodeRecord::from_registration(reg, slot.record.status, now);
                slot.touch(epoch, now);
                self.timers.arm(&id, epoch);
                tracing::debug!(node_id=%id, status=?slot.record.status, "node re-registered");
                slot.record.clone()
            }
            Entry::Vacant(vacant) => {
                let epoch = self.next_epoch();
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let record = NodeRecord::from_registration(reg, NodeStatus::Healthy, now);
                let slot = vacant.insert(Slot {
                    seq,
                    epoch,
                    live: true,
                    verdict: ProbeVerdict::Healthy,
                    record,
                });
                self.timers.arm(&id, epoch);
                tracing::info!(
                    node_id=%id,
                    role=?slot.record.role,
                    address=%slot.record.address.base_url(),
                    "node registered"
                );
                slot.record.clone()
            }
        }
    }

    /// Merges `patch` into a known node and rearms its liveness timer.
    /// Unknown ids are a no-op.
    pub fn update(&self, id: &str, patch: NodePatch) -> Option<NodeRecord> {
        let mut slot = self.nodes.get_mut(id)?;
        let epoch = self.next_epoch();

        if let Some(verdict) = patch.verdict {
            slot.verdict = verdict;
        }
        if let Some(metrics) = patch.metrics {
            slot.record.metrics = metrics;
        }
        slot.touch(epoch, now_ms());
        self.timers.arm(id, epoch);

        Some(slot.record.clone())
    }

    /// Demotes a node to `offline` if nothing touched it since the timer
    /// carrying `epoch` was armed. Other fields, `last_seen` included, are kept.
    pub(crate) fn expire(&self, id: &str, epoch: u64) -> bool {
        let Some(mut slot) = self.nodes.get_mut(id) else {
            return false;
        };
        if slot.epoch != epoch || !slot.live {
            return false;
        }
        slot.live = false;
        slot.record.status = NodeStatus::derive(slot.live, slot.verdict);
        tracing::warn!(
            node_id=%id,
            window_ms=self.liveness_window.as_millis() as u64,
            "node liveness timeout, marked offline"
        );
        true
    }

    /// Administrative removal: drops the record and cancels its timer.
    pub fn remove(&self, id: &str) -> Option<NodeRecord> {
        let (_, slot) = self.nodes.remove(id)?;
        self.timers.cancel(id, slot.epoch);
        tracing::info!(node_id=%id, "node removed");
        Some(slot.record)
    }

    pub fn get(&self, id: &str) -> Option<NodeRecord> {
        self.nodes.get(id).map(|s| s.record.clone())
    }

    /// All records in first-registration order.
    pub fn list(&self) -> Vec<NodeRecord> {
        let mut out: Vec<(u64, NodeRecord)> = self
            .nodes
            .iter()
            .map(|s| (s.seq, s.record.clone()))
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        out.into_iter().map(|(_, r)| r).collect()
    }

    /// The healthy-node view used as the selection candidate pool.
    pub fn list_healthy(&self) -> Vec<NodeRecord> {
        self.list()
            .into_iter()
            .filter(|n| n.status == NodeStatus::Healthy)
            .collect()
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot::from_nodes(self.list())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tessera_common::{NodeAddress, NodeCapabilities, NodeMetrics, NodeRole};

    pub(crate) fn worker(id: &str, active_requests: u32, cpu_cores: u32) -> NodeRegistration {
        NodeRegistration {
            id: id.to_string(),
            role: NodeRole::Worker,
            address: NodeAddress {
                host: "127.0.0.1".to_string(),
                port: 8081,
            },
            capabilities: NodeCapabilities {
                cpu_cores,
                ram_total_bytes: 16 << 30,
                ram_available_bytes: 8 << 30,
                max_context_length: 2048,
                ..NodeCapabilities::default()
            },
            metrics: NodeMetrics {
                active_requests,
                total_requests: 100,
                avg_response_time_ms: 500.0,
                tokens_per_second: 50.0,
                cpu_usage_pct: 50.0,
                mem_usage_pct: 50.0,
                gpu_usage_pct: None,
            },
        }
    }

    async fn advance(d: Duration) {
        tokio::time::sleep(d).await;
    }

    #[tokio::test]
    async fn register_then_get_and_list() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let record = reg.register(worker("test-node", 0, 4));

        assert_eq!(record.status, NodeStatus::Healthy);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("test-node"), Some(record));
        assert!(reg.get("missing").is_none());
    }

    #[tokio::test]
    async fn listing_follows_first_registration_order() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        for id in ["c", "a", "b"] {
            reg.register(worker(id, 0, 4));
        }
        // re-registering keeps the slot
        reg.register(worker("c", 3, 4));

        let ids: Vec<String> = reg.list().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(reg.get("c").unwrap().metrics.active_requests, 3);

        reg.remove("c");
        reg.register(worker("c", 0, 4));
        let ids: Vec<String> = reg.list().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn update_merges_and_ignores_unknown_ids() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("test-node", 0, 4));

        let updated = reg.update("test-node", NodePatch::degraded()).unwrap();
        assert_eq!(updated.status, NodeStatus::Degraded);
        assert_eq!(updated.capabilities.cpu_cores, 4);

        assert!(reg.update("ghost", NodePatch::degraded()).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn list_healthy_filters_by_status() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("node1", 0, 4));
        reg.register(worker("node2", 0, 4));
        reg.update("node2", NodePatch::degraded());

        let healthy = reg.list_healthy();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, "node1");
    }

    #[tokio::test]
    async fn remove_drops_the_record() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("test-node", 0, 4));

        assert!(reg.remove("test-node").is_some());
        assert!(reg.remove("test-node").is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_node_goes_offline_after_window() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let before = reg.register(worker("quiet", 1, 4));

        advance(Duration::from_secs(29)).await;
        assert_eq!(reg.get("quiet").unwrap().status, NodeStatus::Healthy);

        advance(Duration::from_secs(2)).await;
        let after = reg.get("quiet").unwrap();
        assert_eq!(after.status, NodeStatus::Offline);
        // demoted, not deleted, other fields untouched
        assert_eq!(after.last_seen, before.last_seen);
        assert_eq!(after.metrics, before.metrics);
        assert!(reg.list_healthy().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_node_alive() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("busy", 0, 4));

        for _ in 0..6 {
            advance(Duration::from_secs(10)).await;
            reg.register(worker("busy", 0, 4));
        }
        assert_eq!(reg.get("busy").unwrap().status, NodeStatus::Healthy);

        advance(Duration::from_secs(31)).await;
        assert_eq!(reg.get("busy").unwrap().status, NodeStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_node_recovers_on_update() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("flaky", 0, 4));
        advance(Duration::from_secs(31)).await;
        assert_eq!(reg.get("flaky").unwrap().status, NodeStatus::Offline);

        // stays offline with no further input
        advance(Duration::from_secs(120)).await;
        assert_eq!(reg.get("flaky").unwrap().status, NodeStatus::Offline);

        let record = reg.update("flaky", NodePatch::healthy(None)).unwrap();
        assert_eq!(record.status, NodeStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registration_keeps_degraded_verdict() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("sick", 0, 4));
        reg.update("sick", NodePatch::degraded());

        advance(Duration::from_secs(10)).await;
        let record = reg.register(worker("sick", 0, 4));
        assert_eq!(record.status, NodeStatus::Degraded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_register_and_update_still_expire() {
        let reg = NodeRegistry::new(Duration::from_millis(300));
        let ids: Vec<String> = (0..2000).map(|i| format!("n{i}")).collect();

        std::thread::scope(|s| {
            for t in 0..4 {
                let reg = &reg;
                let ids = &ids;
                s.spawn(move || {
                    for id in ids {
                        if t % 2 == 0 {
                            reg.register(worker(id, 0, 4));
                            reg.update(id, NodePatch::healthy(None));
                        } else {
                            reg.update(id, NodePatch::healthy(None));
                            reg.register(worker(id, 0, 4));
                        }
                    }
                });
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let stuck: Vec<String> = reg
            .list()
            .into_iter()
            .filter(|n| n.status != NodeStatus::Offline)
            .map(|n| n.id)
            .collect();
        assert!(stuck.is_empty(), "nodes never went offline: {stuck:?}");
        assert_eq!(reg.len(), ids.len());
    }

    #[tokio::test(start_paused = true)]
    async fn removed_node_timer_is_cancelled() {
        let reg = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        reg.register(worker("gone", 0, 4));
        reg.remove("gone");
        reg.register(worker("gone", 0, 4));

        advance(Duration::from_secs(20)).await;
        reg.register(worker("gone", 0, 4));
        advance(Duration::from_secs(20)).await;
        assert_eq!(reg.get("gone").unwrap().status, NodeStatus::Healthy);
    }
}
