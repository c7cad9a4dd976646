use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tessera_common::{NodeMetrics, NodePatch, NodeRecord};

use crate::registry::NodeRegistry;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("health endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("health endpoint returned status {0}")]
    Status(u16),
}

/// Transport used to ask one node whether it is healthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` on any 2xx, carrying the metrics the node reported if it sent any.
    async fn probe(&self, node: &NodeRecord) -> Result<Option<NodeMetrics>, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    metrics: Option<NodeMetrics>,
}

/// Probes `GET {node}/health` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, node: &NodeRecord) -> Result<Option<NodeMetrics>, ProbeError> {
        let url = format!("{}/health", node.address.base_url());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        // a 2xx with an unreadable body still counts as healthy
        let body = resp.json::<HealthBody>().await.ok();
        Ok(body.and_then(|b| b.metrics))
    }
}

/// Periodically probes every worker and folds the result into the registry.
///
/// Success marks a node healthy (merging reported metrics), failure or timeout
/// marks it degraded. `offline` is left to the registry's liveness timers.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            interval,
            probe_timeout,
        }
    }

    /// Runs one round over all non-controller nodes, concurrently, and waits
    /// for every probe to settle. Returns the number of nodes probed.
    pub async fn check_all(&self) -> usize {
        let targets: Vec<NodeRecord> = self
            .registry
            .list()
            .into_iter()
            .filter(NodeRecord::is_worker)
            .collect();
        let probed = targets.len();

        let mut set = JoinSet::new();
        for node in targets {
            let probe = self.probe.clone();
            let registry = self.registry.clone();
            let timeout = self.probe_timeout;
            set.spawn(async move { probe_one(probe.as_ref(), &registry, node, timeout).await });
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                tracing::error!(error=%e, "health probe task failed");
            }
        }

        probed
    }

    /// Spawns the tick loop. The first round runs one interval after start.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_ms = self.interval.as_millis() as u64,
                probe_timeout_ms = self.probe_timeout.as_millis() as u64,
                "health monitor started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.check_all().await;
                    }
                }
            }
            tracing::info!("health monitor stopped");
        })
    }
}

async fn probe_one(
    probe: &dyn HealthProbe,
    registry: &NodeRegistry,
    node: NodeRecord,
    timeout: Duration,
) {
    let outcome = match tokio::time::timeout(timeout, probe.probe(&node)).await {
        Ok(res) => res,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };

    match outcome {
        Ok(metrics) => {
            registry.update(&node.id, NodePatch::healthy(metrics));
        }
        Err(e) => {
            tracing::warn!(node_id=%node.id, error=%e, "health check failed, marking degraded");
            registry.update(&node.id, NodePatch::degraded());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tessera_common::{NodeRole, NodeStatus};

    use crate::registry::tests::worker;
    use crate::registry::DEFAULT_LIVENESS_WINDOW;

    #[derive(Clone)]
    enum Script {
        Healthy(Option<NodeMetrics>),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct ScriptedProbe {
        scripts: Mutex<HashMap<String, Script>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn set(&self, id: &str, script: Script) {
            self.scripts.lock().unwrap().insert(id.to_string(), script);
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, node: &NodeRecord) -> Result<Option<NodeMetrics>, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&node.id)
                .cloned()
                .unwrap_or(Script::Healthy(None));
            match script {
                Script::Healthy(m) => Ok(m),
                Script::Fail => Err(ProbeError::Status(500)),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(None)
                }
            }
        }
    }

    fn monitor(registry: Arc<NodeRegistry>, probe: Arc<ScriptedProbe>) -> HealthMonitor {
        HealthMonitor::new(
            registry,
            probe,
            Duration::from_secs(5),
            Duration::from_secs(3),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probe_degrades_but_never_offlines() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        probe.set("sick", Script::Fail);
        let mon = monitor(registry.clone(), probe);

        registry.register(worker("sick", 0, 4));
        mon.check_all().await;
        assert_eq!(registry.get("sick").unwrap().status, NodeStatus::Degraded);

        // heartbeating every 10s while failing every probe
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            registry.register(worker("sick", 0, 4));
            mon.check_all().await;
        }
        assert_eq!(registry.get("sick").unwrap().status, NodeStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_probes_alone_keep_node_alive() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        let mon = monitor(registry.clone(), probe);

        registry.register(worker("quiet", 0, 4));
        for _ in 0..24 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            mon.check_all().await;
        }
        assert_eq!(registry.get("quiet").unwrap().status, NodeStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_times_out_as_degraded() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        probe.set("stuck", Script::Hang);
        let mon = monitor(registry.clone(), probe);

        registry.register(worker("stuck", 0, 4));
        registry.register(worker("fine", 0, 4));

        let started = tokio::time::Instant::now();
        assert_eq!(mon.check_all().await, 2);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));

        assert_eq!(registry.get("stuck").unwrap().status, NodeStatus::Degraded);
        assert_eq!(registry.get("fine").unwrap().status, NodeStatus::Healthy);
    }

    #[tokio::test]
    async fn reported_metrics_are_merged_and_absent_metrics_kept() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        let mon = monitor(registry.clone(), probe.clone());

        registry.register(worker("w", 3, 4));
        mon.check_all().await;
        assert_eq!(registry.get("w").unwrap().metrics.active_requests, 3);

        let reported = NodeMetrics {
            active_requests: 9,
            ..NodeMetrics::default()
        };
        probe.set("w", Script::Healthy(Some(reported.clone())));
        mon.check_all().await;
        assert_eq!(registry.get("w").unwrap().metrics, reported);
    }

    #[tokio::test]
    async fn recovered_probe_restores_healthy() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        let mon = monitor(registry.clone(), probe.clone());

        registry.register(worker("w", 0, 4));
        probe.set("w", Script::Fail);
        mon.check_all().await;
        assert_eq!(registry.get("w").unwrap().status, NodeStatus::Degraded);

        probe.set("w", Script::Healthy(None));
        mon.check_all().await;
        assert_eq!(registry.get("w").unwrap().status, NodeStatus::Healthy);
    }

    #[tokio::test]
    async fn controller_nodes_are_not_probed() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        let mon = monitor(registry.clone(), probe.clone());

        let mut ctrl = worker("ctrl", 0, 4);
        ctrl.role = NodeRole::Controller;
        registry.register(ctrl);
        registry.register(worker("w", 0, 4));

        assert_eq!(mon.check_all().await, 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_ticks_until_cancelled() {
        let registry = NodeRegistry::new(DEFAULT_LIVENESS_WINDOW);
        let probe = Arc::new(ScriptedProbe::default());
        registry.register(worker("w", 0, 4));

        let shutdown = CancellationToken::new();
        let handle = monitor(registry, probe.clone()).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
