use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use tessera_common::{NodeAddress, NodeCapabilities, NodeMetrics, NodeRegistration, NodeRole};

use crate::engine::DemoEngine;
use crate::host::{HostMonitor, HostSample};

/// The parts of a registration that do not change between heartbeats.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub id: String,
    pub address: NodeAddress,
    pub capabilities: NodeCapabilities,
}

impl NodeIdentity {
    /// Registration body carrying the current host sample in both the
    /// capabilities and the metrics.
    pub fn registration(&self, mut metrics: NodeMetrics, host: &HostSample) -> NodeRegistration {
        let mut capabilities = self.capabilities.clone();
        host.apply_capabilities(&mut capabilities);
        host.apply_metrics(&mut metrics);
        NodeRegistration {
            id: self.id.clone(),
            role: NodeRole::Worker,
            address: self.address.clone(),
            capabilities,
            metrics,
        }
    }
}

pub async fn register_node(
    http: &reqwest::Client,
    controller_url: &str,
    reg: &NodeRegistration,
) -> anyhow::Result<()> {
    let url = format!("{}/cluster/register", controller_url.trim_end_matches('/'));
    let resp = http
        .post(&url)
        .json(reg)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("controller rejected registration ({status}): {body}");
    }
    Ok(())
}

/// Registers immediately, then again every `interval` until `shutdown`.
/// A failed attempt is logged and retried on the next tick.
pub async fn heartbeat_loop(
    http: reqwest::Client,
    controller_url: String,
    identity: NodeIdentity,
    engine: Arc<DemoEngine>,
    host: Arc<HostMonitor>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut registered = false;
    loop {
        let reg = identity.registration(engine.metrics(), &host.sample());
        match register_node(&http, &controller_url, &reg).await {
            Ok(()) => {
                if !registered {
                    tracing::info!(node_id=%identity.id, controller=%controller_url, "registered with controller");
                    registered = true;
                } else {
                    tracing::debug!(node_id=%identity.id, "heartbeat sent");
                }
            }
            Err(e) => {
                tracing::warn!(node_id=%identity.id, error=%e, "failed to register with controller");
                registered = false;
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!(node_id=%identity.id, "heartbeat stopped");
}
