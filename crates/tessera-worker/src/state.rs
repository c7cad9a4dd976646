use std::sync::Arc;

use tessera_common::sse::Jitter;
use tessera_common::NodeMetrics;

use crate::engine::DemoEngine;
use crate::host::HostMonitor;

#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub engine: Arc<DemoEngine>,
    pub host: Arc<HostMonitor>,
    /// Pacing of the demo token stream.
    pub jitter: Jitter,
    /// When false `/inference/stream` answers 404 and the controller
    /// synthesizes the stream from `/inference`.
    pub streaming: bool,
}

impl AppState {
    /// Engine request figures with host usage filled in.
    pub fn metrics(&self) -> NodeMetrics {
        let mut metrics = self.engine.metrics();
        self.host.sample().apply_metrics(&mut metrics);
        metrics
    }
}
