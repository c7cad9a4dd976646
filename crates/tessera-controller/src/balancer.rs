use std::sync::Arc;

use tessera_common::{InferenceRequest, NodeRecord};

use crate::registry::NodeRegistry;
use crate::strategy::SelectionStrategy;

/// Picks a node for each request from the registry's healthy view.
///
/// The strategy is fixed at construction; the request is accepted so that
/// model-aware strategies can be added without changing callers.
pub struct LoadBalancer {
    registry: Arc<NodeRegistry>,
    strategy: Box<dyn SelectionStrategy>,
}

impl LoadBalancer {
    pub fn new(registry: Arc<NodeRegistry>, strategy: Box<dyn SelectionStrategy>) -> Self {
        tracing::info!(strategy = strategy.name(), "load balancer initialized");
        Self { registry, strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn select_node(&self, _request: &InferenceRequest) -> Option<NodeRecord> {
        let healthy = self.registry.list_healthy();
        if healthy.is_empty() {
            return None;
        }
        let idx = self.strategy.select(&healthy)?;
        healthy.into_iter().nth(idx)
    }
}
