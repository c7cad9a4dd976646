pub mod balancer;
pub mod error;
pub mod handlers;
pub mod health;
mod liveness;
pub mod registry;
pub mod relay;
pub mod router;
pub mod state;
pub mod strategy;
pub mod worker_client;

use axum::routing::{delete, get, post};

pub use balancer::LoadBalancer;
pub use error::RouteError;
pub use health::{HealthMonitor, HealthProbe, HttpHealthProbe, ProbeError};
pub use registry::NodeRegistry;
pub use relay::{RelayError, StreamingRelay};
pub use router::RequestRouter;
pub use state::AppState;
pub use worker_client::WorkerClient;

use crate::handlers::{chat_completions, cluster_status, healthz, register_node, remove_node};

/// The controller's HTTP surface.
pub fn app(st: AppState) -> axum::Router {
    let public_routes = axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(healthz));

    let cluster_routes = axum::Router::new()
        .route("/cluster/register", post(register_node))
        .route("/cluster/status", get(cluster_status))
        .route("/cluster/nodes/:id", delete(remove_node));

    let inference_routes =
        axum::Router::new().route("/v1/chat/completions", post(chat_completions));

    public_routes
        .merge(cluster_routes)
        .merge(inference_routes)
        .with_state(st)
}
