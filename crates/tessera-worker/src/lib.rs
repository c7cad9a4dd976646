pub mod engine;
pub mod handlers;
pub mod heartbeat;
pub mod host;
pub mod state;

use axum::routing::{get, post};

pub use engine::{demo_answer, DemoEngine, DEMO_TEXT};
pub use heartbeat::{heartbeat_loop, register_node, NodeIdentity};
pub use host::{HostMonitor, HostSample};
pub use state::AppState;

use crate::handlers::{health, inference, inference_stream};

pub fn app(st: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/inference", post(inference))
        .route("/inference/stream", post(inference_stream))
        .with_state(st)
}
