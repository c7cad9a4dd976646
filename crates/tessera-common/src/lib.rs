pub mod chunk;
pub mod cluster;
pub mod inference;
pub mod node;
pub mod sse;
pub mod telemetry;

use std::time::{SystemTime, UNIX_EPOCH};

pub use chunk::{ChatCompletionChunk, ChunkBuilder, ChunkChoice, ChunkDelta};
pub use cluster::{ClusterSnapshot, ClusterStats};
pub use inference::{
    estimate_tokens, ChatCompletionRequest, Choice, FinishReason, InferenceRequest,
    InferenceResponse, Message, Role, Usage,
};
pub use node::{
    NodeAddress, NodeCapabilities, NodeMetrics, NodePatch, NodeRecord, NodeRegistration,
    NodeRole, NodeStatus, ProbeVerdict,
};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
