use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tessera_common::sse::{pump, sse_response, synthesize, PumpOutcome, SseSink};
use tessera_common::{estimate_tokens, now_ms, ChunkBuilder, InferenceRequest};

use crate::engine::demo_answer;
use crate::state::AppState;

pub async fn health(State(st): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "nodeId": st.node_id,
        "metrics": st.metrics(),
        "timestamp": now_ms(),
    }))
}

pub async fn inference(
    State(st): State<AppState>,
    Json(request): Json<InferenceRequest>,
) -> impl IntoResponse {
    let started = Instant::now();
    let resp = st.engine.complete(&request);
    tracing::info!(
        request_id=%request.id,
        model=%request.model,
        duration_ms = started.elapsed().as_millis() as u64,
        "inference completed"
    );
    Json(resp)
}

pub async fn inference_stream(
    State(st): State<AppState>,
    Json(request): Json<InferenceRequest>,
) -> Response {
    if !st.streaming {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Streaming unavailable",
                "message": "this worker has no streaming engine",
            })),
        )
            .into_response();
    }

    let (sink, events) = SseSink::channel(64);
    let engine = st.engine.clone();
    let jitter = st.jitter;

    tokio::spawn(async move {
        let mut in_flight = engine.begin();
        in_flight.add_tokens(estimate_tokens(&request.prompt_text()));

        let chunks = ChunkBuilder::new(&request.id, &request.model);
        let (text, _) = demo_answer(request.max_tokens);
        match pump(&sink, &chunks, synthesize(text, jitter)).await {
            PumpOutcome::Completed { pieces } => {
                in_flight.add_tokens(pieces as u32);
                tracing::info!(request_id=%request.id, pieces, "stream completed");
            }
            PumpOutcome::Disconnected { pieces } => {
                in_flight.add_tokens(pieces as u32);
                tracing::debug!(request_id=%request.id, pieces, "client disconnected, stream stopped");
            }
            PumpOutcome::Failed { message, .. } => {
                tracing::error!(request_id=%request.id, error=%message, "stream failed");
            }
        }
    });

    sse_response(events)
}
