use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;

use tessera_common::{now_ms, ChatCompletionRequest, InferenceRequest, NodeRegistration};

use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": now_ms(),
    }))
}

pub async fn cluster_status(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.registry.snapshot())
}

/// The body is decoded by hand so a malformed registration gets the same
/// JSON error shape as every other failure.
pub async fn register_node(State(st): State<AppState>, body: Bytes) -> Response {
    let reg: NodeRegistration = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error=%e, "rejected malformed registration");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Registration failed",
                    "message": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    let record = st.registry.register(reg);
    Json(json!({
        "success": true,
        "nodeId": record.id,
    }))
    .into_response()
}

pub async fn remove_node(State(st): State<AppState>, Path(id): Path<String>) -> Response {
    match st.registry.remove(&id) {
        Some(_) => Json(json!({ "success": true, "nodeId": id })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Node not found",
                "message": format!("no node registered with id '{id}'"),
            })),
        )
            .into_response(),
    }
}

pub async fn chat_completions(
    State(st): State<AppState>,
    Json(body): Json<ChatCompletionRequest>,
) -> Response {
    let request = InferenceRequest::from_chat(body);
    let request_id = request.id.clone();

    match st.router.route(request).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(request_id=%request_id, error=%e, "inference request failed");
            e.into_response()
        }
    }
}
