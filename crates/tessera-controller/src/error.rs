use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures on the inference request path, before any response bytes are sent.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("All worker nodes are offline or overloaded")]
    NoHealthyNode,
    #[error("worker request timed out: {0}")]
    UpstreamTimeout(String),
    #[error("worker unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("worker returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("invalid response from worker: {0}")]
    InvalidUpstreamResponse(String),
}

pub(crate) fn classify_reqwest_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        return "timeout";
    }
    if error.is_connect() {
        return "connect";
    }
    "other"
}

impl RouteError {
    pub fn upstream(error: reqwest::Error) -> Self {
        match classify_reqwest_error(&error) {
            "timeout" => RouteError::UpstreamTimeout(error.to_string()),
            _ => RouteError::UpstreamUnreachable(error.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RouteError::NoHealthyNode => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            RouteError::NoHealthyNode => "No available workers",
            _ => "Inference failed",
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.title(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_healthy_node_is_503_with_fixed_message() {
        let err = RouteError::NoHealthyNode;
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.title(), "No available workers");
        assert_eq!(err.to_string(), "All worker nodes are offline or overloaded");
    }

    #[test]
    fn upstream_failures_are_500() {
        let err = RouteError::UpstreamStatus {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.title(), "Inference failed");
        assert!(err.to_string().contains("502"));
    }
}
