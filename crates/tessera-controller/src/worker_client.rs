use std::time::Duration;

use bytes::Bytes;

use tessera_common::{InferenceRequest, NodeRecord};

use crate::error::RouteError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP calls from the controller to a worker's inference endpoints.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl WorkerClient {
    pub fn new(http: reqwest::Client, request_timeout: Duration, stream_timeout: Duration) -> Self {
        Self {
            http,
            request_timeout,
            stream_timeout,
        }
    }

    /// `POST {node}/inference`; the 2xx body is returned untouched.
    pub async fn infer(&self, node: &NodeRecord, request: &InferenceRequest) -> Result<Bytes, RouteError> {
        let url = format!("{}/inference", node.address.base_url());
        let resp = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(RouteError::upstream)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RouteError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        resp.bytes().await.map_err(RouteError::upstream)
    }

    /// `POST {node}/inference/stream`. The response is handed back whatever its
    /// status so the relay can decide between piping and synthesizing.
    pub async fn open_stream(
        &self,
        node: &NodeRecord,
        request: &InferenceRequest,
    ) -> Result<reqwest::Response, RouteError> {
        let url = format!("{}/inference/stream", node.address.base_url());
        self.http
            .post(&url)
            .timeout(self.stream_timeout)
            .json(request)
            .send()
            .await
            .map_err(RouteError::upstream)
    }
}
