use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use tessera_common::InferenceRequest;

use crate::balancer::LoadBalancer;
use crate::error::RouteError;
use crate::relay::StreamingRelay;
use crate::worker_client::WorkerClient;

/// Sends each inference request to one selected worker.
///
/// There is no failover: an upstream failure is reported to the caller and
/// the request is not retried on another node.
pub struct RequestRouter {
    balancer: LoadBalancer,
    workers: WorkerClient,
    relay: StreamingRelay,
}

impl RequestRouter {
    pub fn new(balancer: LoadBalancer, workers: WorkerClient, relay: StreamingRelay) -> Self {
        Self {
            balancer,
            workers,
            relay,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.balancer.strategy_name()
    }

    pub async fn route(&self, request: InferenceRequest) -> Result<Response, RouteError> {
        let node = self
            .balancer
            .select_node(&request)
            .ok_or(RouteError::NoHealthyNode)?;

        tracing::info!(
            request_id=%request.id,
            node_id=%node.id,
            model=%request.model,
            stream=request.stream,
            strategy=self.balancer.strategy_name(),
            "routing request"
        );

        if request.stream {
            return Ok(self.relay.relay(node, request));
        }

        let body = self.workers.infer(&node, &request).await?;
        let resp = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        Ok(resp)
    }
}
