//! Streaming relay: turns a worker's output into the caller's SSE stream.
//!
//! The SSE response is returned to the caller first; all upstream work runs
//! in a spawned task that writes into the response through an [`SseSink`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::StatusCode;

use tessera_common::sse::{
    frame_content, pump, sse_response, synthesize, FragmentError, FragmentStream, Jitter,
    PumpOutcome, SseDecoder, SseFrame, SseSink,
};
use tessera_common::{ChunkBuilder, InferenceRequest, InferenceResponse, NodeRecord};

use crate::error::RouteError;
use crate::worker_client::WorkerClient;

const SSE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("worker completion has no message text")]
    EmptyCompletion,
}

#[derive(Debug, Clone)]
pub struct StreamingRelay {
    workers: WorkerClient,
    jitter: Jitter,
}

impl StreamingRelay {
    pub fn new(workers: WorkerClient, jitter: Jitter) -> Self {
        Self { workers, jitter }
    }

    /// Opens the caller's SSE response and starts streaming `request` from
    /// `node` behind it.
    pub fn relay(&self, node: NodeRecord, request: InferenceRequest) -> Response {
        let (sink, events) = SseSink::channel(SSE_CHANNEL_CAPACITY);
        let relay = self.clone();
        tokio::spawn(async move { relay.run(sink, node, request).await });
        sse_response(events)
    }

    async fn run(self, sink: SseSink, node: NodeRecord, request: InferenceRequest) {
        let started = Instant::now();
        let chunks = ChunkBuilder::new(&request.id, &request.model);

        let fragments = match self.open_fragments(&node, &request).await {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(
                    request_id=%request.id,
                    node_id=%node.id,
                    error=%e,
                    "stream upstream failed"
                );
                sink.error(&e.to_string()).await;
                return;
            }
        };

        match pump(&sink, &chunks, fragments).await {
            PumpOutcome::Completed { pieces } => {
                tracing::info!(
                    request_id=%request.id,
                    node_id=%node.id,
                    pieces,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "stream completed"
                );
            }
            PumpOutcome::Disconnected { pieces } => {
                tracing::debug!(request_id=%request.id, pieces, "client disconnected, stream stopped");
            }
            PumpOutcome::Failed { pieces, message } => {
                tracing::error!(
                    request_id=%request.id,
                    node_id=%node.id,
                    pieces,
                    error=%message,
                    "stream upstream failed mid-stream"
                );
            }
        }
    }

    /// Chooses between piping the worker's own stream and synthesizing one
    /// from its sync completion.
    async fn open_fragments(
        &self,
        node: &NodeRecord,
        request: &InferenceRequest,
    ) -> Result<FragmentStream, RelayError> {
        let resp = self.workers.open_stream(node, request).await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!(node_id=%node.id, "worker has no streaming engine, synthesizing");
            let body = self.workers.infer(node, request).await?;
            let text = completion_text(&body)?;
            return Ok(synthesize(&text, self.jitter));
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RouteError::UpstreamStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(upstream_fragments(resp))
    }
}

fn completion_text(body: &[u8]) -> Result<String, RelayError> {
    let completion: InferenceResponse = serde_json::from_slice(body)
        .map_err(|e| RouteError::InvalidUpstreamResponse(e.to_string()))?;
    completion
        .text()
        .map(str::to_string)
        .ok_or(RelayError::EmptyCompletion)
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct UpstreamState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, FragmentError>>,
    finished: bool,
}

/// Decodes a worker's SSE body into content fragments.
///
/// Ends at `[DONE]`, at end of body, or after yielding the first error.
pub fn upstream_fragments(resp: reqwest::Response) -> FragmentStream {
    let state = UpstreamState {
        body: Box::pin(resp.bytes_stream()),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for frame in st.decoder.push(&bytes) {
                        match frame {
                            SseFrame::Data(data) => {
                                if let Some(item) = frame_content(&data) {
                                    let failed = item.is_err();
                                    st.pending.push_back(item);
                                    if failed {
                                        st.finished = true;
                                        break;
                                    }
                                }
                            }
                            SseFrame::Done => {
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(FragmentError(e.to_string())), st));
                }
                None => st.finished = true,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Choice, FinishReason, Message, Role, Usage};

    #[test]
    fn completion_text_reads_first_choice() {
        let completion = InferenceResponse {
            id: "req_1".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: "hello there".to_string(),
                },
                finish_reason: FinishReason::Stop,
            }],
            usage: Usage::new(1, 2),
            created: 0,
        };
        let body = serde_json::to_vec(&completion).unwrap();
        assert_eq!(completion_text(&body).unwrap(), "hello there");
    }

    #[test]
    fn completion_text_rejects_garbage_and_empty_choices() {
        assert!(matches!(
            completion_text(b"<html>"),
            Err(RelayError::Route(RouteError::InvalidUpstreamResponse(_)))
        ));

        let empty = serde_json::json!({
            "id": "req_1", "model": "m", "choices": [],
            "usage": {"promptTokens": 0, "completionTokens": 0, "totalTokens": 0},
            "created": 0
        });
        let body = serde_json::to_vec(&empty).unwrap();
        assert!(matches!(completion_text(&body), Err(RelayError::EmptyCompletion)));
    }
}
