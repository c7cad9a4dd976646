//! Server-Sent-Events plumbing shared by the controller relay and the worker.
//!
//! A stream is modelled as a lazy [`FragmentStream`] of text pieces (the
//! producer) pumped into an [`SseSink`] (the wire). The sink owns the sending
//! half of the channel that backs the axum `Sse` body; when the caller goes
//! away the receiver is dropped and the sink reports itself closed.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use futures_util::StreamExt;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{ChatCompletionChunk, ChunkBuilder, FinishReason};

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FragmentError(pub String);

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, FragmentError>> + Send>>;

pub type EventStream = ReceiverStream<Result<Event, Infallible>>;

/// Per-piece delay of a synthesized stream: `base + uniform(0, spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub base: Duration,
    pub spread: Duration,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        base: Duration::ZERO,
        spread: Duration::ZERO,
    };

    pub fn from_millis(base_ms: u64, spread_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            spread: Duration::from_millis(spread_ms),
        }
    }

    pub fn sample(&self) -> Duration {
        let spread_ms = self.spread.as_millis() as u64;
        if spread_ms == 0 {
            return self.base;
        }
        let extra = rand::thread_rng().gen_range(0..spread_ms);
        self.base + Duration::from_millis(extra)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_millis(50, 50)
    }
}

/// Splits text into whitespace-inclusive word pieces ("a b c" -> "a ", "b ", "c").
pub fn split_pieces(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

/// Emulates incremental generation over a complete text.
///
/// Nothing is produced until the stream is polled; each piece waits its own
/// jittered delay first.
pub fn synthesize(text: &str, jitter: Jitter) -> FragmentStream {
    let pieces = split_pieces(text).into_iter();
    let s = futures_util::stream::unfold(pieces, move |mut pieces| async move {
        let piece = pieces.next()?;
        let delay = jitter.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some((Ok(piece), pieces))
    });
    Box::pin(s)
}

/// Wraps an event channel into a `text/event-stream` response with
/// proxy-friendly headers and periodic keep-alive comments.
pub fn sse_response(events: EventStream) -> Response {
    let mut resp = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();
    let headers = resp.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    resp
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Stop chunk and `[DONE]` were written.
    Completed { pieces: usize },
    /// The caller went away; nothing further was written.
    Disconnected { pieces: usize },
    /// The producer failed; an error event was written and the stream closed.
    Failed { pieces: usize, message: String },
}

/// Sending half of an SSE response body.
#[derive(Debug, Clone)]
pub struct SseSink {
    tx: mpsc::Sender<Result<Event, Infallible>>,
}

impl SseSink {
    pub fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, ReceiverStream::new(rx))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, data: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(Ok(Event::default().data(data))).await.is_ok()
    }

    pub async fn chunk(&self, chunk: &ChatCompletionChunk) -> bool {
        match serde_json::to_string(chunk) {
            Ok(s) => self.send(s).await,
            Err(e) => {
                tracing::error!(error=%e, "failed to encode stream chunk");
                false
            }
        }
    }

    pub async fn done(&self) -> bool {
        self.send(DONE_SENTINEL.to_string()).await
    }

    pub async fn error(&self, message: &str) -> bool {
        let body = json!({
            "error": {
                "message": message,
                "type": "server_error",
            }
        });
        self.send(body.to_string()).await
    }
}

/// Drives `fragments` into `sink`: role chunk, one content chunk per piece,
/// stop chunk, `[DONE]`.
///
/// The sink is checked before every production step, so a disconnected
/// caller stops the pump without pulling further pieces.
pub async fn pump(sink: &SseSink, chunks: &ChunkBuilder, mut fragments: FragmentStream) -> PumpOutcome {
    let mut pieces = 0usize;

    if !sink.chunk(&chunks.role()).await {
        return PumpOutcome::Disconnected { pieces };
    }

    loop {
        if sink.is_closed() {
            return PumpOutcome::Disconnected { pieces };
        }
        match fragments.next().await {
            Some(Ok(piece)) => {
                if piece.is_empty() {
                    continue;
                }
                if !sink.chunk(&chunks.content(piece)).await {
                    return PumpOutcome::Disconnected { pieces };
                }
                pieces += 1;
            }
            Some(Err(e)) => {
                let message = e.to_string();
                sink.error(&message).await;
                return PumpOutcome::Failed { pieces, message };
            }
            None => break,
        }
    }

    if !sink.chunk(&chunks.finish(FinishReason::Stop)).await || !sink.done().await {
        return PumpOutcome::Disconnected { pieces };
    }
    PumpOutcome::Completed { pieces }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Incremental `data:` line decoder for a chunked SSE body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() || !line.starts_with("data:") {
                continue;
            }
            let data = line.trim_start_matches("data:").trim();
            if data == DONE_SENTINEL {
                out.push(SseFrame::Done);
            } else {
                out.push(SseFrame::Data(data.to_string()));
            }
        }
        out
    }
}

/// Extracts the text carried by one upstream `data:` payload.
///
/// Returns `None` for frames without content (role or stop chunks, keep-alive
/// payloads) and an error for an in-band `{"error": ...}` frame.
pub fn frame_content(data: &str) -> Option<Result<String, FragmentError>> {
    let v: Value = serde_json::from_str(data).ok()?;

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("upstream stream error");
        return Some(Err(FragmentError(message.to_string())));
    }

    let text = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c0| {
            c0.get("delta")
                .and_then(|d| d.get("content"))
                .and_then(|t| t.as_str())
                .or_else(|| c0.get("text").and_then(|t| t.as_str()))
        })?;

    if text.is_empty() {
        return None;
    }
    Some(Ok(text.to_string()))
}
