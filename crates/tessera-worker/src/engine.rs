use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tessera_common::{
    estimate_tokens, Choice, FinishReason, InferenceRequest, InferenceResponse, Message,
    NodeMetrics, Role, Usage,
};

/// Answer produced by the demo engine for every prompt.
pub const DEMO_TEXT: &str = "This is a demo streaming response from the AI cluster. \
In production, tokens would be streamed directly from the LLM model.";

/// The demo answer cut to `max_tokens` (at ~4 characters per token). A cut
/// answer finishes with `length`.
pub fn demo_answer(max_tokens: Option<u32>) -> (&'static str, FinishReason) {
    let Some(limit) = max_tokens else {
        return (DEMO_TEXT, FinishReason::Stop);
    };
    if estimate_tokens(DEMO_TEXT) <= limit {
        return (DEMO_TEXT, FinishReason::Stop);
    }
    let mut end = (limit as usize * 4).min(DEMO_TEXT.len());
    while !DEMO_TEXT.is_char_boundary(end) {
        end -= 1;
    }
    (&DEMO_TEXT[..end], FinishReason::Length)
}

/// Stand-in for a model runtime. Produces a fixed answer and keeps the
/// request bookkeeping a real engine would report.
#[derive(Debug, Default)]
pub struct DemoEngine {
    active_requests: AtomicU32,
    total_requests: AtomicU64,
    total_response_ms: AtomicU64,
    total_tokens: AtomicU64,
}

/// Marks one request in flight until finished or dropped.
pub struct InFlight<'a> {
    engine: &'a DemoEngine,
    started: Instant,
    tokens: u64,
}

impl InFlight<'_> {
    pub fn add_tokens(&mut self, n: u32) {
        self.tokens += u64::from(n);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let e = self.engine;
        e.active_requests.fetch_sub(1, Ordering::Relaxed);
        e.total_requests.fetch_add(1, Ordering::Relaxed);
        e.total_response_ms
            .fetch_add(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
        e.total_tokens.fetch_add(self.tokens, Ordering::Relaxed);
    }
}

impl DemoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> InFlight<'_> {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        InFlight {
            engine: self,
            started: Instant::now(),
            tokens: 0,
        }
    }

    pub fn complete(&self, request: &InferenceRequest) -> InferenceResponse {
        let mut in_flight = self.begin();
        let (text, finish_reason) = demo_answer(request.max_tokens);
        let prompt_tokens = estimate_tokens(&request.prompt_text());
        let completion_tokens = estimate_tokens(text);
        in_flight.add_tokens(prompt_tokens + completion_tokens);

        InferenceResponse {
            id: request.id.clone(),
            model: request.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: text.to_string(),
                },
                finish_reason,
            }],
            usage: Usage::new(prompt_tokens, completion_tokens),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Request figures only; host usage comes from `HostMonitor`.
    pub fn metrics(&self) -> NodeMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_ms = self.total_response_ms.load(Ordering::Relaxed);
        let total_tokens = self.total_tokens.load(Ordering::Relaxed);

        NodeMetrics {
            active_requests: self.active_requests.load(Ordering::Relaxed),
            total_requests,
            avg_response_time_ms: if total_requests > 0 {
                total_ms as f64 / total_requests as f64
            } else {
                0.0
            },
            tokens_per_second: if total_ms > 0 {
                total_tokens as f64 / (total_ms as f64 / 1000.0)
            } else {
                0.0
            },
            ..NodeMetrics::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::ChatCompletionRequest;

    fn request_capped(text: &str, max_tokens: Option<u32>) -> InferenceRequest {
        InferenceRequest::from_chat(ChatCompletionRequest {
            model: Some("mistral-7b".to_string()),
            messages: vec![Message {
                role: Role::User,
                content: text.to_string(),
            }],
            temperature: None,
            top_p: None,
            max_tokens,
            frequency_penalty: None,
            presence_penalty: None,
            stream: None,
        })
    }

    fn request(text: &str) -> InferenceRequest {
        request_capped(text, None)
    }

    #[test]
    fn max_tokens_cuts_the_answer() {
        let engine = DemoEngine::new();
        let resp = engine.complete(&request_capped("hi", Some(5)));
        assert_eq!(resp.text(), Some(&DEMO_TEXT[..20]));
        assert_eq!(resp.choices[0].finish_reason, FinishReason::Length);
        assert_eq!(resp.usage.completion_tokens, 5);

        let roomy = engine.complete(&request_capped("hi", Some(4096)));
        assert_eq!(roomy.text(), Some(DEMO_TEXT));
        assert_eq!(roomy.choices[0].finish_reason, FinishReason::Stop);
    }

    #[test]
    fn completion_echoes_request_identity() {
        let engine = DemoEngine::new();
        let req = request("abcdefgh");
        let resp = engine.complete(&req);

        assert_eq!(resp.id, req.id);
        assert_eq!(resp.model, "mistral-7b");
        assert_eq!(resp.text(), Some(DEMO_TEXT));
        assert_eq!(resp.usage.prompt_tokens, 2);
        assert_eq!(
            resp.usage.total_tokens,
            resp.usage.prompt_tokens + resp.usage.completion_tokens
        );

        // unix seconds, like the stream chunks
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert!(resp.created <= now && resp.created + 60 >= now);
    }

    #[test]
    fn in_flight_guard_tracks_active_and_total() {
        let engine = DemoEngine::new();
        let guard = engine.begin();
        assert_eq!(engine.metrics().active_requests, 1);
        assert_eq!(engine.metrics().total_requests, 0);

        drop(guard);
        engine.complete(&request("hi"));
        let m = engine.metrics();
        assert_eq!(m.active_requests, 0);
        assert_eq!(m.total_requests, 2);
    }
}
