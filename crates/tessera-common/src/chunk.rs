use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::FinishReason;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<crate::Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// One `chat.completion.chunk` event of a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|c| &c.delta)
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.choices.first().and_then(|c| c.finish_reason)
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Stamps every chunk of one stream with the same request id and model.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    id: String,
    model: String,
}

impl ChunkBuilder {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
        }
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: now_unix_seconds(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    pub fn role(&self) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: Some(crate::Role::Assistant),
                content: None,
            },
            None,
        )
    }

    pub fn content(&self, piece: impl Into<String>) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: None,
                content: Some(piece.into()),
            },
            None,
        )
    }

    pub fn finish(&self, reason: FinishReason) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_chunk_has_empty_delta() {
        let b = ChunkBuilder::new("req_1", "llama");
        let v = serde_json::to_value(b.finish(FinishReason::Stop)).unwrap();

        assert_eq!(v["object"], "chat.completion.chunk");
        assert_eq!(v["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn role_and_content_chunks_share_id_and_model() {
        let b = ChunkBuilder::new("req_1", "llama");
        let role = b.role();
        let content = b.content("hello ");

        assert_eq!(role.id, content.id);
        assert_eq!(role.model, content.model);
        assert_eq!(role.delta().and_then(|d| d.role), Some(crate::Role::Assistant));
        assert!(role.delta().and_then(|d| d.content.as_ref()).is_none());
        assert_eq!(content.delta().and_then(|d| d.content.as_deref()), Some("hello "));
        assert_eq!(content.finish_reason(), None);
    }
}
