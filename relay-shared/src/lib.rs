mod lines;
mod pipeline;

pub use lines::{LineBuffer, MAX_LINE_LEN};
pub use pipeline::{ChatState, Step, DEFAULT_SYSTEM_PROMPT, EXIT_WORDS};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One conversation turn. Fields other than `role` and `content` (images,
/// tool calls) are kept in `extra` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Optional sampling parameters. A missing field means "backend default",
/// so absent values are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

/// Body of `/api/chat` and `/api/chat/stream`.
///
/// `messages` is optional at the type level so a missing field can be
/// reported as a validation error instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub sampling: SamplingOptions,
    // Ignored by the gateway: the route decides whether to stream.
    #[serde(default)]
    pub stream: bool,
}

/// Body of `/api/generate` and `/api/generate/stream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub sampling: SamplingOptions,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One decoded line of a streamed backend response. Chat streams carry text
/// in `message.content`, generate streams in `response`. `error` is only set
/// on the gateway's own terminal error events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<BackendMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendChunk {
    /// Incremental text carried by this chunk, if any.
    pub fn text(&self) -> &str {
        if let Some(message) = &self.message {
            return message.content.as_deref().unwrap_or_default();
        }
        self.response.as_deref().unwrap_or_default()
    }
}

/// Every user-visible failure is an object with a single `error` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
