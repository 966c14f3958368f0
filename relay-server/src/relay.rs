//! Message relay: validates inbound requests, builds the backend payload and
//! dispatches it through [`OllamaClient`].

use bytes::Bytes;
use relay_shared::{ChatMessage, ChatRequest, GenerateRequest, SamplingOptions};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::upstream::{Endpoint, LineStream, OllamaClient};

const MISSING_MESSAGES: &str = "Invalid request. 'messages' field is required.";
const MISSING_PROMPT: &str = "Invalid request. 'prompt' field is required.";

/// Payload sent to the backend's `/chat` or `/generate` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub stream: bool,
    #[serde(flatten)]
    pub sampling: SamplingOptions,
}

impl BackendRequest {
    pub fn endpoint(&self) -> Endpoint {
        if self.messages.is_some() {
            Endpoint::Chat
        } else {
            Endpoint::Generate
        }
    }
}

pub struct RelayService {
    upstream: OllamaClient,
    default_model: String,
}

impl RelayService {
    pub fn new(upstream: OllamaClient, default_model: String) -> Self {
        info!("Relaying to {} with default model {}", upstream.api_base(), default_model);
        Self {
            upstream,
            default_model,
        }
    }

    pub async fn models(&self) -> Result<Bytes, RelayError> {
        self.upstream.list_models().await
    }

    pub async fn chat(&self, body: &[u8]) -> Result<Bytes, RelayError> {
        let payload = self.chat_payload(body, false)?;
        self.upstream.complete(payload.endpoint(), &payload).await
    }

    pub async fn generate(&self, body: &[u8]) -> Result<Bytes, RelayError> {
        let payload = self.generate_payload(body, false)?;
        self.upstream.complete(payload.endpoint(), &payload).await
    }

    /// Validation happens here, before any event is produced. Backend
    /// failures show up later as items of the returned stream.
    pub fn chat_stream(&self, body: &[u8]) -> Result<LineStream, RelayError> {
        let payload = self.chat_payload(body, true)?;
        Ok(self.upstream.stream(payload.endpoint(), &payload))
    }

    pub fn generate_stream(&self, body: &[u8]) -> Result<LineStream, RelayError> {
        let payload = self.generate_payload(body, true)?;
        Ok(self.upstream.stream(payload.endpoint(), &payload))
    }

    pub fn chat_payload(&self, body: &[u8], stream: bool) -> Result<BackendRequest, RelayError> {
        let request: ChatRequest = decode(body, MISSING_MESSAGES)?;
        let messages = match request.messages {
            Some(messages) if !messages.is_empty() => messages,
            _ => {
                warn!("Rejecting chat request without messages");
                return Err(RelayError::Validation(MISSING_MESSAGES.to_string()));
            }
        };

        Ok(BackendRequest {
            model: request.model.unwrap_or_else(|| self.default_model.clone()),
            messages: Some(messages),
            prompt: None,
            stream,
            sampling: request.sampling,
        })
    }

    pub fn generate_payload(&self, body: &[u8], stream: bool) -> Result<BackendRequest, RelayError> {
        let request: GenerateRequest = decode(body, MISSING_PROMPT)?;
        let Some(prompt) = request.prompt else {
            warn!("Rejecting generate request without prompt");
            return Err(RelayError::Validation(MISSING_PROMPT.to_string()));
        };

        Ok(BackendRequest {
            model: request.model.unwrap_or_else(|| self.default_model.clone()),
            messages: None,
            prompt: Some(prompt),
            stream,
            sampling: request.sampling,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8], message: &str) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejecting malformed request body: {}", e);
        RelayError::Validation(message.to_string())
    })
}
