//! Gateway error type and its mapping to HTTP responses.
//!
//! Buffered routes render a `RelayError` as a status code plus a JSON
//! `{"error": ...}` body. Streaming routes have already committed to
//! `text/event-stream`, so they use [`RelayError::event_message`] to build a
//! single terminal event instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_shared::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Required field missing or body malformed. Never reaches the backend.
    #[error("{0}")]
    Validation(String),

    /// Backend answered with a non-2xx status.
    #[error("Ollama API error: {body}")]
    BackendStatus { status: StatusCode, body: String },

    /// Backend unreachable or the connection failed mid-response.
    #[error("Error: {0}")]
    Transport(String),

    /// Model listing failed; the message is already user-facing.
    #[error("{0}")]
    ModelsUnavailable(String),
}

impl RelayError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        RelayError::Transport(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::BackendStatus { status, .. } => *status,
            RelayError::Transport(_) | RelayError::ModelsUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text of the terminal SSE error event. Transport failures carry the
    /// bare cause, without the `Error: ` prefix used by buffered responses.
    pub fn event_message(&self) -> String {
        match self {
            RelayError::Transport(cause) => cause.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
