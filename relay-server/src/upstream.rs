//! HTTP client for the inference backend.
//!
//! Buffered calls return the backend's body untouched. Streaming calls return
//! a [`LineStream`]: a lazy sequence of non-empty lines that ends when the
//! backend closes the connection or the consumer drops it. Failures to open
//! the stream arrive as a single `Err` item so that callers which already
//! committed to an event stream can still report them.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use relay_shared::LineBuffer;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::IgnoredAny;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;

pub type LineStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Backend generation endpoints, relative to the API base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Generate,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::Generate => "generate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    api_base: String,
}

impl OllamaClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        info!("Initializing backend client for {}", api_base);
        Self {
            client: Client::new(),
            api_base,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    pub async fn list_models(&self) -> Result<Bytes, RelayError> {
        let url = self.url("tags");
        debug!("Fetching model list from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Model listing failed for {}: {}", url, e);
            RelayError::ModelsUnavailable(format!("Error connecting to Ollama: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Model listing returned {}: {}", status, body);
            return Err(RelayError::ModelsUnavailable(format!(
                "Failed to fetch models: {}",
                body
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::ModelsUnavailable(format!("Error connecting to Ollama: {}", e)))?;
        ensure_json(&body)
            .map_err(|e| RelayError::ModelsUnavailable(format!("Error connecting to Ollama: {}", e)))?;
        Ok(body)
    }

    /// Non-streaming call. Returns the backend's JSON body verbatim.
    pub async fn complete<T>(&self, endpoint: Endpoint, payload: &T) -> Result<Bytes, RelayError>
    where
        T: Serialize + ?Sized,
    {
        let url = self.url(endpoint.path());
        info!("Forwarding buffered request to {}", url);

        let response = send_checked(self.client.post(&url).json(payload), url).await?;
        let body = response.bytes().await.map_err(RelayError::transport)?;
        ensure_json(&body).map_err(RelayError::transport)?;
        Ok(body)
    }

    /// Streaming call. Nothing is sent until the returned stream is polled.
    pub fn stream<T>(&self, endpoint: Endpoint, payload: &T) -> LineStream
    where
        T: Serialize + ?Sized,
    {
        let url = self.url(endpoint.path());
        info!("Opening backend stream to {}", url);

        let request = self.client.post(&url).json(payload);
        stream::once(send_checked(request, url))
            .flat_map(|opened| match opened {
                Ok(response) => split_lines(response.bytes_stream()),
                Err(err) => stream::iter([Err(err)]).boxed(),
            })
            .boxed()
    }
}

/// Sends the request and turns transport failures and non-2xx statuses into
/// errors. The error body is read in full so it can be relayed.
async fn send_checked(request: RequestBuilder, url: String) -> Result<Response, RelayError> {
    let response = request.send().await.map_err(|e| {
        error!("Backend request to {} failed: {}", url, e);
        RelayError::transport(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("Backend {} returned {}: {}", url, status, body);
        return Err(RelayError::BackendStatus { status, body });
    }
    Ok(response)
}

fn ensure_json(body: &[u8]) -> Result<(), serde_json::Error> {
    serde_json::from_slice::<IgnoredAny>(body).map(|_| ())
}

/// Splits a chunked byte stream into non-empty lines. A read error ends the
/// sequence with one `Transport` item.
pub(crate) fn split_lines<S, E>(body: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream::unfold(Some((body.boxed(), LineBuffer::new())), |state| async move {
        let (mut body, mut lines) = state?;
        loop {
            if let Some(line) = lines.next_line() {
                return Some((Ok(line), Some((body, lines))));
            }
            match body.next().await {
                Some(Ok(chunk)) => lines.extend(&chunk),
                Some(Err(err)) => {
                    warn!("Backend stream interrupted: {}", err);
                    return Some((Err(RelayError::transport(err)), None));
                }
                None => return lines.finish().map(|rest| (Ok(rest), None)),
            }
        }
    })
    .boxed()
}
