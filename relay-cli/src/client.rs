use anyhow::{bail, Result};
use futures_util::StreamExt;
use relay_shared::{BackendChunk, ErrorBody, GenerateRequest, LineBuffer};
use reqwest::RequestBuilder;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What the UI learns from one streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Failed(String),
}

#[derive(Clone)]
pub enum ConnectionStatus {
    Idle,
    Streaming,
    Error(String),
}

/// Talks to the gateway's `/api/generate/stream` route and forwards parsed
/// events to the UI over a channel.
pub struct GatewayClient {
    http: reqwest::Client,
    stream_url: String,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let stream_url = format!("{}/api/generate/stream", gateway_url.trim_end_matches('/'));
        info!("Using gateway stream endpoint {}", stream_url);

        let client = Self {
            http: reqwest::Client::new(),
            stream_url,
            events,
        };
        (client, events_rx)
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Starts one generation. Every call ends with exactly one `Done` or
    /// `Failed` event on the channel.
    pub fn send_prompt(&self, request: GenerateRequest) {
        let request = self.http.post(&self.stream_url).json(&request);
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(e) = relay_events(request, &events).await {
                error!("Generation failed: {}", e);
                let _ = events.send(StreamEvent::Failed(e.to_string()));
            }
        });
    }
}

async fn relay_events(
    request: RequestBuilder,
    events: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<()> {
    let response = request.send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("Gateway returned {}: {}", status, body);
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        bail!("{}", message);
    }

    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();
    while let Some(chunk) = body.next().await {
        lines.extend(&chunk?);
        while let Some(line) = lines.next_line() {
            if forward_line(&line, events) {
                return Ok(());
            }
        }
    }
    if let Some(line) = lines.finish() {
        if forward_line(&line, events) {
            return Ok(());
        }
    }

    debug!("Event stream closed without a completion marker");
    let _ = events.send(StreamEvent::Done);
    Ok(())
}

/// Sends the events carried by one SSE line. Returns true once the
/// generation is over or the receiver is gone.
fn forward_line(line: &[u8], events: &mpsc::UnboundedSender<StreamEvent>) -> bool {
    for event in parse_event(line) {
        let finished = !matches!(event, StreamEvent::Delta(_));
        if events.send(event).is_err() || finished {
            return true;
        }
    }
    false
}

fn parse_event(line: &[u8]) -> Vec<StreamEvent> {
    let Some(data) = line.strip_prefix(b"data: ") else {
        return Vec::new();
    };
    let chunk: BackendChunk = match serde_json::from_slice(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Ignoring undecodable event: {}", e);
            return Vec::new();
        }
    };

    if let Some(error) = chunk.error {
        return vec![StreamEvent::Failed(error)];
    }

    let mut parsed = Vec::new();
    if !chunk.text().is_empty() {
        parsed.push(StreamEvent::Delta(chunk.text().to_string()));
    }
    if chunk.done {
        parsed.push(StreamEvent::Done);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_events_become_deltas() {
        assert_eq!(
            parse_event(br#"data: {"response":"Hel","done":false}"#),
            vec![StreamEvent::Delta("Hel".into())]
        );
        assert_eq!(
            parse_event(br#"data: {"message":{"role":"assistant","content":"lo"},"done":false}"#),
            vec![StreamEvent::Delta("lo".into())]
        );
    }

    #[test]
    fn final_event_can_carry_text() {
        assert_eq!(
            parse_event(br#"data: {"response":"!","done":true}"#),
            vec![StreamEvent::Delta("!".into()), StreamEvent::Done]
        );
        assert_eq!(
            parse_event(br#"data: {"response":"","done":true}"#),
            vec![StreamEvent::Done]
        );
    }

    #[test]
    fn error_events_fail_the_turn() {
        assert_eq!(
            parse_event(br#"data: {"error":"Ollama API error: overloaded"}"#),
            vec![StreamEvent::Failed("Ollama API error: overloaded".into())]
        );
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert!(parse_event(b": keep-alive").is_empty());
        assert!(parse_event(b"event: message").is_empty());
        assert!(parse_event(b"data: not json").is_empty());
    }

    #[test]
    fn forwarding_stops_at_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!forward_line(br#"data: {"response":"a","done":false}"#, &tx));
        assert!(forward_line(br#"data: {"response":"b","done":true}"#, &tx));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Delta("a".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Delta("b".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Done);
        assert!(rx.try_recv().is_err());
    }
}
