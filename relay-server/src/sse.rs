//! Re-streams backend lines as Server-Sent Events.
//!
//! Each line that parses as JSON becomes one `data:` event carrying the line
//! verbatim, whatever fields it has. Lines that are not valid JSON are
//! dropped. The stream ends after the backend's `done: true` line, after a
//! single error event, or when the backend closes the connection, whichever
//! comes first.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::upstream::LineStream;

pub fn restream(lines: LineStream) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    Sse::new(events(lines))
}

fn events(lines: LineStream) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        loop {
            match lines.next().await? {
                Ok(line) => {
                    let Some(chunk) = decode_line(&line) else {
                        continue;
                    };
                    let event = Event::default().data(String::from_utf8_lossy(&line));
                    if is_done(&chunk) {
                        info!("Backend stream completed");
                        return Some((Ok(event), None));
                    }
                    return Some((Ok(event), Some(lines)));
                }
                Err(err) => {
                    warn!("Ending event stream with error: {}", err);
                    return Some((Ok(error_event(&err)), None));
                }
            }
        }
    })
}

fn decode_line(line: &[u8]) -> Option<Value> {
    match serde_json::from_slice(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            debug!("Skipping malformed backend line: {}", e);
            None
        }
    }
}

fn is_done(chunk: &Value) -> bool {
    chunk.get("done").and_then(Value::as_bool).unwrap_or(false)
}

fn error_event(err: &RelayError) -> Event {
    Event::default().data(json!({ "error": err.event_message() }).to_string())
}
