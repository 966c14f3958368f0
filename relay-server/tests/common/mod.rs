//! Shared helpers for gateway integration tests: a recording mock backend
//! and request/response plumbing for driving the router directly.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode, Uri};
use axum::routing::any;
use axum::Router;
use futures_util::stream;
use http_body_util::BodyExt;
use relay_server::{create_router, GatewayConfig};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

/// One request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub payload: Option<serde_json::Value>,
}

/// A real HTTP server on an ephemeral port that answers every backend route
/// with a fixed status and body and records what it received.
pub struct MockBackend {
    pub api_base: String,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockBackend {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handler = {
            let calls = calls.clone();
            let requests = requests.clone();
            move |uri: Uri, payload: Bytes| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                requests.lock().unwrap().push(Recorded {
                    path: uri.path().to_string(),
                    payload: serde_json::from_slice(&payload).ok(),
                });
                (status, [(header::CONTENT_TYPE, "application/json")], body)
            }
        };

        let app = Router::new()
            .route("/api/chat", any(handler.clone()))
            .route("/api/generate", any(handler.clone()))
            .route("/api/tags", any(handler));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            api_base: format!("http://{}/api", addr),
            calls,
            requests,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().expect("backend was not called")
    }
}

/// Fires once its owner is dropped.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// A backend whose streaming routes send `first_line` and then stall forever.
/// The receiver resolves once the backend has dropped the response body,
/// which happens when the gateway closes the connection.
pub async fn stalling_backend(first_line: &'static str) -> (String, oneshot::Receiver<()>) {
    let (dropped_tx, dropped_rx) = oneshot::channel();
    let dropped_tx = Arc::new(Mutex::new(Some(dropped_tx)));

    let handler = move || async move {
        let signal = DropSignal(dropped_tx.lock().unwrap().take());
        let body = stream::unfold((signal, false), move |(signal, sent)| async move {
            if sent {
                std::future::pending::<()>().await;
            }
            let line = Bytes::from(format!("{}\n", first_line));
            Some((Ok::<_, Infallible>(line), (signal, true)))
        });
        (StatusCode::OK, Body::from_stream(body))
    };

    let app = Router::new()
        .route("/api/chat", any(handler.clone()))
        .route("/api/generate", any(handler));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api", addr), dropped_rx)
}

/// Base URL of a port nothing listens on, so connecting is refused.
pub async fn unreachable_api_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

pub fn gateway(api_base: &str) -> Router {
    create_router(Arc::new(GatewayConfig {
        ollama_api_base: api_base.to_string(),
        ..GatewayConfig::default()
    }))
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

/// Payloads of the `data:` events in an SSE body, in order.
pub fn sse_data(body: &str) -> Vec<&str> {
    body.split("\n\n")
        .filter(|event| !event.is_empty())
        .map(|event| event.strip_prefix("data: ").expect("event without data field"))
        .collect()
}
