//! HTTP surface of the gateway.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{AllowedOrigins, GatewayConfig, PublicConfig};
use crate::error::RelayError;
use crate::relay::RelayService;
use crate::sse;
use crate::upstream::OllamaClient;

pub fn create_router(config: Arc<GatewayConfig>) -> Router {
    let relay = Arc::new(RelayService::new(
        OllamaClient::new(config.ollama_api_base.clone()),
        config.ollama_model.clone(),
    ));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/models", get({
            let relay = relay.clone();
            move || models(relay)
        }))
        .route("/api/chat", post({
            let relay = relay.clone();
            move |body| chat(body, relay)
        }))
        .route("/api/chat/stream", post({
            let relay = relay.clone();
            move |body| chat_stream(body, relay)
        }))
        .route("/api/generate", post({
            let relay = relay.clone();
            move |body| generate(body, relay)
        }))
        .route("/api/generate/stream", post({
            let relay = relay.clone();
            move |body| generate_stream(body, relay)
        }))
        .route("/api/config", get({
            let config = config.clone();
            move || config_view(config)
        }));

    if let Some(dir) = &config.static_dir {
        info!("Serving static files from {}", dir.display());
        app = app
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .fallback_service(ServeDir::new(dir));
    }

    app.layer(build_cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(origins) => {
            CorsLayer::new()
                .allow_origin(parse_origins(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid allowed origin {:?}: {}", origin, e);
                None
            }
        })
        .collect()
}

async fn health() -> &'static str {
    "OK"
}

fn json_body(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn models(relay: Arc<RelayService>) -> Result<Response, RelayError> {
    relay.models().await.map(json_body)
}

async fn chat(body: Bytes, relay: Arc<RelayService>) -> Result<Response, RelayError> {
    relay.chat(&body).await.map(json_body)
}

async fn generate(body: Bytes, relay: Arc<RelayService>) -> Result<Response, RelayError> {
    relay.generate(&body).await.map(json_body)
}

async fn chat_stream(body: Bytes, relay: Arc<RelayService>) -> Result<Response, RelayError> {
    let lines = relay.chat_stream(&body)?;
    Ok(sse::restream(lines).into_response())
}

async fn generate_stream(body: Bytes, relay: Arc<RelayService>) -> Result<Response, RelayError> {
    let lines = relay.generate_stream(&body)?;
    Ok(sse::restream(lines).into_response())
}

async fn config_view(config: Arc<GatewayConfig>) -> Json<PublicConfig> {
    Json(config.public())
}
