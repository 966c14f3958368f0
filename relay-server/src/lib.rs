//! HTTP gateway in front of an Ollama-compatible inference backend.
//!
//! Chat and generate requests are validated, forwarded to the backend and
//! answered either with the backend's JSON body or, on the `/stream` routes,
//! with one Server-Sent Event per streamed backend line.

pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
pub mod sse;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::RelayError;
pub use routes::create_router;
