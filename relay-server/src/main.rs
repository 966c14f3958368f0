use anyhow::Context;
use relay_server::{create_router, GatewayConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("relay_server=info,tower_http=info")),
        )
        .init();

    let config = Arc::new(GatewayConfig::from_env()?);
    info!(
        "Using Ollama at {} with model {}",
        config.ollama_api_base, config.ollama_model
    );

    let app = create_router(config.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
