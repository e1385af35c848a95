use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use llm_bridge::config::GatewayConfig;
use llm_bridge::error::LlmError;
use llm_bridge::router::Router;
use llm_bridge::server_adapters::axum::app;

/// OpenAI-compatible gateway in front of multiple LLM providers.
#[derive(Debug, Parser)]
#[command(name = "llm-bridge", version, about)]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(short, long, env = "LLM_BRIDGE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overrides `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    let args = Args::parse();
    let config = GatewayConfig::load(&args.config)?;
    let _guard = llm_bridge::telemetry::init_tracing(&config.logging)?;

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let address = format!("{host}:{port}");

    let gateway = Arc::new(Router::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| LlmError::ConfigurationError(format!("Failed to bind {address}: {e}")))?;
    tracing::info!(address = %address, "llm-bridge listening");

    let served = axum::serve(listener, app(Arc::clone(&gateway)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    gateway.close().await;
    served.map_err(|e| LlmError::InternalError(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
