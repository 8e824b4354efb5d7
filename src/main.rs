//! Docflow server - Binary Entry Point
//!
//! Serves one store over HTTP: the RPC surface on /rpc, the pull
//! cursor on /events, dead-letter inspection on /events/failed and the
//! WebSocket push channel on /subscribe.
//!
//! ## Environment Variables
//!
//! | Variable         | Default        | Description            |
//! |------------------|----------------|------------------------|
//! | DOCFLOW_DATA_DIR | ./data         | Store data directory   |
//! | DOCFLOW_BIND     | 127.0.0.1:8080 | Listen address         |
//! | RUST_LOG         | info           | Tracing filter         |

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use docflow::api::create_router;
use docflow::config::StoreConfig;
use docflow::store::Store;

/// Environment variable overriding the listen address.
const BIND_ENV: &str = "DOCFLOW_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = StoreConfig::from_env();
    tracing::info!(
        version = docflow::VERSION,
        data_dir = %config.data_dir.display(),
        "starting docflow server"
    );

    let store = Arc::new(Store::open(config)?);
    let app = create_router(store);

    let bind = std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(address = %bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install shutdown signal handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
