use std::sync::Arc;

use anyhow::Result;

use chatrelay_ai::GroqClient;
use chatrelay_server::config::Config;
use chatrelay_server::http::build_router;
use chatrelay_server::state::AppState;
use chatrelay_storage::StorageBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatrelay_server=debug".into()),
        )
        .with_target(false)
        .init();

    let config = Config::load()?;

    let store = chatrelay_storage::build(StorageBackend::Memory);

    let mut client = GroqClient::new(config.api_key.clone());
    if let Some(base_url) = &config.base_url {
        client = client.with_base_url(base_url.clone());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(Arc::new(client), store, Arc::new(config));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("server shutting down");
        })
        .await?;

    Ok(())
}
