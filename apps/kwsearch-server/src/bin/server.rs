use std::sync::Arc;

use kwsearch_core::config::Settings;
use kwsearch_server::{create_router, SearchService};
use kwsearch_text::CroissantIndexer;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().map_err(|e| {
        error!("Failed to load config: {}", e);
        e
    })?;
    let port = settings.port;
    info!("Serving collection {} from {}", settings.collection_name, settings.data_dir.display());

    let service = tokio::task::spawn_blocking(move || SearchService::start(settings, Arc::new(CroissantIndexer)))
        .await?
        .map_err(|e| {
            error!("Startup failed: {:#}", e);
            e
        })?;
    let app = create_router(Arc::new(service));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server started, listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, shutting down server");
        })
        .await?;
    Ok(())
}
