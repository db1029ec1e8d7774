//! Folio REST API server
//!
//! ## Configuration
//!
//! - `FOLIO_HOST` - Server host (default: "127.0.0.1")
//! - `FOLIO_PORT` - Server port (default: "3000")
//! - `API_TOKEN` - Bearer token for `/v1` routes (default: "dev_token")
//! - `TYPESENSE_*` - Index connection, see `FolioConfig`

use folio_core::{FolioConfig, IngestionService, SearchIndex, TypesenseIndex};
use folio_web::{app, AppState};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_web=info,folio_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FolioConfig::from_env()?;
    info!(
        "Using Typesense at {}://{}:{}",
        config.typesense_protocol, config.typesense_host, config.typesense_port
    );

    let index: Arc<dyn SearchIndex> = Arc::new(TypesenseIndex::new(&config)?);
    let service = Arc::new(IngestionService::from_config(&config, index)?);
    let state = AppState::new(service, config.api_token.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting Folio Web API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
