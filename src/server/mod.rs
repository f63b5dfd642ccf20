//! HTTP boundary
//!
//! Thin axum wrapper around the pipeline: multipart image upload in, JSON
//! plate list out. Input validation happens here so the core never sees a
//! missing or undecodable image.

mod routes;

pub use routes::{router, AppState};

use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use crate::config::ServerSettings;
use crate::vision::PlateReader;

/// Bind and serve until shutdown.
pub async fn run_server(settings: ServerSettings, reader: PlateReader) -> Result<()> {
    let state = AppState::new(reader);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Plate recognition API listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
