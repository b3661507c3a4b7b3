//! HTTP surface: liveness check plus the MCP streamable HTTP endpoint.
//!
//! - `GET /health`: `{"status": "healthy"}`
//! - `/mcp`: stateless streamable HTTP (no session store)

use axum::{routing::get, Json, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use tokio::net::ToSocketAddrs;
use tracing::info;

use crate::tools::KgateMcpService;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Router serving `/health` and `/mcp` for one service instance.
pub fn router(service: KgateMcpService) -> Router {
    let mut config = StreamableHttpServerConfig::default();
    config.stateful_mode = false;

    let mcp = StreamableHttpService::new(
        move || Ok(service.clone()),
        LocalSessionManager::default().into(),
        config,
    );

    Router::new()
        .route("/health", get(health))
        .nest_service("/mcp", mcp)
}

/// Bind `addr` and serve until the process is stopped.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound or the server fails.
pub async fn serve(service: KgateMcpService, addr: impl ToSocketAddrs) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving MCP over streamable HTTP");
    axum::serve(listener, router(service)).await
}
