// HTTP server: axum router plus shared application state.

pub mod routes;

use axum::http::{header, Method};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::audio::analyze::Analyzer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::jobs::store::JobStore;
use crate::pipeline::MediaPipeline;

/// Shared state handed to every request handler.
pub struct AppState {
    pub store: Arc<JobStore>,
    pub analyzer: Arc<Analyzer>,
    pub pipeline: Arc<dyn MediaPipeline>,
    /// Root directory under which per-job scratch directories are created.
    pub temp_root: PathBuf,
}

/// Build the application router with CORS for browser clients.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .merge(routes::api_routes())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::InvalidInput(format!("invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))
}
