//! Health HTTP server.

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domains::storage::DocumentStore;
use crate::server::routes::health_handler;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub started_at: Instant,
    pub in_flight: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
            in_flight,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `cancel` fires.
pub async fn serve(port: u16, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health server to {}", addr))?;

    info!("Health server listening on {}", addr);
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Health server failed")?;

    Ok(())
}
