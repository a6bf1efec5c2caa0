//! HTTP surface for the web front-end.
//!
//! Routes are mounted under `/api`. Proxy and transfer calls answer with a
//! `{success, data}` envelope; failures use `{success: false, error}`.

mod error;
mod handlers;
mod types;

pub use error::{ApiError, ApiResult, ErrorEnvelope};
pub use handlers::INLINE_DOWNLOAD_LIMIT;
pub use types::*;

use crate::destination::BlobStore;
use crate::error::Result;
use crate::index::LocalIndex;
use crate::source::SourceConnector;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Default port of `serve`.
pub const DEFAULT_PORT: u16 = 3002;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Opens a source session per request, from the request's credentials.
    pub connector: Arc<dyn SourceConnector>,
    pub destination: Arc<dyn BlobStore>,
    pub index: Arc<LocalIndex>,
    /// Used when a request leaves `epochs` unset or zero.
    pub default_epochs: u32,
    /// Cancelled on server shutdown; aborts in-flight transfers.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        destination: Arc<dyn BlobStore>,
        index: Arc<LocalIndex>,
        default_epochs: u32,
    ) -> Self {
        Self {
            connector,
            destination,
            index,
            default_epochs,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/s3/proxy", post(handlers::s3_proxy))
        .route("/s3/transfer", post(handlers::s3_transfer))
        .route("/index/update", post(handlers::update_index));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until the state's shutdown token is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
