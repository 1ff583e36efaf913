//! discussmail web server.
//!
//! Provides an Axum-based HTTP server with:
//! - The webhook receiver (`POST`/`PUT /hook`)
//! - A health endpoint

pub mod api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use discussmail_core::{Composer, SharedOriginRanges};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub composer: Arc<Composer>,
    /// Current permitted webhook origin ranges, refreshed in the background.
    pub origins: Arc<SharedOriginRanges>,
    /// Read the origin address from `X-Forwarded-For` when present.
    pub trust_forwarded_for: bool,
}

/// Build the router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::status::routes())
        .merge(api::hook::routes())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB max request body
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Serve on `listen_addr` until `shutdown` resolves.
    pub async fn start<F>(self, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr.parse()?;
        let app = build_router(self.state);

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }
}
