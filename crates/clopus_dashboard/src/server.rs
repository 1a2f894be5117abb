//! HTTP server for the dashboard

use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use clopus_common::{LogTail, Store, StoreError, StoreResult, LOG_PLACEHOLDER};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub log_tail: LogTail,
}

impl AppState {
    pub fn new(store: Store, log_tail: LogTail) -> Self {
        Self { store, log_tail }
    }

    /// Run a store closure on the blocking pool
    pub async fn with_store<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Store) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Current log tail; never fails
    pub async fn read_log(&self) -> String {
        let tail = self.log_tail.clone();
        tokio::task::spawn_blocking(move || tail.read())
            .await
            .unwrap_or_else(|e| {
                warn!("Log tail task failed: {}", e);
                LOG_PLACEHOLDER.to_string()
            })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::page_routes())
        .merge(routes::partial_routes())
        .merge(routes::api_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C or SIGTERM
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Dashboard listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
