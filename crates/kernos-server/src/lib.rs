//! Kernos notebook kernel server.
//!
//! Exposes the kernel command API over HTTP with JSON bodies:
//! - `POST /init_kernel`: start the kernel for a notebook
//! - `POST /execute_cell`: run one cell and return its outputs
//! - `POST /shutdown_kernel`: stop the kernel for a notebook
//! - `GET /kernels`: list live kernels
//! - `GET /health`: liveness check

pub mod error;
pub mod protocol;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use kernos_core::KernelService;

pub use error::{ServerError, ServerResult};
pub use routes::{AppState, create_router};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
        }
    }
}

/// Serve the kernel API until Ctrl+C, then stop every kernel.
pub async fn serve(service: Arc<KernelService>, config: ServerConfig) -> ServerResult<()> {
    let state = Arc::new(AppState {
        service: service.clone(),
    });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting Kernos server at http://{}", addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let served = server.await;

    // Kernels are stopped even if serving failed
    let stopped = tokio::task::spawn_blocking(move || service.shutdown_all())
        .await
        .map_err(|e| ServerError::Task(e.to_string()))?;
    tracing::info!("Server shutdown complete ({} kernels stopped)", stopped);

    served?;
    Ok(())
}
