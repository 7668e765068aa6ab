//! HTTP routes for Kernos server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    response::Json,
    routing::{get, post},
};
use kernos_core::{ExecuteResponse, InitResponse, KernelService, ShutdownResponse};
use tower_http::cors::CorsLayer;

use crate::error::{ServerError, ServerResult};
use crate::protocol::{ExecuteCellRequest, HealthResponse, KernelsResponse, NotebookRequest};

/// Application state shared across handlers.
pub struct AppState {
    /// Kernel sessions for every notebook.
    pub service: Arc<KernelService>,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/kernels", get(kernels_handler))
        .route("/init_kernel", post(init_kernel_handler))
        .route("/execute_cell", post(execute_cell_handler))
        .route("/shutdown_kernel", post(shutdown_kernel_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// List live kernel sessions.
async fn kernels_handler(State(state): State<Arc<AppState>>) -> Json<KernelsResponse> {
    Json(KernelsResponse {
        kernels: state.service.sessions(),
    })
}

async fn init_kernel_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotebookRequest>, JsonRejection>,
) -> ServerResult<Json<InitResponse>> {
    let Json(request) = payload?;
    tracing::debug!("init_kernel {}", request.notebook_path);

    let service = state.service.clone();
    let response = run_blocking(move || service.init(&request.notebook_path)).await?;
    Ok(Json(response))
}

async fn execute_cell_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteCellRequest>, JsonRejection>,
) -> ServerResult<Json<ExecuteResponse>> {
    let Json(request) = payload?;
    tracing::debug!(
        "execute_cell {} [{}]",
        request.notebook_path,
        request.cell_index
    );

    let service = state.service.clone();
    let response =
        run_blocking(move || service.execute_cell(&request.notebook_path, request.cell_index))
            .await?;
    Ok(Json(response))
}

async fn shutdown_kernel_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotebookRequest>, JsonRejection>,
) -> ServerResult<Json<ShutdownResponse>> {
    let Json(request) = payload?;
    tracing::debug!("shutdown_kernel {}", request.notebook_path);

    let service = state.service.clone();
    let response = run_blocking(move || service.shutdown(&request.notebook_path)).await?;
    Ok(Json(response))
}

/// Run a kernel command on the blocking pool.
///
/// Kernel commands do synchronous IPC and may wait up to the configured
/// timeouts, so they must not run on the async workers.
async fn run_blocking<T, F>(command: F) -> ServerResult<T>
where
    F: FnOnce() -> kernos_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(command)
        .await
        .map_err(|e| ServerError::Task(e.to_string()))?
        .map_err(ServerError::from)
}
