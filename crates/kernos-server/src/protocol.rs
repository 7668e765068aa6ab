//! Request and response bodies for the HTTP API.

use kernos_core::SessionInfo;
use serde::{Deserialize, Serialize};

/// Body of `/init_kernel` and `/shutdown_kernel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookRequest {
    pub notebook_path: String,
}

/// Body of `/execute_cell`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCellRequest {
    pub notebook_path: String,
    pub cell_index: i64,
}

/// Body of `GET /kernels`.
#[derive(Debug, Clone, Serialize)]
pub struct KernelsResponse {
    pub kernels: Vec<SessionInfo>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
