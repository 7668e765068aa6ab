//! Command API: init, execute, and shutdown for notebook kernels.
//!
//! Every operation is synchronous and independent; callers on async runtimes
//! should run them on a blocking thread.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::error::{Error, Result};
use crate::execute::ExecutionCoordinator;
use crate::ipc::KernelLauncher;
use crate::paths::DocumentId;
use crate::registry::{Acquired, SessionInfo, SessionRegistry};
use crate::store::DocumentStore;

/// Outcome of `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStatus {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "already-running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    pub status: InitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub outputs: Vec<String>,
}

/// Outcome of `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownStatus {
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub status: ShutdownStatus,
}

/// Kernel sessions for many notebooks, one kernel each.
pub struct KernelService {
    registry: Arc<SessionRegistry>,
    coordinator: ExecutionCoordinator,
}

impl KernelService {
    pub fn new(
        launcher: Arc<dyn KernelLauncher>,
        store: Arc<dyn DocumentStore>,
        config: KernelConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(launcher, config.ready_timeout));
        let coordinator = ExecutionCoordinator::new(registry.clone(), store, config);
        Self {
            registry,
            coordinator,
        }
    }

    /// Start the kernel for a notebook, or report that it is running.
    pub fn init(&self, notebook_path: impl AsRef<Path>) -> Result<InitResponse> {
        let document = DocumentId::new(notebook_path)?;
        let (worker, acquired) = self.registry.acquire_or_create(&document)?;

        let status = match acquired {
            Acquired::Started => InitStatus::Started,
            Acquired::Existing => {
                tracing::debug!("Kernel {} already running for {}", worker.id(), document);
                InitStatus::AlreadyRunning
            }
        };
        Ok(InitResponse { status })
    }

    /// Execute one cell on the notebook's running kernel.
    pub fn execute_cell(
        &self,
        notebook_path: impl AsRef<Path>,
        cell_index: i64,
    ) -> Result<ExecuteResponse> {
        let document = DocumentId::new(notebook_path)?;
        let outputs = self.coordinator.execute(&document, cell_index)?;
        Ok(ExecuteResponse { outputs })
    }

    /// Stop the notebook's kernel and forget the session.
    ///
    /// The session is removed even if the process fails to stop cleanly.
    pub fn shutdown(&self, notebook_path: impl AsRef<Path>) -> Result<ShutdownResponse> {
        let document = DocumentId::new(notebook_path)?;
        let worker = self
            .registry
            .remove(&document)
            .ok_or_else(|| Error::KernelNotFound(document.path().to_path_buf()))?;

        worker.terminate()?;
        tracing::info!("Kernel shutdown for notebook: {}", document);
        Ok(ShutdownResponse {
            status: ShutdownStatus::Stopped,
        })
    }

    /// Live sessions, sorted by notebook path.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.sessions()
    }

    /// Stop every kernel. Returns how many were stopped.
    pub fn shutdown_all(&self) -> usize {
        let workers = self.registry.drain();
        for worker in &workers {
            if let Err(e) = worker.terminate() {
                tracing::warn!("Failed to stop kernel for {}: {}", worker.document(), e);
            }
        }
        if !workers.is_empty() {
            tracing::info!("Stopped {} kernels", workers.len());
        }
        workers.len()
    }
}
