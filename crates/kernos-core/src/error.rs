//! Error types for kernos-core.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::document::CellKind;
use crate::worker::WorkerState;

/// Result type for kernos-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing kernels and executing cells.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed request field.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No active kernel for the notebook.
    #[error("kernel not initialized for notebook {}", .0.display())]
    KernelNotFound(PathBuf),

    /// Operation is not valid in the worker's current state.
    #[error("cannot {operation} while kernel is {state}")]
    InvalidState {
        operation: &'static str,
        state: WorkerState,
    },

    /// Cell index outside the notebook.
    #[error("cell index {index} out of range (notebook has {len} cells)")]
    CellIndexOutOfRange { index: i64, len: usize },

    /// Targeted cell is not a code cell.
    #[error("cell {index} is a {kind} cell, only code cells can be executed")]
    NotExecutable { index: usize, kind: CellKind },

    /// Failed to read a notebook document.
    #[error("failed to read notebook {}: {message}", path.display())]
    ReadNotebook { path: PathBuf, message: String },

    /// Failed to write a notebook document.
    #[error("failed to write notebook {}: {message}", path.display())]
    WriteNotebook { path: PathBuf, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Kernel process could not be spawned, talked to, or stopped.
    #[error("kernel process error: {0}")]
    Process(String),

    /// Kernel never became ready.
    #[error("kernel did not become ready within {}s", .0.as_secs_f64())]
    ReadyTimeout(Duration),

    /// No message from the kernel within the per-message bound.
    #[error("timeout waiting for kernel message after {}s", .0.as_secs_f64())]
    MessageTimeout(Duration),
}

/// Broad classification of [`Error`] values.
///
/// Request surfaces map these onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    Range,
    Type,
    Io,
    Process,
    Timeout,
}

impl ErrorKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Range => "range",
            Self::Type => "type",
            Self::Io => "io",
            Self::Process => "process",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::KernelNotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::CellIndexOutOfRange { .. } => ErrorKind::Range,
            Self::NotExecutable { .. } => ErrorKind::Type,
            Self::ReadNotebook { .. } | Self::WriteNotebook { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Process(_) => ErrorKind::Process,
            Self::ReadyTimeout(_) | Self::MessageTimeout(_) => ErrorKind::Timeout,
        }
    }

    /// Format the error with a recovery hint where one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Self::KernelNotFound(_) => Some("initialize the kernel for this notebook first"),
            Self::InvalidState {
                state: WorkerState::Executing,
                ..
            } => Some("wait for the running cell, or shut down and re-initialize the kernel"),
            Self::MessageTimeout(_) => {
                Some("the kernel is still busy; shut it down and initialize a fresh one")
            }
            Self::ReadyTimeout(_) | Self::Process(_) => {
                Some("check that the worker binary exists (set KERNOS_WORKER_PATH) and starts cleanly")
            }
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
