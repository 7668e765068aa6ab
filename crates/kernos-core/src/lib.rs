//! Core engine for Kernos notebook kernels.
//!
//! This crate provides:
//! - nbformat v4 documents and stable cell identities
//! - Kernel worker processes spoken to over a line-delimited JSON protocol
//! - A session registry keeping one live kernel per notebook
//! - Single-cell execution that drains output until the kernel is idle

pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod execute;
pub mod ipc;
pub mod paths;
pub mod registry;
pub mod service;
pub mod store;
mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use config::KernelConfig;
pub use document::{Cell, CellId, CellKind, CellOutput, Document, assign_cell_ids};
pub use error::{Error, ErrorKind, Result};
pub use event::{ExecutionState, OutputEvent, StreamName};
pub use execute::ExecutionCoordinator;
pub use ipc::{KernelChannel, KernelLauncher, ProcessLauncher};
pub use paths::DocumentId;
pub use registry::{Acquired, SessionInfo, SessionRegistry};
pub use service::{
    ExecuteResponse, InitResponse, InitStatus, KernelService, ShutdownResponse, ShutdownStatus,
};
pub use store::{DocumentStore, IpynbStore};
pub use worker::{WorkerHandle, WorkerState};
