//! Inter-process communication with kernel worker processes.
//!
//! This module provides the wire protocol, the channel abstraction the rest
//! of the crate is written against, and the child-process implementation.

mod channel;
mod process;
pub mod protocol;

pub use channel::{KernelChannel, KernelLauncher};
pub use process::{ProcessChannel, ProcessLauncher, WORKER_PATH_ENV};
pub use protocol::{WorkerCommand, WorkerReply, read_message, write_message};
