//! Abstractions over a running kernel and how to start one.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::event::OutputEvent;

/// Bidirectional link to one running kernel.
///
/// Methods take `&self` so that a kernel can be stopped from one thread while
/// another thread is blocked waiting for its next event.
pub trait KernelChannel: Send + Sync {
    /// Block until the kernel acknowledges it is ready.
    ///
    /// Fails with [`Error::ReadyTimeout`](crate::Error::ReadyTimeout) if no
    /// acknowledgement arrives within `timeout`.
    fn wait_ready(&self, timeout: Duration) -> Result<()>;

    /// Send one unit of code for execution.
    fn send_code(&self, code: &str) -> Result<()>;

    /// Block for the next output event.
    ///
    /// Fails with [`Error::MessageTimeout`](crate::Error::MessageTimeout) if
    /// nothing arrives within `timeout`.
    fn recv_event(&self, timeout: Duration) -> Result<OutputEvent>;

    /// Stop the kernel. Calling this more than once is a no-op.
    fn shutdown(&self) -> Result<()>;

    /// OS process id, if the kernel is a process.
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Starts kernels.
pub trait KernelLauncher: Send + Sync {
    /// Start a kernel whose working directory is `working_dir`.
    fn launch(&self, working_dir: &Path) -> Result<Box<dyn KernelChannel>>;
}
