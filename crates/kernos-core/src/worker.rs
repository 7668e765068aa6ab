//! Worker handle: one kernel process and its lifecycle.
//!
//! ```text
//! Uninitialized ─► Starting ─► Ready ◄──► Executing
//!                     │          │            │
//!                     ▼          ▼            ▼
//!                Terminated ◄─ ShuttingDown ◄─┘
//! ```

use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event::OutputEvent;
use crate::ipc::{KernelChannel, KernelLauncher};
use crate::paths::DocumentId;
use crate::sync::lock;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Uninitialized,
    Starting,
    Ready,
    Executing,
    ShuttingDown,
    Terminated,
}

impl WorkerState {
    /// Whether the worker can still be used.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        })
    }
}

/// Handle to the kernel serving one notebook.
///
/// All methods take `&self`; the handle is shared behind an `Arc` between
/// the registry and the request currently using it. The state lock is only
/// held for transitions, never while waiting on the kernel.
pub struct WorkerHandle {
    /// Unique per started worker, so a restarted kernel is distinguishable.
    id: Uuid,
    document: DocumentId,
    state: Mutex<WorkerState>,
    channel: OnceLock<Box<dyn KernelChannel>>,
}

impl WorkerHandle {
    /// Create a handle that has not started a kernel yet.
    pub fn new(document: DocumentId) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
            state: Mutex::new(WorkerState::Uninitialized),
            channel: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    /// OS process id of the kernel, once started.
    pub fn pid(&self) -> Option<u32> {
        self.channel.get().and_then(|c| c.pid())
    }

    /// Launch the kernel in the notebook's directory and wait for readiness.
    ///
    /// On failure the worker is left `Terminated` and any spawned process is
    /// stopped.
    pub fn start(&self, launcher: &dyn KernelLauncher, ready_timeout: Duration) -> Result<()> {
        self.transition("start", |state| match state {
            WorkerState::Uninitialized => Some(WorkerState::Starting),
            _ => None,
        })?;

        tracing::info!(
            "Starting kernel {} for {} in {}",
            self.id,
            self.document,
            self.document.working_dir().display()
        );

        let channel = match launcher.launch(self.document.working_dir()) {
            Ok(channel) => channel,
            Err(e) => {
                self.set_state(WorkerState::Terminated);
                return Err(e);
            }
        };

        if let Err(e) = channel.wait_ready(ready_timeout) {
            if let Err(stop_err) = channel.shutdown() {
                tracing::warn!("Failed to stop unready kernel: {}", stop_err);
            }
            self.set_state(WorkerState::Terminated);
            return Err(e);
        }

        // Only `start` sets the channel and it runs at most once per handle
        let _ = self.channel.set(channel);

        let ready = self.transition("finish starting", |state| match state {
            WorkerState::Starting => Some(WorkerState::Ready),
            _ => None,
        });
        if let Err(e) = ready {
            // Terminated while starting
            if let Some(channel) = self.channel.get() {
                let _ = channel.shutdown();
            }
            return Err(e);
        }

        tracing::info!("Kernel {} ready for {}", self.id, self.document);
        Ok(())
    }

    /// Send code to the kernel. Only valid while `Ready`.
    pub fn submit(&self, code: &str) -> Result<()> {
        self.transition("submit code", |state| match state {
            WorkerState::Ready => Some(WorkerState::Executing),
            _ => None,
        })?;

        let channel = self.live_channel("submit code")?;
        if let Err(e) = channel.send_code(code) {
            tracing::error!("Kernel {} rejected code: {}", self.id, e);
            self.fail();
            return Err(e);
        }
        Ok(())
    }

    /// Wait up to `timeout` for the next output event. Only valid while
    /// `Executing`.
    ///
    /// The idle signal returns the worker to `Ready`. A timeout leaves it
    /// `Executing`; a dead kernel leaves it `Terminated`.
    pub fn receive_event(&self, timeout: Duration) -> Result<OutputEvent> {
        let state = self.state();
        if state != WorkerState::Executing {
            return Err(Error::InvalidState {
                operation: "receive output",
                state,
            });
        }

        let channel = self.live_channel("receive output")?;
        match channel.recv_event(timeout) {
            Ok(event) => {
                if event.is_idle() {
                    // A concurrent terminate wins over the idle transition
                    let _ = self.transition("finish execution", |state| match state {
                        WorkerState::Executing => Some(WorkerState::Ready),
                        _ => None,
                    });
                }
                Ok(event)
            }
            Err(e @ Error::MessageTimeout(_)) => Err(e),
            Err(e) => {
                if self.state().is_live() {
                    tracing::error!("Kernel {} failed: {}", self.id, e);
                }
                self.fail();
                Err(e)
            }
        }
    }

    /// Stop the kernel. Idempotent.
    pub fn terminate(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if !state.is_live() {
                return Ok(());
            }
            *state = WorkerState::ShuttingDown;
        }

        tracing::info!("Shutting down kernel {} for {}", self.id, self.document);
        let result = match self.channel.get() {
            Some(channel) => channel.shutdown(),
            None => Ok(()),
        };
        self.set_state(WorkerState::Terminated);
        result
    }

    fn live_channel(&self, operation: &'static str) -> Result<&dyn KernelChannel> {
        self.channel
            .get()
            .map(|c| &**c)
            .ok_or(Error::InvalidState {
                operation,
                state: WorkerState::Uninitialized,
            })
    }

    /// Apply `next` to the current state atomically.
    fn transition(
        &self,
        operation: &'static str,
        next: impl FnOnce(WorkerState) -> Option<WorkerState>,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        match next(*state) {
            Some(new_state) => {
                tracing::debug!("Kernel {}: {} -> {}", self.id, *state, new_state);
                *state = new_state;
                Ok(())
            }
            None => Err(Error::InvalidState {
                operation,
                state: *state,
            }),
        }
    }

    fn set_state(&self, new_state: WorkerState) {
        *lock(&self.state) = new_state;
    }

    /// Stop a kernel whose channel broke.
    fn fail(&self) {
        if let Err(e) = self.terminate() {
            tracing::warn!("Failed to stop broken kernel {}: {}", self.id, e);
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("document", &self.document)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
