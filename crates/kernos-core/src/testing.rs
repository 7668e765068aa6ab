//! Scripted in-process kernels for tests.
//!
//! A [`ScriptedLauncher`] hands out channels that replay canned event
//! sequences instead of running code, and records what they were asked to do.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::{ExecutionState, OutputEvent};
use crate::ipc::{KernelChannel, KernelLauncher};
use crate::sync::lock;

/// One step of a scripted execution.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver this event.
    Event(OutputEvent),
    /// Deliver nothing; every receive from here on times out.
    Silence,
    /// The kernel dies; every receive from here on fails.
    Exit,
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    launched: Mutex<Vec<PathBuf>>,
    submitted: Mutex<Vec<String>>,
    shutdowns: AtomicUsize,
}

/// Launcher for scripted kernels.
///
/// Each submitted code unit consumes the next script queued with
/// [`on_code`](Self::on_code); with none queued the kernel goes straight to
/// idle.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    shared: Arc<Shared>,
    ready_delay: Duration,
    never_ready: bool,
    fail_launch: bool,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the steps played back for the next submission.
    pub fn on_code(self, steps: Vec<Step>) -> Self {
        self.push_script(steps);
        self
    }

    /// Queue a script on a launcher that is already in use.
    pub fn push_script(&self, steps: Vec<Step>) {
        lock(&self.shared.scripts).push_back(steps);
    }

    /// Kernels take `delay` to become ready.
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Kernels never acknowledge readiness.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Launching fails as if the program could not be spawned.
    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Working directories of every launched kernel, in order.
    pub fn launched_dirs(&self) -> Vec<PathBuf> {
        lock(&self.shared.launched).clone()
    }

    /// Number of kernels launched.
    pub fn launches(&self) -> usize {
        lock(&self.shared.launched).len()
    }

    /// Every code unit submitted to any kernel, in order.
    pub fn submitted(&self) -> Vec<String> {
        lock(&self.shared.submitted).clone()
    }

    /// Number of kernels that were shut down.
    pub fn shutdowns(&self) -> usize {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }
}

impl KernelLauncher for ScriptedLauncher {
    fn launch(&self, working_dir: &Path) -> Result<Box<dyn KernelChannel>> {
        if self.fail_launch {
            return Err(Error::Process("scripted launch failure".to_string()));
        }
        lock(&self.shared.launched).push(working_dir.to_path_buf());
        Ok(Box::new(ScriptedChannel {
            shared: self.shared.clone(),
            ready_delay: self.ready_delay,
            never_ready: self.never_ready,
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedChannel {
    shared: Arc<Shared>,
    ready_delay: Duration,
    never_ready: bool,
    pending: Mutex<VecDeque<Step>>,
    closed: AtomicBool,
}

impl KernelChannel for ScriptedChannel {
    fn wait_ready(&self, timeout: Duration) -> Result<()> {
        if self.never_ready {
            thread::sleep(timeout);
            return Err(Error::ReadyTimeout(timeout));
        }
        thread::sleep(self.ready_delay);
        Ok(())
    }

    fn send_code(&self, code: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Process("scripted kernel is shut down".to_string()));
        }
        lock(&self.shared.submitted).push(code.to_string());
        let script = lock(&self.shared.scripts)
            .pop_front()
            .unwrap_or_else(|| vec![Step::Event(OutputEvent::Status(ExecutionState::Idle))]);
        *lock(&self.pending) = script.into();
        Ok(())
    }

    fn recv_event(&self, timeout: Duration) -> Result<OutputEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Process("scripted kernel is shut down".to_string()));
        }
        let next = {
            let mut pending = lock(&self.pending);
            match pending.front() {
                Some(Step::Event(_)) => pending.pop_front(),
                Some(step) => Some(step.clone()),
                None => None,
            }
        };
        match next {
            Some(Step::Event(event)) => Ok(event),
            Some(Step::Exit) => Err(Error::Process("scripted kernel exited".to_string())),
            Some(Step::Silence) | None => {
                thread::sleep(timeout);
                Err(Error::MessageTimeout(timeout))
            }
        }
    }

    fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
