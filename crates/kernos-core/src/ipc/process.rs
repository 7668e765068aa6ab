//! Kernels running as child processes.
//!
//! Provides `ProcessLauncher` for spawning worker processes and
//! `ProcessChannel` for talking to one over its stdin/stdout.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::event::OutputEvent;
use crate::sync::lock;

use super::channel::{KernelChannel, KernelLauncher};
use super::protocol::{WorkerCommand, WorkerReply, read_message, write_message};

/// Environment variable naming the worker binary.
pub const WORKER_PATH_ENV: &str = "KERNOS_WORKER_PATH";

/// How long a worker gets to exit on its own before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Interval between exit checks during the grace period.
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

fn worker_binary_name() -> &'static str {
    if cfg!(windows) {
        "kernos-worker.exe"
    } else {
        "kernos-worker"
    }
}

/// Spawns worker processes from a fixed command line.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launch `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Builder: arguments passed to every spawned worker.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Launch the `kernos-worker` binary.
    ///
    /// Looks for it in the following order:
    /// 1. `KERNOS_WORKER_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    /// 4. The workspace `target/` directory (development builds)
    pub fn discover() -> Result<Self> {
        Self::find_worker_binary().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn find_worker_binary() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            tracing::warn!(
                "{} points to missing file {}",
                WORKER_PATH_ENV,
                path.display()
            );
        }

        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let worker_path = exe_dir.join(worker_binary_name());
            if worker_path.exists() {
                return Ok(worker_path);
            }
        }

        if let Ok(path) = which::which(worker_binary_name()) {
            return Ok(path);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            for profile in &["debug", "release"] {
                let path = PathBuf::from(&manifest_dir)
                    .join("..")
                    .join("..")
                    .join("target")
                    .join(profile)
                    .join(worker_binary_name());
                if path.exists() {
                    return Ok(path.canonicalize().unwrap_or(path));
                }
            }
        }

        Err(Error::Process(format!(
            "Could not find {} binary. Set {} or ensure it's in PATH.",
            worker_binary_name(),
            WORKER_PATH_ENV
        )))
    }
}

impl KernelLauncher for ProcessLauncher {
    fn launch(&self, working_dir: &Path) -> Result<Box<dyn KernelChannel>> {
        let channel = ProcessChannel::spawn(&self.program, &self.args, working_dir)?;
        Ok(Box::new(channel))
    }
}

/// Channel to a worker child process.
pub struct ProcessChannel {
    /// Process id, kept outside the lock for logging.
    pid: u32,
    /// The child process.
    child: Mutex<Child>,
    /// Buffered stdin writer; `None` once shut down.
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    /// Replies decoded by the reader thread.
    replies: Mutex<Receiver<WorkerReply>>,
    /// Whether shutdown has been requested.
    stopped: AtomicBool,
}

impl ProcessChannel {
    /// Spawn `program` in `working_dir` and start reading its stdout.
    pub fn spawn(program: &Path, args: &[String], working_dir: &Path) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .spawn()
            .map_err(|e| {
                Error::Process(format!(
                    "Failed to spawn worker process '{}' in {}: {}",
                    program.display(),
                    working_dir.display(),
                    e
                ))
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Process("Failed to get worker stdio".to_string()));
            }
        };

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name(format!("kernos-worker-{}", pid))
            .spawn(move || forward_replies(pid, stdout, tx));
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Process(format!("Failed to start reader thread: {}", e)));
        }

        tracing::debug!(
            "Spawned worker {} ({}) in {}",
            pid,
            program.display(),
            working_dir.display()
        );

        Ok(Self {
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            replies: Mutex::new(rx),
            stopped: AtomicBool::new(false),
        })
    }

    fn send_command(&self, cmd: &WorkerCommand) -> Result<()> {
        let mut stdin = lock(&self.stdin);
        match stdin.as_mut() {
            Some(writer) => write_message(writer, cmd),
            None => Err(Error::Process("Worker has been shut down".to_string())),
        }
    }

    /// Wait for the next reply until `deadline`.
    fn next_reply(&self, deadline: Instant) -> std::result::Result<WorkerReply, RecvTimeoutError> {
        let replies = lock(&self.replies);
        let remaining = deadline.saturating_duration_since(Instant::now());
        replies.recv_timeout(remaining)
    }
}

/// Decode worker stdout lines until EOF or the receiver goes away.
fn forward_replies(pid: u32, stdout: ChildStdout, tx: Sender<WorkerReply>) {
    let mut reader = BufReader::new(stdout);
    loop {
        match read_message::<_, WorkerReply>(&mut reader) {
            Ok(Some(reply)) => {
                if tx.send(reply).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(Error::Io(e)) => {
                tracing::warn!("Failed to read from worker {}: {}", pid, e);
                break;
            }
            Err(e) => tracing::warn!("Skipping malformed message from worker {}: {}", pid, e),
        }
    }
    tracing::debug!("Worker {} closed its output", pid);
}

impl KernelChannel for ProcessChannel {
    fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.next_reply(deadline) {
                Ok(WorkerReply::KernelReady) => return Ok(()),
                Ok(other) => {
                    tracing::debug!("Ignoring message from worker {} before ready: {:?}", self.pid, other);
                }
                Err(RecvTimeoutError::Timeout) => return Err(Error::ReadyTimeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Process(format!(
                        "Worker {} exited before becoming ready",
                        self.pid
                    )));
                }
            }
        }
    }

    fn send_code(&self, code: &str) -> Result<()> {
        self.send_command(&WorkerCommand::Execute {
            code: code.to_string(),
        })
    }

    fn recv_event(&self, timeout: Duration) -> Result<OutputEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.next_reply(deadline) {
                Ok(reply) => {
                    if let Some(event) = reply.into_event() {
                        return Ok(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Err(Error::MessageTimeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Process(format!("Worker {} exited", self.pid)));
                }
            }
        }
    }

    fn shutdown(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Try graceful shutdown first, closing stdin so the worker sees EOF
        let _ = self.send_command(&WorkerCommand::Shutdown);
        drop(lock(&self.stdin).take());

        let mut child = lock(&self.child);
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!("Worker {} exited with {}", self.pid, status);
                    return Ok(());
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(SHUTDOWN_POLL),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to poll worker {}: {}", self.pid, e);
                    break;
                }
            }
        }

        tracing::debug!("Worker {} did not exit in time, killing it", self.pid);
        child
            .kill()
            .map_err(|e| Error::Process(format!("Failed to kill worker {}: {}", self.pid, e)))?;

        // Wait to reap zombie
        child
            .wait()
            .map_err(|e| Error::Process(format!("Failed to wait for worker {}: {}", self.pid, e)))?;

        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        // Ensure worker is killed when the channel is dropped
        if let Err(e) = self.shutdown() {
            tracing::warn!("{}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const READY: &str = r#"echo '{"msg_type":"kernel_ready"}'"#;

    fn sh(script: &str) -> ProcessLauncher {
        ProcessLauncher::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_ready_then_events() {
        let script = format!(
            r#"{READY}
while IFS= read -r line; do
  case "$line" in
    *shutdown*) exit 0 ;;
  esac
  echo '{{"msg_type":"status","execution_state":"busy"}}'
  echo '{{"msg_type":"stream","name":"stdout","text":"hi"}}'
  echo '{{"msg_type":"status","execution_state":"idle"}}'
done"#
        );
        let dir = tempfile::tempdir().unwrap();
        let channel = sh(&script).launch(dir.path()).unwrap();

        channel.wait_ready(Duration::from_secs(5)).unwrap();
        channel.send_code("anything").unwrap();

        let timeout = Duration::from_secs(5);
        assert!(!channel.recv_event(timeout).unwrap().is_idle());
        assert_eq!(channel.recv_event(timeout).unwrap(), OutputEvent::stdout("hi"));
        assert!(channel.recv_event(timeout).unwrap().is_idle());

        channel.shutdown().unwrap();
        channel.shutdown().unwrap();
    }

    #[test]
    fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let script = format!(
            r#"{READY}
read -r line
if [ -f marker.txt ]; then
  echo '{{"msg_type":"stream","name":"stdout","text":"found"}}'
fi
sleep 5"#
        );

        let channel = sh(&script).launch(dir.path()).unwrap();
        channel.wait_ready(Duration::from_secs(5)).unwrap();
        channel.send_code("").unwrap();
        assert_eq!(
            channel.recv_event(Duration::from_secs(5)).unwrap(),
            OutputEvent::stdout("found")
        );
    }

    #[test]
    fn test_ready_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let channel = sh("sleep 5").launch(dir.path()).unwrap();

        let err = channel.wait_ready(Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, Error::ReadyTimeout(_)));
        channel.shutdown().unwrap();
    }

    #[test]
    fn test_exit_before_ready() {
        let dir = tempfile::tempdir().unwrap();
        let channel = sh("exit 3").launch(dir.path()).unwrap();

        let err = channel.wait_ready(Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Process);
    }

    #[test]
    fn test_message_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let channel = sh(&format!("{READY}\nsleep 5")).launch(dir.path()).unwrap();
        channel.wait_ready(Duration::from_secs(5)).unwrap();

        let err = channel.recv_event(Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, Error::MessageTimeout(_)));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            r#"{READY}
echo 'garbage'
echo '{{"msg_type":"stream","name":"stderr","text":"warn"}}'
sleep 5"#
        );
        let channel = sh(&script).launch(dir.path()).unwrap();
        channel.wait_ready(Duration::from_secs(5)).unwrap();

        match channel.recv_event(Duration::from_secs(5)).unwrap() {
            OutputEvent::Stream { text, .. } => assert_eq!(text, "warn"),
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_lets_worker_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            r#"{READY}
while IFS= read -r line; do
  case "$line" in
    *shutdown*) touch stopped; exit 0 ;;
  esac
done"#
        );
        let channel = sh(&script).launch(dir.path()).unwrap();
        channel.wait_ready(Duration::from_secs(5)).unwrap();

        channel.shutdown().unwrap();
        assert!(dir.path().join("stopped").exists());
    }

    #[test]
    fn test_shutdown_kills_unresponsive_worker() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("{READY}\nwhile true; do sleep 1; done");
        let channel = sh(&script).launch(dir.path()).unwrap();
        channel.wait_ready(Duration::from_secs(5)).unwrap();

        let started = Instant::now();
        channel.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new(dir.path().join("no-such-worker"));
        let err = launcher.launch(dir.path()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Process);
    }
}
