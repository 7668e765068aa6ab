//! Kernos worker process.
//!
//! Speaks the line-delimited JSON kernel protocol on stdin/stdout. Each
//! executed code unit runs as `$KERNOS_WORKER_SHELL -c <code>` (default `sh`)
//! in the worker's working directory. Logs go to stderr.

use std::io::{self, BufRead, Write};
use std::process::{Command, Output};

use anyhow::Context;
use kernos_core::ipc::{WorkerCommand, WorkerReply, read_message, write_message};
use kernos_core::{ExecutionState, StreamName};

/// Environment variable naming the shell that runs code.
const SHELL_ENV: &str = "KERNOS_WORKER_SHELL";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let shell = std::env::var(SHELL_ENV).unwrap_or_else(|_| "sh".to_string());

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(&shell, &mut stdin.lock(), &mut stdout.lock())
}

/// Announce readiness, then execute commands until shutdown or end of input.
fn serve<R: BufRead, W: Write>(shell: &str, input: &mut R, out: &mut W) -> anyhow::Result<()> {
    write_message(out, &WorkerReply::KernelReady)?;
    tracing::info!("Worker {} ready (shell: {})", std::process::id(), shell);

    loop {
        let command = match read_message::<_, WorkerCommand>(input) {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(kernos_core::Error::Io(e)) => {
                return Err(e).context("Failed to read command from stdin");
            }
            Err(e) => {
                tracing::warn!("Skipping malformed command: {}", e);
                continue;
            }
        };

        match command {
            WorkerCommand::Execute { code } => execute(shell, &code, out)?,
            WorkerCommand::Shutdown => {
                tracing::info!("Shutdown requested");
                return Ok(());
            }
        }
    }

    tracing::info!("Stdin closed, exiting");
    Ok(())
}

/// Run one code unit and report it as busy, output, idle.
fn execute<W: Write>(shell: &str, code: &str, out: &mut W) -> anyhow::Result<()> {
    write_message(out, &status(ExecutionState::Busy))?;
    tracing::debug!("Executing {} bytes of code", code.len());

    match Command::new(shell).arg("-c").arg(code).output() {
        Ok(output) => {
            for reply in replies_for(&output) {
                write_message(out, &reply)?;
            }
        }
        Err(e) => {
            tracing::error!("Failed to run {}: {}", shell, e);
            let reply = WorkerReply::Error {
                ename: "SpawnError".to_string(),
                evalue: e.to_string(),
                traceback: vec![format!("failed to run {}: {}", shell, e)],
            };
            write_message(out, &reply)?;
        }
    }

    write_message(out, &status(ExecutionState::Idle))?;
    Ok(())
}

/// Output replies for a finished command.
///
/// Stdout is always a stream. Stderr is a stream on success; on a non-zero
/// exit it becomes an error whose traceback is its lines.
fn replies_for(output: &Output) -> Vec<WorkerReply> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut replies = Vec::new();

    if !stdout.is_empty() {
        replies.push(WorkerReply::Stream {
            name: StreamName::Stdout,
            text: stdout.into_owned(),
        });
    }

    if output.status.success() {
        if !stderr.is_empty() {
            replies.push(WorkerReply::Stream {
                name: StreamName::Stderr,
                text: stderr.into_owned(),
            });
        }
    } else {
        let mut traceback: Vec<String> = stderr.lines().map(str::to_string).collect();
        if traceback.is_empty() {
            traceback.push(format!("command {}", output.status));
        }
        replies.push(WorkerReply::Error {
            ename: "ExitStatus".to_string(),
            evalue: output.status.to_string(),
            traceback,
        });
    }

    replies
}

fn status(execution_state: ExecutionState) -> WorkerReply {
    WorkerReply::Status { execution_state }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn decode(out: Vec<u8>) -> Vec<WorkerReply> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn run(code: &str) -> Vec<WorkerReply> {
        let mut out = Vec::new();
        execute("sh", code, &mut out).unwrap();
        decode(out)
    }

    #[test]
    fn test_command_loop() {
        let input = concat!(
            "not a command\n",
            "\n",
            "{\"type\":\"execute\",\"code\":\"echo one\"}\n",
            "{\"type\":\"shutdown\"}\n",
            "{\"type\":\"execute\",\"code\":\"echo two\"}\n",
        );
        let mut out = Vec::new();
        serve("sh", &mut std::io::Cursor::new(input), &mut out).unwrap();

        let replies = decode(out);
        assert_eq!(replies[0], WorkerReply::KernelReady);
        assert_eq!(
            &replies[1..],
            &[
                status(ExecutionState::Busy),
                WorkerReply::Stream {
                    name: StreamName::Stdout,
                    text: "one\n".to_string()
                },
                status(ExecutionState::Idle),
            ]
        );
    }

    #[test]
    fn test_end_of_input_exits() {
        let mut out = Vec::new();
        serve("sh", &mut std::io::Cursor::new(""), &mut out).unwrap();
        assert_eq!(decode(out), vec![WorkerReply::KernelReady]);
    }

    #[test]
    fn test_success_streams() {
        let replies = run("echo out; echo err >&2");
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], status(ExecutionState::Busy));
        assert_eq!(
            replies[1],
            WorkerReply::Stream {
                name: StreamName::Stdout,
                text: "out\n".to_string()
            }
        );
        assert_eq!(
            replies[2],
            WorkerReply::Stream {
                name: StreamName::Stderr,
                text: "err\n".to_string()
            }
        );
        assert_eq!(replies[3], status(ExecutionState::Idle));
    }

    #[test]
    fn test_failure_becomes_error() {
        let replies = run("echo partial; echo one >&2; echo two >&2; exit 3");
        assert_eq!(replies.len(), 4);
        assert!(matches!(&replies[1], WorkerReply::Stream { text, .. } if text == "partial\n"));
        match &replies[2] {
            WorkerReply::Error { traceback, .. } => {
                assert_eq!(traceback, &vec!["one".to_string(), "two".to_string()]);
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(replies[3], status(ExecutionState::Idle));
    }

    #[test]
    fn test_silent_command() {
        let replies = run("true");
        assert_eq!(
            replies,
            vec![status(ExecutionState::Busy), status(ExecutionState::Idle)]
        );
    }
}
