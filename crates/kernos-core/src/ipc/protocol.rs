//! IPC protocol messages for Kernos worker processes.
//!
//! Uses newline-delimited JSON over stdin/stdout, one message per line, so
//! workers can be written in any language.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::event::{ExecutionState, OutputEvent, StreamName};

/// Command sent from parent to worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Execute one unit of code.
    Execute {
        /// Cell source.
        code: String,
    },

    /// Shutdown the worker process gracefully.
    Shutdown,
}

/// Message sent from worker to parent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Worker finished starting and accepts commands.
    KernelReady,

    /// Text written to a standard stream.
    Stream { name: StreamName, text: String },

    /// Result of the executed code.
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<u32>,
        #[serde(default)]
        data: Map<String, Value>,
    },

    /// Rich display output.
    DisplayData {
        #[serde(default)]
        data: Map<String, Value>,
    },

    /// Execution failed.
    Error {
        #[serde(default)]
        ename: String,
        #[serde(default)]
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },

    /// Busy/idle transition.
    Status { execution_state: ExecutionState },
}

impl WorkerReply {
    /// Decide the output event this reply stands for.
    ///
    /// Returns `None` for control messages.
    pub fn into_event(self) -> Option<OutputEvent> {
        match self {
            Self::KernelReady => None,
            Self::Stream { name, text } => Some(OutputEvent::Stream { name, text }),
            Self::ExecuteResult {
                execution_count,
                data,
            } => Some(OutputEvent::Result {
                execution_count,
                data,
            }),
            Self::DisplayData { data } => Some(OutputEvent::Result {
                execution_count: None,
                data,
            }),
            Self::Error {
                ename,
                evalue,
                traceback,
            } => Some(OutputEvent::Error {
                ename,
                evalue,
                traceback,
            }),
            Self::Status { execution_state } => Some(OutputEvent::Status(execution_state)),
        }
    }
}

impl From<OutputEvent> for WorkerReply {
    fn from(event: OutputEvent) -> Self {
        match event {
            OutputEvent::Stream { name, text } => Self::Stream { name, text },
            OutputEvent::Result {
                execution_count,
                data,
            } => Self::ExecuteResult {
                execution_count,
                data,
            },
            OutputEvent::Error {
                ename,
                evalue,
                traceback,
            } => Self::Error {
                ename,
                evalue,
                traceback,
            },
            OutputEvent::Status(execution_state) => Self::Status { execution_state },
        }
    }
}

/// Write one message as a JSON line and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| Error::Process(format!("Failed to encode IPC message: {}", e)))?;
    line.push(b'\n');

    writer
        .write_all(&line)
        .map_err(|e| Error::Process(format!("Failed to write IPC message: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Process(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read the next message. Blank lines are skipped; `None` means end of stream.
///
/// A line that is not valid JSON for `T` is a `Process` error and the stream
/// stays usable for the next read. A failed read is an `Io` error.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|e| Error::Process(format!("Failed to decode IPC message {:?}: {}", line.trim_end(), e)));
    }
}
