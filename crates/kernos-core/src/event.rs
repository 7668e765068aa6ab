//! Output events emitted by a kernel while it executes a cell.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{CellOutput, MultilineText};

/// Which standard stream a `Stream` event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Kernel execution state carried by status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
}

/// One message emitted by a kernel during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Text written to stdout or stderr.
    Stream { name: StreamName, text: String },

    /// A rich result keyed by MIME type.
    Result {
        execution_count: Option<u32>,
        data: Map<String, Value>,
    },

    /// An exception or failure with its traceback lines.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },

    /// Kernel busy/idle transition. Never part of the returned output.
    Status(ExecutionState),
}

impl OutputEvent {
    /// Shorthand for a stdout stream event.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::Stream {
            name: StreamName::Stdout,
            text: text.into(),
        }
    }

    /// Shorthand for a plain-text result.
    pub fn plain_result(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), Value::String(text.into()));
        Self::Result {
            execution_count: None,
            data,
        }
    }

    /// Shorthand for an error event with only traceback lines.
    pub fn error_lines<I, S>(traceback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Error {
            ename: String::new(),
            evalue: String::new(),
            traceback: traceback.into_iter().map(Into::into).collect(),
        }
    }

    /// The terminal signal of an execution's output stream.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Status(ExecutionState::Idle))
    }

    /// Textual projection returned to callers. `None` for status events.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Stream { text, .. } => Some(text.clone()),
            Self::Result { data, .. } => Some(plain_text(data)),
            Self::Error { traceback, .. } => Some(traceback.join("\n")),
            Self::Status(_) => None,
        }
    }

    /// Convert to the notebook output record for this event.
    pub fn to_cell_output(&self) -> Option<CellOutput> {
        match self {
            Self::Stream { name, text } => Some(CellOutput::Stream {
                name: name.as_str().to_string(),
                text: MultilineText::from_text(text),
            }),
            Self::Result {
                execution_count: Some(count),
                data,
            } => Some(CellOutput::ExecuteResult {
                execution_count: Some(*count),
                data: data.clone(),
                metadata: Map::new(),
            }),
            Self::Result {
                execution_count: None,
                data,
            } => Some(CellOutput::DisplayData {
                data: data.clone(),
                metadata: Map::new(),
            }),
            Self::Error {
                ename,
                evalue,
                traceback,
            } => Some(CellOutput::Error {
                ename: ename.clone(),
                evalue: evalue.clone(),
                traceback: traceback.clone(),
            }),
            Self::Status(_) => None,
        }
    }
}

/// `text/plain` entry of a MIME bundle; may be a string or a list of lines.
fn plain_text(data: &Map<String, Value>) -> String {
    match data.get("text/plain") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection() {
        assert_eq!(OutputEvent::stdout("a").text(), Some("a".to_string()));
        assert_eq!(
            OutputEvent::plain_result("42").text(),
            Some("42".to_string())
        );
        assert_eq!(
            OutputEvent::error_lines(["line1", "line2"]).text(),
            Some("line1\nline2".to_string())
        );
        assert_eq!(OutputEvent::Status(ExecutionState::Idle).text(), None);
        assert_eq!(OutputEvent::Status(ExecutionState::Busy).text(), None);
    }

    #[test]
    fn test_result_without_plain_text() {
        let mut data = Map::new();
        data.insert("text/html".to_string(), Value::String("<b>x</b>".to_string()));
        let event = OutputEvent::Result {
            execution_count: Some(1),
            data,
        };
        assert_eq!(event.text(), Some(String::new()));
    }

    #[test]
    fn test_result_plain_text_lines() {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), serde_json::json!(["a\n", "b"]));
        let event = OutputEvent::Result {
            execution_count: None,
            data,
        };
        assert_eq!(event.text(), Some("a\nb".to_string()));
    }

    #[test]
    fn test_is_idle() {
        assert!(OutputEvent::Status(ExecutionState::Idle).is_idle());
        assert!(!OutputEvent::Status(ExecutionState::Busy).is_idle());
        assert!(!OutputEvent::stdout("idle").is_idle());
    }

    #[test]
    fn test_to_cell_output() {
        assert!(OutputEvent::Status(ExecutionState::Busy).to_cell_output().is_none());

        match OutputEvent::stdout("hi\n").to_cell_output() {
            Some(CellOutput::Stream { name, text }) => {
                assert_eq!(name, "stdout");
                assert_eq!(text.to_text(), "hi\n");
            }
            other => panic!("Wrong output: {:?}", other),
        }

        assert!(matches!(
            OutputEvent::plain_result("1").to_cell_output(),
            Some(CellOutput::DisplayData { .. })
        ));
    }
}
