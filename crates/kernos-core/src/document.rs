//! Notebook documents in Jupyter (nbformat v4) shape.
//!
//! Only the fields the kernel layer reads or writes are typed. Everything
//! else is carried in flattened maps so a load/save cycle does not drop data
//! written by other tools.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identity of a cell within a notebook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl CellKind {
    /// Whether cells of this kind can be sent to a kernel.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Code)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Raw => "raw",
        })
    }
}

/// Text stored either as one string or as a list of lines.
///
/// nbformat allows both; the loaded shape is kept on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineText {
    Single(String),
    Lines(Vec<String>),
}

impl MultilineText {
    /// The full text with lines concatenated.
    pub fn to_text(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::Lines(lines) => lines.concat(),
        }
    }

    /// Split text into nbformat line form (each line keeps its newline).
    pub fn from_text(text: &str) -> Self {
        Self::Lines(text.split_inclusive('\n').map(str::to_string).collect())
    }
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::Lines(Vec::new())
    }
}

/// A notebook document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Notebook cells, in display order.
    pub cells: Vec<Cell>,

    /// Notebook metadata (kernelspec, language info, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    /// Top-level fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Create an empty notebook.
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            nbformat: 4,
            nbformat_minor: 5,
            extra: Map::new(),
        }
    }

    /// Append a cell and return a mutable reference to it.
    pub fn push(&mut self, cell: Cell) -> &mut Cell {
        self.cells.push(cell);
        let last = self.cells.len() - 1;
        &mut self.cells[last]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// A notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell identity (nbformat 4.5+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CellId>,

    /// Cell type
    #[serde(rename = "cell_type")]
    pub kind: CellKind,

    /// Cell metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Cell source
    #[serde(default)]
    pub source: MultilineText,

    /// Cell outputs (code cells only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<CellOutput>>,

    /// Fields not modelled above (`execution_count`, `attachments`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    /// Create a code cell.
    pub fn code(source: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("execution_count".to_string(), Value::Null);
        Self {
            id: None,
            kind: CellKind::Code,
            metadata: Map::new(),
            source: MultilineText::from_text(source),
            outputs: Some(Vec::new()),
            extra,
        }
    }

    /// Create a markdown cell.
    pub fn markdown(source: &str) -> Self {
        Self {
            id: None,
            kind: CellKind::Markdown,
            metadata: Map::new(),
            source: MultilineText::from_text(source),
            outputs: None,
            extra: Map::new(),
        }
    }

    /// Builder: set the identity.
    pub fn with_id(mut self, id: CellId) -> Self {
        self.id = Some(id);
        self
    }

    /// Source text as a single string.
    pub fn source_text(&self) -> String {
        self.source.to_text()
    }

    /// Identity stored by older tooling under `metadata.id`.
    pub fn legacy_id(&self) -> Option<CellId> {
        self.metadata
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(CellId::new)
    }

    /// Replace the recorded outputs and execution count.
    pub fn set_outputs(&mut self, outputs: Vec<CellOutput>, execution_count: Option<u32>) {
        self.outputs = Some(outputs);
        self.extra.insert(
            "execution_count".to_string(),
            execution_count.map_or(Value::Null, Value::from),
        );
    }
}

/// Cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum CellOutput {
    /// Standard output/error
    #[serde(rename = "stream")]
    Stream { name: String, text: MultilineText },

    /// Result of the last expression
    #[serde(rename = "execute_result")]
    ExecuteResult {
        execution_count: Option<u32>,
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Display data
    #[serde(rename = "display_data")]
    DisplayData {
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Error output
    #[serde(rename = "error")]
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Give every cell without an identity a fresh one.
///
/// Cells that only carry a legacy `metadata.id` adopt it. Existing identities
/// are never touched. Returns how many cells changed; zero means the document
/// does not need to be written back.
pub fn assign_cell_ids(document: &mut Document) -> usize {
    let mut assigned = 0;

    for (index, cell) in document.cells.iter_mut().enumerate() {
        if cell.id.is_some() {
            continue;
        }
        let id = cell.legacy_id().unwrap_or_else(CellId::generate);
        tracing::debug!("Assigned id {} to cell {}", id, index);
        cell.id = Some(id);
        assigned += 1;
    }

    // Cell ids were introduced in nbformat 4.5
    if assigned > 0 && document.nbformat == 4 && document.nbformat_minor < 5 {
        document.nbformat_minor = 5;
    }

    assigned
}
