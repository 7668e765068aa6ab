//! Cell execution against a notebook's kernel.
//!
//! One execution loads the notebook, makes sure every cell has an identity
//! (persisting the notebook if any were added), submits the target cell's
//! source, and drains kernel output until the idle signal.

use std::sync::Arc;
use std::time::Duration;

use crate::config::KernelConfig;
use crate::document::{Document, assign_cell_ids};
use crate::error::{Error, Result};
use crate::event::OutputEvent;
use crate::paths::DocumentId;
use crate::registry::SessionRegistry;
use crate::store::DocumentStore;
use crate::worker::WorkerHandle;

/// Runs single cells on already-initialized kernels.
pub struct ExecutionCoordinator {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    config: KernelConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn DocumentStore>,
        config: KernelConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Execute cell `index` of `document` and return its text outputs in
    /// arrival order.
    ///
    /// Fails without touching the kernel when there is no session, the index
    /// is out of range (negative included), or the cell is not code. Cell ids
    /// are assigned and saved before the index is checked. On a message timeout the
    /// partial output is discarded and the kernel stays busy; the session
    /// must be shut down and re-initialized.
    pub fn execute(&self, document: &DocumentId, index: i64) -> Result<Vec<String>> {
        let worker = self.registry.lookup(document)?;

        let mut notebook = self.store.load(document.path())?;
        tracing::debug!("Loaded notebook {} ({} cells)", document, notebook.len());

        let assigned = assign_cell_ids(&mut notebook);
        if assigned > 0 {
            self.store.save(document.path(), &notebook)?;
            tracing::info!("Assigned ids to {} cells in {}", assigned, document);
        }

        let (index, code) = executable_source(&notebook, index)?;
        tracing::info!("Executing cell {} of {}", index, document);

        worker.submit(&code)?;
        let events = drain(&worker, self.config.message_timeout).inspect_err(|e| {
            tracing::error!("Execution of cell {} in {} failed: {}", index, document, e);
        })?;

        if self.config.record_outputs {
            self.record(document, &mut notebook, index, &events)?;
        }

        let outputs: Vec<String> = events.iter().filter_map(OutputEvent::text).collect();
        tracing::debug!("Cell {} produced {} outputs", index, outputs.len());
        Ok(outputs)
    }

    /// Store the drained events as the cell's outputs and save.
    fn record(
        &self,
        document: &DocumentId,
        notebook: &mut Document,
        index: usize,
        events: &[OutputEvent],
    ) -> Result<()> {
        let execution_count = events.iter().find_map(|event| match event {
            OutputEvent::Result {
                execution_count, ..
            } => *execution_count,
            _ => None,
        });
        let outputs = events.iter().filter_map(OutputEvent::to_cell_output).collect();
        notebook.cells[index].set_outputs(outputs, execution_count);
        self.store.save(document.path(), notebook)
    }
}

/// Position and source of cell `index`, if it exists and is executable.
fn executable_source(notebook: &Document, index: i64) -> Result<(usize, String)> {
    let (position, cell) = usize::try_from(index)
        .ok()
        .and_then(|position| notebook.cells.get(position).map(|cell| (position, cell)))
        .ok_or(Error::CellIndexOutOfRange {
            index,
            len: notebook.len(),
        })?;

    if !cell.kind.is_executable() {
        return Err(Error::NotExecutable {
            index: position,
            kind: cell.kind,
        });
    }
    Ok((position, cell.source_text()))
}

/// Receive events until the idle signal. Status events are dropped.
fn drain(worker: &WorkerHandle, timeout: Duration) -> Result<Vec<OutputEvent>> {
    let mut events = Vec::new();
    loop {
        let event = worker.receive_event(timeout)?;
        if event.is_idle() {
            return Ok(events);
        }
        match event {
            OutputEvent::Status(state) => {
                tracing::debug!("Kernel {} status: {:?}", worker.id(), state);
            }
            event => events.push(event),
        }
    }
}
