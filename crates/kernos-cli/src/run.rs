//! Run command implementation for Kernos CLI.
//!
//! Starts one kernel for the notebook, executes the selected cells in order,
//! shuts the kernel down, and prints `{"outputs": [...]}` on stdout with one
//! concatenated string per executed cell. Executed outputs are saved back into
//! the notebook unless `record_outputs` is off.

use std::path::Path;

use kernos_core::{CellKind, DocumentStore, IpynbStore, KernelService};

use crate::kernel::KernelArgs;

/// Execute a notebook.
pub fn execute(
    notebook_path: &str,
    cells: Option<&[usize]>,
    kernel: &KernelArgs,
    record_outputs: bool,
) -> anyhow::Result<()> {
    let path = Path::new(notebook_path);
    if !path.exists() {
        anyhow::bail!("Notebook not found: {}", notebook_path);
    }

    let document = IpynbStore.load(path)?;
    let kinds: Vec<CellKind> = document.cells.iter().map(|cell| cell.kind).collect();
    let selected = select_cells(&kinds, cells)?;
    tracing::info!("Running {} cells of {}", selected.len(), path.display());

    let service = kernel.service(record_outputs)?;
    service.init(path)?;
    let result = run_cells(&service, path, &selected);

    // The kernel is stopped whether or not every cell succeeded
    let shutdown = service.shutdown(path);
    let outputs = result?;
    shutdown?;

    println!("{}", serde_json::json!({ "outputs": outputs }));
    Ok(())
}

fn run_cells(service: &KernelService, path: &Path, cells: &[usize]) -> anyhow::Result<Vec<String>> {
    let mut outputs = Vec::with_capacity(cells.len());
    for &index in cells {
        let response = service.execute_cell(path, i64::try_from(index)?)?;
        outputs.push(response.outputs.concat());
    }
    Ok(outputs)
}

/// Indices to execute: the requested ones that are code cells, or every
/// code cell. A requested index past the end is an error.
fn select_cells(kinds: &[CellKind], requested: Option<&[usize]>) -> anyhow::Result<Vec<usize>> {
    let Some(requested) = requested else {
        return Ok(kinds
            .iter()
            .enumerate()
            .filter(|(_, kind)| kind.is_executable())
            .map(|(index, _)| index)
            .collect());
    };

    let mut selected = Vec::with_capacity(requested.len());
    for &index in requested {
        match kinds.get(index) {
            Some(kind) if kind.is_executable() => selected.push(index),
            Some(kind) => tracing::warn!("Skipping cell {} ({} cell)", index, kind),
            None => anyhow::bail!(
                "Cell index {} is out of range (notebook has {} cells)",
                index,
                kinds.len()
            ),
        }
    }
    Ok(selected)
}
