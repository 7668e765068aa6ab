//! Notebook persistence.

use std::fs;
use std::path::Path;

use crate::document::Document;
use crate::error::{Error, Result};

/// Loads and saves notebook documents.
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path`.
    fn load(&self, path: &Path) -> Result<Document>;

    /// Write `document` to `path`, replacing what is there.
    fn save(&self, path: &Path, document: &Document) -> Result<()>;
}

/// `.ipynb` files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpynbStore;

impl DocumentStore for IpynbStore {
    fn load(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path).map_err(|e| Error::ReadNotebook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::ReadNotebook {
            path: path.to_path_buf(),
            message: format!("invalid notebook JSON: {}", e),
        })
    }

    fn save(&self, path: &Path, document: &Document) -> Result<()> {
        let mut json = serde_json::to_string_pretty(document).map_err(|e| Error::WriteNotebook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        json.push('\n');
        fs::write(path, json).map_err(|e| Error::WriteNotebook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Cell, CellId, assign_cell_ids};
    use crate::error::ErrorKind;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.ipynb");

        let mut doc = Document::new();
        doc.push(Cell::markdown("# hi"));
        doc.push(Cell::code("print(1)").with_id(CellId::new("c1")));
        IpynbStore.save(&path, &doc).unwrap();

        let loaded = IpynbStore.load(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_identities_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.ipynb");

        let mut doc = Document::new();
        doc.push(Cell::code("a"));
        doc.push(Cell::code("b"));
        assign_cell_ids(&mut doc);
        IpynbStore.save(&path, &doc).unwrap();

        let mut loaded = IpynbStore.load(&path).unwrap();
        assert_eq!(assign_cell_ids(&mut loaded), 0);
        assert_eq!(loaded.cells[0].id, doc.cells[0].id);
        assert_eq!(loaded.cells[1].id, doc.cells[1].id);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IpynbStore.load(&dir.path().join("nope.ipynb")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ipynb");
        fs::write(&path, "{ not json").unwrap();

        let err = IpynbStore.load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("invalid notebook JSON"));
    }
}
