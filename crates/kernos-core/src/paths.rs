//! Notebook identity.
//!
//! A notebook is identified by its path. Paths are made absolute and
//! lexically normalized so that `nb.ipynb`, `./nb.ipynb` and
//! `sub/../nb.ipynb` name the same kernel session.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Identifier of a notebook document (its normalized absolute path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(PathBuf);

impl DocumentId {
    /// Build an identifier from a notebook path.
    ///
    /// Does not touch the filesystem; the notebook does not need to exist.
    ///
    /// # Errors
    /// Returns a validation error for an empty path, or an IO error if the
    /// current directory cannot be determined for a relative path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Validation("notebook_path is required".to_string()));
        }
        let absolute = std::path::absolute(path)?;
        Ok(Self(normalize(&absolute)))
    }

    /// Path of the notebook file.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Directory a kernel for this notebook runs in.
    pub fn working_dir(&self) -> &Path {
        self.0.parent().unwrap_or(Path::new("/"))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Drop `.` components and fold `..` into their parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_collapse() {
        let a = DocumentId::new("nb.ipynb").unwrap();
        let b = DocumentId::new("./nb.ipynb").unwrap();
        let c = DocumentId::new("sub/../nb.ipynb").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(a.path().is_absolute());
    }

    #[test]
    fn test_working_dir_is_parent() {
        let dir = tempfile::tempdir().unwrap();
        let id = DocumentId::new(dir.path().join("nb.ipynb")).unwrap();
        assert_eq!(id.working_dir(), normalize(dir.path()));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = DocumentId::new("").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }
}
