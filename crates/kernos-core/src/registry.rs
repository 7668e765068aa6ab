//! Session registry: at most one live kernel per notebook.
//!
//! The registry map is guarded by a single mutex that is held only to look up,
//! insert, or remove a slot. Each slot has its own lock, held while its kernel
//! starts, so concurrent `init` calls for one notebook wait for the same start
//! while other notebooks are unaffected. No lock here is held while a request
//! drains kernel output.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::ipc::KernelLauncher;
use crate::paths::DocumentId;
use crate::sync::lock;
use crate::worker::{WorkerHandle, WorkerState};

/// Whether [`SessionRegistry::acquire_or_create`] started a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Started,
    Existing,
}

/// Snapshot of one session for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub notebook_path: PathBuf,
    /// `None` while the kernel is still starting.
    pub worker_id: Option<String>,
    pub state: WorkerState,
    pub pid: Option<u32>,
}

impl SessionInfo {
    fn from_worker(worker: &WorkerHandle) -> Self {
        Self {
            notebook_path: worker.document().path().to_path_buf(),
            worker_id: Some(worker.id().to_string()),
            state: worker.state(),
            pid: worker.pid(),
        }
    }
}

#[derive(Default)]
struct Slot {
    worker: Mutex<Option<Arc<WorkerHandle>>>,
}

/// Concurrency-safe mapping from notebook to its kernel.
pub struct SessionRegistry {
    launcher: Arc<dyn KernelLauncher>,
    ready_timeout: Duration,
    slots: Mutex<HashMap<DocumentId, Arc<Slot>>>,
}

impl SessionRegistry {
    pub fn new(launcher: Arc<dyn KernelLauncher>, ready_timeout: Duration) -> Self {
        Self {
            launcher,
            ready_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live kernel for `document`, starting one if there is none.
    ///
    /// Exactly one kernel is started per notebook even under concurrent
    /// calls; callers that arrive while it starts block and then receive the
    /// same worker. A failed start leaves nothing registered.
    pub fn acquire_or_create(&self, document: &DocumentId) -> Result<(Arc<WorkerHandle>, Acquired)> {
        loop {
            let slot = lock(&self.slots)
                .entry(document.clone())
                .or_default()
                .clone();

            let mut current = lock(&slot.worker);

            // The slot may have been removed while we waited for it
            if !self.is_registered(document, &slot) {
                continue;
            }

            if let Some(worker) = current.as_ref() {
                if worker.state().is_live() {
                    return Ok((worker.clone(), Acquired::Existing));
                }
                tracing::info!("Replacing terminated kernel {} for {}", worker.id(), document);
            }

            let worker = Arc::new(WorkerHandle::new(document.clone()));
            return match worker.start(self.launcher.as_ref(), self.ready_timeout) {
                Ok(()) => {
                    *current = Some(worker.clone());
                    Ok((worker, Acquired::Started))
                }
                Err(e) => {
                    tracing::error!("Failed to start kernel for {}: {}", document, e);
                    *current = None;
                    self.evict(document, &slot);
                    Err(e)
                }
            };
        }
    }

    /// Return the live kernel for `document`.
    ///
    /// A kernel that has died is evicted and reported as not found.
    pub fn lookup(&self, document: &DocumentId) -> Result<Arc<WorkerHandle>> {
        let not_found = || Error::KernelNotFound(document.path().to_path_buf());

        let slot = lock(&self.slots).get(document).cloned().ok_or_else(not_found)?;
        let mut current = lock(&slot.worker);
        if let Some(worker) = current.as_ref()
            && worker.state().is_live()
        {
            return Ok(worker.clone());
        }

        if let Some(dead) = current.take() {
            tracing::info!("Evicting terminated kernel {} for {}", dead.id(), document);
            self.evict(document, &slot);
        }
        Err(not_found())
    }

    /// Remove the entry for `document`, returning its worker if there was one.
    ///
    /// Does not stop the worker. Removing an absent entry is a no-op.
    pub fn remove(&self, document: &DocumentId) -> Option<Arc<WorkerHandle>> {
        let slot = lock(&self.slots).remove(document)?;
        let worker = lock(&slot.worker).take();
        worker
    }

    /// Remove every entry, returning their workers.
    pub fn drain(&self) -> Vec<Arc<WorkerHandle>> {
        let slots: Vec<_> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();
        slots
            .into_iter()
            .filter_map(|slot| lock(&slot.worker).take())
            .collect()
    }

    /// List sessions, sorted by notebook path. Does not wait for starting
    /// kernels.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let slots: Vec<_> = lock(&self.slots)
            .iter()
            .map(|(document, slot)| (document.clone(), slot.clone()))
            .collect();

        let mut sessions: Vec<_> = slots
            .into_iter()
            .filter_map(|(document, slot)| {
                let info = match slot.worker.try_lock() {
                    Ok(guard) => guard.as_deref().map(SessionInfo::from_worker),
                    Err(TryLockError::Poisoned(poisoned)) => {
                        poisoned.into_inner().as_deref().map(SessionInfo::from_worker)
                    }
                    Err(TryLockError::WouldBlock) => Some(SessionInfo {
                        notebook_path: document.path().to_path_buf(),
                        worker_id: None,
                        state: WorkerState::Starting,
                        pid: None,
                    }),
                };
                info
            })
            .collect();
        sessions.sort_by(|a, b| a.notebook_path.cmp(&b.notebook_path));
        sessions
    }

    fn is_registered(&self, document: &DocumentId, slot: &Arc<Slot>) -> bool {
        lock(&self.slots)
            .get(document)
            .is_some_and(|registered| Arc::ptr_eq(registered, slot))
    }

    fn evict(&self, document: &DocumentId, slot: &Arc<Slot>) {
        let mut slots = lock(&self.slots);
        if slots
            .get(document)
            .is_some_and(|registered| Arc::ptr_eq(registered, slot))
        {
            slots.remove(document);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::ScriptedLauncher;

    fn registry(launcher: &ScriptedLauncher) -> SessionRegistry {
        SessionRegistry::new(Arc::new(launcher.clone()), Duration::from_millis(50))
    }

    fn doc(name: &str) -> DocumentId {
        DocumentId::new(format!("/notebooks/{}", name)).unwrap()
    }

    #[test]
    fn test_acquire_reuses_live_worker() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        let (first, acquired) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        assert_eq!(acquired, Acquired::Started);
        let (second, acquired) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        assert_eq!(acquired, Acquired::Existing);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 1);
    }

    #[test]
    fn test_concurrent_acquire_starts_once() {
        let launcher = ScriptedLauncher::new().ready_after(Duration::from_millis(50));
        let registry = Arc::new(registry(&launcher));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.acquire_or_create(&doc("same.ipynb")).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(launcher.launches(), 1);
        let started = results
            .iter()
            .filter(|(_, acquired)| *acquired == Acquired::Started)
            .count();
        assert_eq!(started, 1);
        let id = results[0].0.id();
        assert!(results.iter().all(|(worker, _)| worker.id() == id));
    }

    #[test]
    fn test_documents_are_independent() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        let (a, _) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        let (b, _) = registry.acquire_or_create(&doc("b.ipynb")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.sessions().len(), 2);
    }

    #[test]
    fn test_failed_start_not_registered() {
        let launcher = ScriptedLauncher::new().never_ready();
        let registry = registry(&launcher);

        let err = registry.acquire_or_create(&doc("a.ipynb")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(registry.sessions().is_empty());
        assert_eq!(registry.lookup(&doc("a.ipynb")).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_lookup_missing() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);
        let err = registry.lookup(&doc("missing.ipynb")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_lookup_evicts_terminated() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        let (worker, _) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        worker.terminate().unwrap();

        assert_eq!(registry.lookup(&doc("a.ipynb")).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn test_terminated_worker_replaced() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        let (old, _) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        old.terminate().unwrap();

        let (new, acquired) = registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        assert_eq!(acquired, Acquired::Started);
        assert_ne!(old.id(), new.id());
        assert_eq!(new.state(), WorkerState::Ready);
    }

    #[test]
    fn test_remove_idempotent() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        assert!(registry.remove(&doc("a.ipynb")).is_some());
        assert!(registry.remove(&doc("a.ipynb")).is_none());
        assert!(registry.lookup(&doc("a.ipynb")).is_err());
    }

    #[test]
    fn test_drain() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        registry.acquire_or_create(&doc("a.ipynb")).unwrap();
        registry.acquire_or_create(&doc("b.ipynb")).unwrap();
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn test_sessions_sorted() {
        let launcher = ScriptedLauncher::new();
        let registry = registry(&launcher);

        registry.acquire_or_create(&doc("b.ipynb")).unwrap();
        registry.acquire_or_create(&doc("a.ipynb")).unwrap();

        let sessions = registry.sessions();
        assert_eq!(sessions[0].notebook_path, doc("a.ipynb").path());
        assert_eq!(sessions[1].notebook_path, doc("b.ipynb").path());
        assert!(sessions.iter().all(|s| s.state == WorkerState::Ready));
        assert!(sessions.iter().all(|s| s.worker_id.is_some()));
    }
}
