//! Kernel sessions backed by real child processes.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kernos_core::{
    Cell, Document, DocumentStore, ErrorKind, InitStatus, IpynbStore, KernelConfig, KernelService,
    ProcessLauncher, WorkerState,
};

/// Prints its working directory for every execute command.
const PWD_KERNEL: &str = r#"echo '{"msg_type":"kernel_ready"}'
while IFS= read -r line; do
  case "$line" in
    *shutdown*) exit 0 ;;
  esac
  echo '{"msg_type":"status","execution_state":"busy"}'
  printf '{"msg_type":"stream","name":"stdout","text":"%s"}\n' "$(basename "$PWD")"
  echo '{"msg_type":"status","execution_state":"idle"}'
done"#;

/// Never answers an execute command.
const STUCK_KERNEL: &str = r#"echo '{"msg_type":"kernel_ready"}'
while IFS= read -r line; do
  case "$line" in
    *shutdown*) exit 0 ;;
  esac
done"#;

fn service(script: &str, message_timeout: Duration) -> KernelService {
    let launcher = ProcessLauncher::new("sh").with_args(["-c", script]);
    KernelService::new(
        Arc::new(launcher),
        Arc::new(IpynbStore),
        KernelConfig::default()
            .with_ready_timeout(Duration::from_secs(10))
            .with_message_timeout(message_timeout),
    )
}

fn notebook(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let folder = dir.path().join(name);
    std::fs::create_dir(&folder).unwrap();
    let path = folder.join("nb.ipynb");
    let mut doc = Document::new();
    doc.push(Cell::code("pwd"));
    IpynbStore.save(&path, &doc).unwrap();
    path
}

#[test]
fn test_kernel_runs_next_to_notebook() {
    let dir = tempfile::tempdir().unwrap();
    let first = notebook(&dir, "first");
    let second = notebook(&dir, "second");
    let service = service(PWD_KERNEL, Duration::from_secs(10));

    service.init(&first).unwrap();
    service.init(&second).unwrap();

    assert_eq!(service.execute_cell(&first, 0).unwrap().outputs, vec!["first"]);
    assert_eq!(service.execute_cell(&second, 0).unwrap().outputs, vec!["second"]);

    assert_eq!(service.shutdown_all(), 2);
}

#[test]
fn test_restart_gives_new_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = notebook(&dir, "nb");
    let service = service(PWD_KERNEL, Duration::from_secs(10));

    assert_eq!(service.init(&path).unwrap().status, InitStatus::Started);
    let before = service.sessions()[0].clone();
    assert!(before.pid.is_some());

    service.shutdown(&path).unwrap();
    assert_eq!(service.init(&path).unwrap().status, InitStatus::Started);
    let after = service.sessions()[0].clone();

    assert_ne!(after.worker_id, before.worker_id);
    assert_eq!(after.state, WorkerState::Ready);
    assert_eq!(service.execute_cell(&path, 0).unwrap().outputs, vec!["nb"]);

    service.shutdown(&path).unwrap();
}

#[test]
fn test_stuck_kernel_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = notebook(&dir, "nb");
    let service = service(STUCK_KERNEL, Duration::from_millis(200));
    service.init(&path).unwrap();

    let err = service.execute_cell(&path, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(service.sessions()[0].state, WorkerState::Executing);

    // Recovery is shutdown followed by init
    service.shutdown(&path).unwrap();
    service.init(&path).unwrap();
    assert_eq!(service.sessions()[0].state, WorkerState::Ready);

    service.shutdown(&path).unwrap();
}
