//! Kernel options shared by every subcommand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use kernos_core::{IpynbStore, KernelConfig, KernelService, ProcessLauncher};

#[derive(Args, Debug, Clone)]
pub struct KernelArgs {
    /// Worker program to launch (default: discover kernos-worker)
    #[arg(long)]
    pub worker: Option<PathBuf>,

    /// Argument passed to the worker program (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Seconds a kernel gets to report ready
    #[arg(long, default_value = "60")]
    pub ready_timeout: u64,

    /// Seconds to wait for each kernel message while executing
    #[arg(long, default_value = "60")]
    pub message_timeout: u64,
}

impl KernelArgs {
    pub fn config(&self, record_outputs: bool) -> KernelConfig {
        KernelConfig::default()
            .with_ready_timeout(Duration::from_secs(self.ready_timeout))
            .with_message_timeout(Duration::from_secs(self.message_timeout))
            .with_record_outputs(record_outputs)
    }

    pub fn launcher(&self) -> anyhow::Result<ProcessLauncher> {
        let launcher = match &self.worker {
            Some(program) => ProcessLauncher::new(program),
            None => ProcessLauncher::discover()?,
        };
        tracing::debug!("Worker program: {}", launcher.program().display());
        Ok(launcher.with_args(self.worker_args.iter().cloned()))
    }

    /// Build a kernel service using `.ipynb` files on disk.
    pub fn service(&self, record_outputs: bool) -> anyhow::Result<KernelService> {
        Ok(KernelService::new(
            Arc::new(self.launcher()?),
            Arc::new(IpynbStore),
            self.config(record_outputs),
        ))
    }
}
