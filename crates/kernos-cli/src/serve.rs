//! Serve command implementation for Kernos CLI.
//!
//! Starts the kernel HTTP server.

use std::sync::Arc;

use kernos_core::KernelService;
use kernos_server::ServerConfig;

/// Start the kernel server and block until Ctrl+C.
pub async fn execute(host: String, port: u16, service: KernelService) -> anyhow::Result<()> {
    let service = Arc::new(service);
    let config = ServerConfig { host, port };

    eprintln!("Kernos server listening on http://{}:{}", config.host, config.port);
    eprintln!("Press Ctrl+C to stop");

    kernos_server::serve(service, config).await?;

    Ok(())
}
