//! Kernos CLI - notebook kernels over HTTP or from the command line.

mod kernel;
mod run;
mod serve;

use clap::{Parser, Subcommand};

use crate::kernel::KernelArgs;

#[derive(Parser)]
#[command(name = "kernos")]
#[command(about = "Persistent notebook kernels with single-cell execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the kernel HTTP server
    Serve {
        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "5001")]
        port: u16,

        /// Save executed outputs back into the notebook
        #[arg(long)]
        record_outputs: bool,

        #[command(flatten)]
        kernel: KernelArgs,
    },

    /// Execute notebook cells headlessly and print their outputs as JSON
    Run {
        /// Path to the notebook (.ipynb file)
        notebook: String,

        /// Comma-separated cell indices to execute (default: every code cell)
        #[arg(long, value_delimiter = ',')]
        cells: Option<Vec<usize>>,

        /// Leave the notebook's saved outputs untouched
        #[arg(long)]
        no_record_outputs: bool,

        #[command(flatten)]
        kernel: KernelArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format kernos-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(kernos_err) = err.downcast_ref::<kernos_core::Error>() {
            anyhow::anyhow!("{}", kernos_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            record_outputs,
            kernel,
        } => {
            let service = kernel.service(record_outputs).map_err(format_error)?;
            serve::execute(host, port, service).await.map_err(format_error)?;
        }

        Commands::Run {
            notebook,
            cells,
            no_record_outputs,
            kernel,
        } => {
            let record_outputs = !no_record_outputs;
            // Kernel commands block, keep them off the async workers
            tokio::task::spawn_blocking(move || {
                run::execute(&notebook, cells.as_deref(), &kernel, record_outputs)
            })
            .await?
            .map_err(format_error)?;
        }
    }

    Ok(())
}
