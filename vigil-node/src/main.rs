use clap::Parser;
use tracing_subscriber::EnvFilter;

use vigil_node::cli;

fn main() {
    let cli = cli::Cli::parse();

    // RUST_LOG wins; otherwise --log-level, the config file, then "info".
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(cli.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    // stdout carries command output only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    rt.block_on(async {
        if let Err(e) = cli::run(cli).await {
            tracing::error!("Fatal error: {}", e);
            std::process::exit(1);
        }
    });
}
