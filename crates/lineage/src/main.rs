//! Lineage CLI binary.

use anyhow::Result;
use lineage::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the lineage CLI.
///
/// Uses tokio's `current_thread` runtime: a run issues one catalog query at
/// a time, so there is nothing for worker threads to do.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Controlled via RUST_LOG, e.g. RUST_LOG=lineage=debug,lineage_jsonl=trace
    // Logs go to stderr so stdout stays parseable with --json.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lineage=info,lineage_jsonl=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting lineage CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Lineage CLI completed successfully");
    Ok(())
}
