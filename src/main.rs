use anyhow::{Context, Result};
use clap::Parser;

fn main() -> Result<()> {
    let cli = ordo::cli::Cli::parse();
    ordo::init_tracing(cli.log_filter.clone())?;
    let session = ordo::config::from_cli(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    // Not locked: the notification sink writes to stdout from pollers too.
    let stdout = std::io::stdout();
    runtime.block_on(ordo::commands::execute(&session, cli.command, stdout))
}
