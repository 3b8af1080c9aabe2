pub mod cli;
pub mod commands;
pub mod config;
pub mod delivery;

use anyhow::Result;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

pub use ordo_core as core;
pub use ordo_core::capture;
pub use ordo_core::model;

pub use ordo_core::AppConfig;

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init_tracing(filter: Option<String>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| "info".to_string());
    let directive: Directive = filter.parse()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}
