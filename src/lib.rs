pub use ordo_cli::cli;
pub use ordo_cli::commands;
pub use ordo_cli::config;
pub use ordo_cli::delivery;
pub use ordo_cli::init_tracing;
pub use ordo_cli::AppConfig;

pub use ordo_core as core;
pub use ordo_core::capture;
pub use ordo_core::model;
