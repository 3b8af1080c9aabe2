pub use ordo_core::config::*;

use crate::cli::Cli;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: AppConfig,
    pub engine: EngineConfig,
    pub owner: String,
}

pub fn from_cli(cli: &Cli) -> anyhow::Result<Session> {
    let owner = cli.owner.trim();
    if owner.is_empty() {
        anyhow::bail!("--owner cannot be empty");
    }
    Ok(Session {
        config: AppConfig::discover(cli.data_dir.clone())?,
        engine: EngineConfig::default(),
        owner: owner.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn session_uses_data_dir_and_owner_flags() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let cli = Cli::try_parse_from([
            "ordo",
            "--data-dir",
            data_dir.to_str().unwrap(),
            "--owner",
            "bob",
            "check",
        ])
        .unwrap();
        let session = from_cli(&cli).unwrap();
        assert_eq!(session.owner, "bob");
        assert_eq!(session.config.data_dir(), data_dir.as_path());
        assert!(data_dir.exists());
    }

    #[test]
    fn blank_owner_is_rejected() {
        let cli = Cli::try_parse_from(["ordo", "--owner", " ", "check"]).unwrap();
        assert!(from_cli(&cli).is_err());
    }
}
