use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;

static DEFAULT_DB_NAME: &str = "ordo.sqlite3";
static DEFAULT_SETTINGS_NAME: &str = "notifications.json";
static ENV_DATA_DIR: &str = "ORDO_DATA_DIR";

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "ordo", "ordo"));

/// Spacing between freshly allocated sibling positions.
pub const DEFAULT_GAP: f64 = 1000.0;
/// Lateral drag offset beyond which a drop nests instead of reordering.
pub const DEFAULT_NEST_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    db_path: PathBuf,
    settings_path: PathBuf,
}

impl AppConfig {
    /// Construct [`AppConfig`] by resolving the data directory using the provided override,
    /// environment variables, and platform defaults.
    pub fn discover(data_dir_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory at {}", data_dir.display())
            })?;
        }
        Self::from_data_dir(data_dir)
    }

    /// Construct [`AppConfig`] directly from a resolved data directory.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        let db_path = data_dir.join(DEFAULT_DB_NAME);
        let settings_path = data_dir.join(DEFAULT_SETTINGS_NAME);
        Ok(Self {
            data_dir,
            db_path,
            settings_path,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }
}

/// Tunables for ordering, gesture interpretation and polling.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub gap: f64,
    pub nest_threshold: f64,
    pub due_poll_interval: Duration,
    pub reminder_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap: DEFAULT_GAP,
            nest_threshold: DEFAULT_NEST_THRESHOLD,
            due_poll_interval: Duration::from_secs(30),
            reminder_poll_interval: Duration::from_secs(15),
        }
    }
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override {
        return Ok(dir);
    }

    if let Ok(env_dir) = env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(env_dir));
    }

    if cfg!(debug_assertions) {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dev_dir = manifest_dir.join("..").join("..").join("tmp").join("dev-ordo");
        return Ok(dev_dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(base) = BaseDirs::new() {
            return Ok(base.home_dir().join(".ordo"));
        }
    }

    if let Some(project) = &*PROJECT_DIRS {
        return Ok(project.data_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".ordo"));
    }

    Ok(env::current_dir()?.join(".ordo"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discover_creates_override_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("data");
        let config = AppConfig::discover(Some(target.clone())).unwrap();

        assert!(target.exists());
        assert_eq!(config.db_path(), target.join("ordo.sqlite3"));
        assert_eq!(config.settings_path(), target.join("notifications.json"));
    }

    #[test]
    fn engine_defaults_match_documented_tunables() {
        let engine = EngineConfig::default();
        assert_eq!(engine.gap, 1000.0);
        assert_eq!(engine.nest_threshold, 40.0);
        assert_eq!(engine.due_poll_interval, Duration::from_secs(30));
        assert_eq!(engine.reminder_poll_interval, Duration::from_secs(15));
    }
}
