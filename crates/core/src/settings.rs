//! Notification preferences, loaded once and handed to the notifier.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};

/// Whether the platform allowed us to show notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Default => "default",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ValueEnum for Permission {
    fn value_variants<'a>() -> &'a [Self] {
        &[Permission::Default, Permission::Granted, Permission::Denied]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub sound_enabled: bool,
    /// 0.0 (silent) to 1.0.
    pub volume: f32,
    pub permission: Permission,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            volume: 0.7,
            permission: Permission::Default,
        }
    }
}

impl NotificationSettings {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(CoreError::validation(format!(
                "volume must be between 0 and 1, got {}",
                self.volume
            )));
        }
        Ok(())
    }

    /// Denied permission suppresses delivery, not detection.
    pub fn allows_delivery(&self) -> bool {
        self.permission != Permission::Denied
    }

    pub fn plays_sound(&self) -> bool {
        self.sound_enabled && self.volume > 0.0
    }
}

/// Where [`NotificationSettings`] are kept between sessions.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> CoreResult<NotificationSettings>;

    async fn save(&self, settings: &NotificationSettings) -> CoreResult<()>;
}

/// JSON file in the data directory.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self) -> CoreResult<NotificationSettings> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file; using defaults");
                Ok(NotificationSettings::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, settings: &NotificationSettings) -> CoreResult<()> {
        settings.validate()?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<NotificationSettings>,
}

impl MemorySettingsStore {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> CoreResult<NotificationSettings> {
        Ok(self.settings.lock().clone())
    }

    async fn save(&self, settings: &NotificationSettings) -> CoreResult<()> {
        settings.validate()?;
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}
