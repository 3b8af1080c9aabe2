pub mod capture;
pub mod clarify;
pub mod config;
pub mod database;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod moves;
pub mod notifier;
pub mod position;
pub mod services;
pub mod settings;
pub mod store;
pub mod tree;

pub use capture::CaptureInput;
pub use clarify::{ActionPlan, Disposition};
pub use config::{AppConfig, EngineConfig};
pub use database::Database;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use model::*;
pub use moves::{MoveGesture, MoveIntent, MoveMode, MovePlan, MoveResolution, MoveResolver};
pub use notifier::{NotificationSink, Notifier};
pub use services::{ClarifyOutcome, DeleteOutcome, TaskBoard, TasksService};
pub use settings::{JsonSettingsStore, NotificationSettings, Permission, SettingsStore};
pub use store::{MemoryStore, SqliteStore, TaskStore};
