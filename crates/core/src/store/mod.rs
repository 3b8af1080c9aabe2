//! Persistence port consumed by the engine.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::model::{DueReminder, NewTask, Reminder, ReorderItem, Task, TaskPatch, TaskStatus};

/// Task and reminder persistence, scoped by owner.
///
/// Ids that do not exist, or belong to another owner, are reported as
/// [`CoreError::NotFound`](crate::error::CoreError::NotFound).
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn tasks_by_owner(&self, owner: &str) -> CoreResult<Vec<Task>>;

    async fn tasks_by_status(&self, owner: &str, status: TaskStatus) -> CoreResult<Vec<Task>>;

    async fn task(&self, owner: &str, id: &str) -> CoreResult<Task>;

    /// The parent, when set, must exist for the same owner.
    async fn create_task(&self, owner: &str, task: NewTask) -> CoreResult<Task>;

    async fn update_task(&self, owner: &str, id: &str, patch: &TaskPatch) -> CoreResult<Task>;

    /// Deletes the task row and its reminders, applying `reparented` in the
    /// same write. Either all of it happens or none of it does.
    async fn delete_task(
        &self,
        owner: &str,
        id: &str,
        reparented: &[ReorderItem],
    ) -> CoreResult<()>;

    async fn reminders_by_task(&self, owner: &str, task_id: &str) -> CoreResult<Vec<Reminder>>;

    async fn create_reminder(
        &self,
        owner: &str,
        task_id: &str,
        time: DateTime<Utc>,
    ) -> CoreResult<Reminder>;

    async fn delete_reminder(&self, owner: &str, id: &str) -> CoreResult<()>;

    /// Applies every item or none of them.
    async fn reorder(&self, owner: &str, items: &[ReorderItem]) -> CoreResult<()>;

    /// Unnotified tasks due at or before `now`, excluding completed and trashed ones.
    async fn due_tasks(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<Task>>;

    /// Unnotified reminders at or before `now` whose task is still open.
    async fn due_reminders(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<DueReminder>>;

    /// Flip the task's `notified` flag. Returns `false` if it was already set.
    async fn mark_task_notified(&self, owner: &str, id: &str) -> CoreResult<bool>;

    /// Flip the reminder's `notified` flag. Returns `false` if it was already set.
    async fn mark_reminder_notified(&self, owner: &str, id: &str) -> CoreResult<bool>;
}
