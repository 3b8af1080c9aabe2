use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::TaskStore;
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::CoreResult;
use crate::model::{DueReminder, NewTask, Reminder, ReorderItem, Task, TaskPatch, TaskStatus};

/// [`TaskStore`] backed by the local SQLite database.
///
/// rusqlite is synchronous, so every call hops onto the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn open(config: &AppConfig) -> CoreResult<Self> {
        let db = Database::initialize(config)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    async fn with_db<T, F>(&self, f: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> CoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&mut db.lock())).await?
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn tasks_by_owner(&self, owner: &str) -> CoreResult<Vec<Task>> {
        let owner = owner.to_string();
        self.with_db(move |db| db.fetch_tasks(&owner, None)).await
    }

    async fn tasks_by_status(&self, owner: &str, status: TaskStatus) -> CoreResult<Vec<Task>> {
        let owner = owner.to_string();
        self.with_db(move |db| db.fetch_tasks(&owner, Some(status)))
            .await
    }

    async fn task(&self, owner: &str, id: &str) -> CoreResult<Task> {
        let (owner, id) = (owner.to_string(), id.to_string());
        self.with_db(move |db| {
            db.fetch_task(&owner, &id)?
                .ok_or_else(|| crate::error::CoreError::task_not_found(&id))
        })
        .await
    }

    async fn create_task(&self, owner: &str, task: NewTask) -> CoreResult<Task> {
        let owner = owner.to_string();
        self.with_db(move |db| db.insert_task(&owner, task)).await
    }

    async fn update_task(&self, owner: &str, id: &str, patch: &TaskPatch) -> CoreResult<Task> {
        let (owner, id, patch) = (owner.to_string(), id.to_string(), patch.clone());
        self.with_db(move |db| db.update_task(&owner, &id, &patch))
            .await
    }

    async fn delete_task(
        &self,
        owner: &str,
        id: &str,
        reparented: &[ReorderItem],
    ) -> CoreResult<()> {
        let (owner, id, reparented) = (owner.to_string(), id.to_string(), reparented.to_vec());
        self.with_db(move |db| db.delete_task(&owner, &id, &reparented))
            .await
    }

    async fn reminders_by_task(&self, owner: &str, task_id: &str) -> CoreResult<Vec<Reminder>> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.with_db(move |db| db.fetch_reminders(&owner, &task_id))
            .await
    }

    async fn create_reminder(
        &self,
        owner: &str,
        task_id: &str,
        time: DateTime<Utc>,
    ) -> CoreResult<Reminder> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.with_db(move |db| db.insert_reminder(&owner, &task_id, time))
            .await
    }

    async fn delete_reminder(&self, owner: &str, id: &str) -> CoreResult<()> {
        let (owner, id) = (owner.to_string(), id.to_string());
        self.with_db(move |db| db.delete_reminder(&owner, &id)).await
    }

    async fn reorder(&self, owner: &str, items: &[ReorderItem]) -> CoreResult<()> {
        let (owner, items) = (owner.to_string(), items.to_vec());
        self.with_db(move |db| db.reorder(&owner, &items)).await
    }

    async fn due_tasks(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let owner = owner.to_string();
        self.with_db(move |db| db.fetch_due_tasks(&owner, now)).await
    }

    async fn due_reminders(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<DueReminder>> {
        let owner = owner.to_string();
        self.with_db(move |db| db.fetch_due_reminders(&owner, now))
            .await
    }

    async fn mark_task_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        let (owner, id) = (owner.to_string(), id.to_string());
        self.with_db(move |db| db.mark_task_notified(&owner, &id))
            .await
    }

    async fn mark_reminder_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        let (owner, id) = (owner.to_string(), id.to_string());
        self.with_db(move |db| db.mark_reminder_notified(&owner, &id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).expect("config");
        (SqliteStore::open(&config).expect("store"), dir)
    }

    #[tokio::test]
    async fn tasks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).unwrap();
        let id = {
            let store = SqliteStore::open(&config).unwrap();
            store
                .create_task("alice", NewTask::captured("Persist me", 1000.0))
                .await
                .unwrap()
                .id
        };
        let store = SqliteStore::open(&config).unwrap();
        let task = store.task("alice", &id).await.unwrap();
        assert_eq!(task.title, "Persist me");
    }

    #[tokio::test]
    async fn reorder_moves_parent_and_position_together() {
        let (store, _dir) = temp_store();
        let parent = store
            .create_task("alice", NewTask::captured("Parent", 1000.0))
            .await
            .unwrap();
        let child = store
            .create_task("alice", NewTask::captured("Child", 2000.0))
            .await
            .unwrap();
        store
            .reorder(
                "alice",
                &[ReorderItem {
                    id: child.id.clone(),
                    position: 1000.0,
                    parent_task_id: Some(parent.id.clone()),
                }],
            )
            .await
            .unwrap();

        let moved = store.task("alice", &child.id).await.unwrap();
        assert_eq!(moved.parent_task_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(moved.position, 1000.0);
    }

    #[tokio::test]
    async fn status_filter_and_owner_scope() {
        let (store, _dir) = temp_store();
        store
            .create_task("alice", NewTask::captured("Inbox item", 1000.0))
            .await
            .unwrap();
        store
            .create_task("bob", NewTask::captured("Bob's item", 1000.0))
            .await
            .unwrap();

        let inbox = store.tasks_by_status("alice", TaskStatus::Inbox).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(store
            .tasks_by_status("alice", TaskStatus::Someday)
            .await
            .unwrap()
            .is_empty());

        let err = store.task("alice", "nope").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
