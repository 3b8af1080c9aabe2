use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::TaskStore;
use crate::error::{CoreError, CoreResult};
use crate::model::{DueReminder, NewTask, Reminder, ReorderItem, Task, TaskPatch, TaskStatus};

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<String, Task>,
    reminders: BTreeMap<String, Reminder>,
}

impl State {
    fn owned(&self, owner: &str, id: &str) -> CoreResult<&Task> {
        self.tasks
            .get(id)
            .filter(|task| task.owner_id == owner)
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    fn owned_mut(&mut self, owner: &str, id: &str) -> CoreResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .filter(|task| task.owner_id == owner)
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    /// Validate every item before any of them is applied.
    fn check_reorder(&self, owner: &str, items: &[ReorderItem]) -> CoreResult<()> {
        for item in items {
            self.owned(owner, &item.id)?;
            if let Some(parent) = item.parent_task_id.as_deref() {
                self.owned(owner, parent)?;
            }
        }
        Ok(())
    }

    fn apply_reorder(
        &mut self,
        owner: &str,
        items: &[ReorderItem],
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        for item in items {
            let task = self.owned_mut(owner, &item.id)?;
            task.position = item.position;
            task.parent_task_id = item.parent_task_id.clone();
            task.updated_at = now;
        }
        Ok(())
    }

    fn owned_reminder_mut(&mut self, owner: &str, id: &str) -> CoreResult<&mut Reminder> {
        let task_id = self
            .reminders
            .get(id)
            .map(|reminder| reminder.task_id.clone())
            .ok_or_else(|| CoreError::reminder_not_found(id))?;
        if self.owned(owner, &task_id).is_err() {
            return Err(CoreError::reminder_not_found(id));
        }
        self.reminders
            .get_mut(id)
            .ok_or_else(|| CoreError::reminder_not_found(id))
    }
}

/// Process-local store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a transient store error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn online(&self) -> CoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CoreError::store("memory store is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn tasks_by_owner(&self, owner: &str) -> CoreResult<Vec<Task>> {
        self.online()?;
        let state = self.state.lock();
        Ok(state
            .tasks
            .values()
            .filter(|task| task.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn tasks_by_status(&self, owner: &str, status: TaskStatus) -> CoreResult<Vec<Task>> {
        let mut tasks = self.tasks_by_owner(owner).await?;
        tasks.retain(|task| task.status == status);
        Ok(tasks)
    }

    async fn task(&self, owner: &str, id: &str) -> CoreResult<Task> {
        self.online()?;
        self.state.lock().owned(owner, id).cloned()
    }

    async fn create_task(&self, owner: &str, task: NewTask) -> CoreResult<Task> {
        self.online()?;
        let mut state = self.state.lock();
        if let Some(parent) = task.parent_task_id.as_deref() {
            state.owned(owner, parent)?;
        }
        let task = task.into_task(owner, Utc::now());
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update_task(&self, owner: &str, id: &str, patch: &TaskPatch) -> CoreResult<Task> {
        self.online()?;
        let mut state = self.state.lock();
        if let Some(Some(parent)) = patch.parent_task_id.as_ref() {
            state.owned(owner, parent)?;
        }
        let task = state.owned_mut(owner, id)?;
        patch.apply_to(task, Utc::now());
        Ok(task.clone())
    }

    async fn delete_task(
        &self,
        owner: &str,
        id: &str,
        reparented: &[ReorderItem],
    ) -> CoreResult<()> {
        self.online()?;
        let mut state = self.state.lock();
        state.owned(owner, id)?;
        state.check_reorder(owner, reparented)?;
        state.apply_reorder(owner, reparented, Utc::now())?;
        state.tasks.remove(id);
        state.reminders.retain(|_, reminder| reminder.task_id != id);
        Ok(())
    }

    async fn reminders_by_task(&self, owner: &str, task_id: &str) -> CoreResult<Vec<Reminder>> {
        self.online()?;
        let state = self.state.lock();
        state.owned(owner, task_id)?;
        let mut reminders: Vec<Reminder> = state
            .reminders
            .values()
            .filter(|reminder| reminder.task_id == task_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|reminder| reminder.reminder_time);
        Ok(reminders)
    }

    async fn create_reminder(
        &self,
        owner: &str,
        task_id: &str,
        time: DateTime<Utc>,
    ) -> CoreResult<Reminder> {
        self.online()?;
        let mut state = self.state.lock();
        state.owned(owner, task_id)?;
        let reminder = Reminder::new(task_id, time);
        state
            .reminders
            .insert(reminder.id.clone(), reminder.clone());
        Ok(reminder)
    }

    async fn delete_reminder(&self, owner: &str, id: &str) -> CoreResult<()> {
        self.online()?;
        let mut state = self.state.lock();
        state.owned_reminder_mut(owner, id)?;
        state.reminders.remove(id);
        Ok(())
    }

    async fn reorder(&self, owner: &str, items: &[ReorderItem]) -> CoreResult<()> {
        self.online()?;
        let mut state = self.state.lock();
        state.check_reorder(owner, items)?;
        state.apply_reorder(owner, items, Utc::now())
    }

    async fn due_tasks(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let mut due: Vec<Task> = self
            .tasks_by_owner(owner)
            .await?
            .into_iter()
            .filter(|task| {
                !task.notified
                    && !task.status.is_terminal()
                    && task.due_date.is_some_and(|due| due <= now)
            })
            .collect();
        due.sort_by_key(|task| task.due_date);
        Ok(due)
    }

    async fn due_reminders(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<DueReminder>> {
        self.online()?;
        let state = self.state.lock();
        let mut due: Vec<DueReminder> = state
            .reminders
            .values()
            .filter(|reminder| !reminder.notified && reminder.reminder_time <= now)
            .filter_map(|reminder| {
                let task = state.owned(owner, &reminder.task_id).ok()?;
                (!task.status.is_terminal()).then(|| DueReminder {
                    reminder: reminder.clone(),
                    task_title: task.title.clone(),
                })
            })
            .collect();
        due.sort_by_key(|due| due.reminder.reminder_time);
        Ok(due)
    }

    async fn mark_task_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        self.online()?;
        let mut state = self.state.lock();
        let task = state.owned_mut(owner, id)?;
        if task.notified {
            return Ok(false);
        }
        task.notified = true;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_reminder_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        self.online()?;
        let mut state = self.state.lock();
        let reminder = state.owned_reminder_mut(owner, id)?;
        if reminder.notified {
            return Ok(false);
        }
        reminder.notified = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn owner_scoping_hides_foreign_tasks() {
        let store = MemoryStore::new();
        let task = store
            .create_task("alice", NewTask::captured("Water plants", 1000.0))
            .await
            .unwrap();

        assert!(store.tasks_by_owner("bob").await.unwrap().is_empty());
        let err = store.task("bob", &task.id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(store.delete_task("bob", &task.id, &[]).await.is_err());
    }

    #[tokio::test]
    async fn reorder_is_all_or_nothing() {
        let store = MemoryStore::new();
        let task = store
            .create_task("alice", NewTask::captured("A", 1000.0))
            .await
            .unwrap();
        let items = vec![
            ReorderItem {
                id: task.id.clone(),
                position: 5000.0,
                parent_task_id: None,
            },
            ReorderItem {
                id: "missing".into(),
                position: 1.0,
                parent_task_id: None,
            },
        ];
        assert!(store.reorder("alice", &items).await.is_err());
        assert_eq!(store.task("alice", &task.id).await.unwrap().position, 1000.0);
    }

    #[tokio::test]
    async fn delete_is_all_or_nothing() {
        let store = MemoryStore::new();
        let parent = store
            .create_task("alice", NewTask::captured("Parent", 1000.0))
            .await
            .unwrap();
        let reparented = vec![ReorderItem {
            id: "missing".into(),
            position: 2000.0,
            parent_task_id: None,
        }];
        assert!(store.delete_task("alice", &parent.id, &reparented).await.is_err());
        assert!(store.task("alice", &parent.id).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_task_removes_its_reminders() {
        let store = MemoryStore::new();
        let task = store
            .create_task("alice", NewTask::captured("A", 1000.0))
            .await
            .unwrap();
        let reminder = store
            .create_reminder("alice", &task.id, Utc::now())
            .await
            .unwrap();
        store.delete_task("alice", &task.id, &[]).await.unwrap();
        let err = store
            .mark_reminder_notified("alice", &reminder.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn offline_store_fails_transiently() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.tasks_by_owner("alice").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TransientStore);
        store.set_offline(false);
        assert!(store.tasks_by_owner("alice").await.is_ok());
    }

    #[tokio::test]
    async fn due_queries_skip_notified_and_future_items() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut past = NewTask::captured("Past", 1000.0);
        past.due_date = Some(now - Duration::seconds(1));
        let mut future = NewTask::captured("Future", 2000.0);
        future.due_date = Some(now + Duration::hours(1));
        let past = store.create_task("alice", past).await.unwrap();
        store.create_task("alice", future).await.unwrap();

        let due = store.due_tasks("alice", now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);

        assert!(store.mark_task_notified("alice", &past.id).await.unwrap());
        assert!(!store.mark_task_notified("alice", &past.id).await.unwrap());
        assert!(store.due_tasks("alice", now).await.unwrap().is_empty());
    }
}
