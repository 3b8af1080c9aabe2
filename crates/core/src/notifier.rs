//! Polling for due tasks and elapsed reminders.
//!
//! Every trigger produces at most one automatic notification. The row is
//! flagged before delivery, so a failed delivery is not retried and an
//! explicit acknowledgement racing a poll never produces a second alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::model::{NotificationEvent, TriggerKind};
use crate::settings::{NotificationSettings, SettingsStore};
use crate::store::TaskStore;

/// Presents a notification to the user.
pub trait NotificationSink: Send + Sync {
    fn deliver(
        &self,
        event: &NotificationEvent,
        settings: &NotificationSettings,
    ) -> anyhow::Result<()>;
}

pub struct Notifier {
    owner: String,
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn NotificationSink>,
    settings_store: Arc<dyn SettingsStore>,
    settings: RwLock<NotificationSettings>,
    due_interval: Duration,
    reminder_interval: Duration,
}

impl Notifier {
    pub fn new(
        owner: impl Into<String>,
        store: Arc<dyn TaskStore>,
        sink: Arc<dyn NotificationSink>,
        settings_store: Arc<dyn SettingsStore>,
        settings: NotificationSettings,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            owner: owner.into(),
            store,
            sink,
            settings_store,
            settings: RwLock::new(settings),
            due_interval: engine.due_poll_interval,
            reminder_interval: engine.reminder_poll_interval,
        }
    }

    /// Build a notifier with settings read from `settings_store`.
    pub async fn load(
        owner: impl Into<String>,
        store: Arc<dyn TaskStore>,
        sink: Arc<dyn NotificationSink>,
        settings_store: Arc<dyn SettingsStore>,
        engine: &EngineConfig,
    ) -> CoreResult<Self> {
        let settings = settings_store.load().await?;
        Ok(Self::new(owner, store, sink, settings_store, settings, engine))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn settings(&self) -> NotificationSettings {
        self.settings.read().clone()
    }

    /// Persist and apply new settings. Invalid settings leave the current ones in place.
    pub async fn update_settings(&self, settings: NotificationSettings) -> CoreResult<()> {
        settings.validate()?;
        self.settings_store.save(&settings).await?;
        *self.settings.write() = settings;
        Ok(())
    }

    /// Notify for every unnotified task due at or before `now`.
    pub async fn check_due(&self, now: DateTime<Utc>) -> CoreResult<Vec<NotificationEvent>> {
        let due = self.store.due_tasks(&self.owner, now).await?;
        let mut events = Vec::with_capacity(due.len());
        for task in due {
            if !self.store.mark_task_notified(&self.owner, &task.id).await? {
                debug!(task_id = %task.id, "due task already acknowledged");
                continue;
            }
            let Some(trigger_time) = task.due_date else {
                continue;
            };
            let event = NotificationEvent {
                task_id: task.id,
                title: task.title,
                trigger: TriggerKind::Due,
                trigger_time,
                reminder_id: None,
            };
            self.emit(&event);
            events.push(event);
        }
        Ok(events)
    }

    /// Notify for every unnotified reminder at or before `now`.
    pub async fn check_reminders(&self, now: DateTime<Utc>) -> CoreResult<Vec<NotificationEvent>> {
        let due = self.store.due_reminders(&self.owner, now).await?;
        let mut events = Vec::with_capacity(due.len());
        for item in due {
            let reminder = item.reminder;
            if !self
                .store
                .mark_reminder_notified(&self.owner, &reminder.id)
                .await?
            {
                debug!(reminder_id = %reminder.id, "reminder already acknowledged");
                continue;
            }
            let event = NotificationEvent {
                task_id: reminder.task_id,
                title: item.task_title,
                trigger: TriggerKind::Reminder,
                trigger_time: reminder.reminder_time,
                reminder_id: Some(reminder.id),
            };
            self.emit(&event);
            events.push(event);
        }
        Ok(events)
    }

    /// One pass of both checks.
    pub async fn tick(&self, now: DateTime<Utc>) -> CoreResult<Vec<NotificationEvent>> {
        let mut events = self.check_due(now).await?;
        events.extend(self.check_reminders(now).await?);
        Ok(events)
    }

    /// Dismiss a due-date alert. Returns `false` when it was already dismissed.
    pub async fn acknowledge_task(&self, task_id: &str) -> CoreResult<bool> {
        let changed = self.store.mark_task_notified(&self.owner, task_id).await?;
        debug!(task_id, changed, "task acknowledged");
        Ok(changed)
    }

    /// Dismiss a reminder. Returns `false` when it was already dismissed.
    pub async fn acknowledge_reminder(&self, reminder_id: &str) -> CoreResult<bool> {
        let changed = self
            .store
            .mark_reminder_notified(&self.owner, reminder_id)
            .await?;
        debug!(reminder_id, changed, "reminder acknowledged");
        Ok(changed)
    }

    /// Poll both sources on their own intervals until `shutdown` flips to `true`
    /// or its sender is dropped. Failed polls are logged and retried next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoreResult<()> {
        let mut due_timer = tokio::time::interval(self.due_interval);
        due_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reminder_timer = tokio::time::interval(self.reminder_interval);
        reminder_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            owner = %self.owner,
            due_every = ?self.due_interval,
            reminders_every = ?self.reminder_interval,
            "notifier started"
        );
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = due_timer.tick() => {
                    if let Err(err) = self.check_due(Utc::now()).await {
                        warn!(error = %err, "due-date poll failed");
                    }
                }
                _ = reminder_timer.tick() => {
                    if let Err(err) = self.check_reminders(Utc::now()).await {
                        warn!(error = %err, "reminder poll failed");
                    }
                }
            }
        }
        info!(owner = %self.owner, "notifier stopped");
        Ok(())
    }

    fn emit(&self, event: &NotificationEvent) {
        let settings = self.settings();
        if !settings.allows_delivery() {
            debug!(task_id = %event.task_id, "notification permission denied; not delivering");
            return;
        }
        match self.sink.deliver(event, &settings) {
            Ok(()) => info!(
                task_id = %event.task_id,
                trigger = %event.trigger,
                "notification delivered"
            ),
            Err(err) => warn!(
                task_id = %event.task_id,
                trigger = %event.trigger,
                error = %err,
                "notification delivery failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTask, TaskPatch, TaskStatus};
    use crate::settings::{MemorySettingsStore, Permission};
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const OWNER: &str = "alice";

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<NotificationEvent>>,
    }

    impl NotificationSink for RecordingSink {
        fn deliver(
            &self,
            event: &NotificationEvent,
            _settings: &NotificationSettings,
        ) -> anyhow::Result<()> {
            self.delivered.lock().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn deliver(
            &self,
            _event: &NotificationEvent,
            _settings: &NotificationSettings,
        ) -> anyhow::Result<()> {
            anyhow::bail!("display unavailable")
        }
    }

    fn notifier_with(
        store: Arc<MemoryStore>,
        sink: Arc<dyn NotificationSink>,
        settings: NotificationSettings,
    ) -> Notifier {
        Notifier::new(
            OWNER,
            store,
            sink,
            Arc::new(MemorySettingsStore::new(settings.clone())),
            settings,
            &EngineConfig::default(),
        )
    }

    async fn overdue_task(store: &MemoryStore, now: DateTime<Utc>) -> String {
        let mut task = NewTask::captured("File taxes", 1000.0);
        task.due_date = Some(now - ChronoDuration::seconds(1));
        task.status = TaskStatus::NextActions;
        task.is_actionable = Some(true);
        store.create_task(OWNER, task).await.unwrap().id
    }

    #[tokio::test]
    async fn due_task_notifies_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier_with(store.clone(), sink.clone(), NotificationSettings::default());
        let now = Utc::now();
        let id = overdue_task(&store, now).await;

        let events = notifier.tick(now).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, id);
        assert_eq!(events[0].trigger, TriggerKind::Due);
        assert!(store.task(OWNER, &id).await.unwrap().notified);

        assert!(notifier.tick(now).await.unwrap().is_empty());
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn acknowledged_task_drops_out_of_checks() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(
            store.clone(),
            Arc::new(RecordingSink::default()),
            NotificationSettings::default(),
        );
        let now = Utc::now();
        let id = overdue_task(&store, now).await;

        assert_eq!(store.due_tasks(OWNER, now).await.unwrap().len(), 1);
        assert!(notifier.acknowledge_task(&id).await.unwrap());
        assert!(notifier.check_due(now).await.unwrap().is_empty());
        assert!(!notifier.acknowledge_task(&id).await.unwrap());
    }

    #[tokio::test]
    async fn reminder_acknowledgement_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(
            store.clone(),
            Arc::new(RecordingSink::default()),
            NotificationSettings::default(),
        );
        let task = store
            .create_task(OWNER, NewTask::captured("Call mom", 1000.0))
            .await
            .unwrap();
        let reminder = store
            .create_reminder(OWNER, &task.id, Utc::now())
            .await
            .unwrap();

        assert!(notifier.acknowledge_reminder(&reminder.id).await.unwrap());
        assert!(!notifier.acknowledge_reminder(&reminder.id).await.unwrap());
        let reminders = store.reminders_by_task(OWNER, &task.id).await.unwrap();
        assert!(reminders[0].notified);
    }

    #[tokio::test]
    async fn elapsed_reminder_carries_task_title() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(
            store.clone(),
            Arc::new(RecordingSink::default()),
            NotificationSettings::default(),
        );
        let now = Utc::now();
        let task = store
            .create_task(OWNER, NewTask::captured("Standup", 1000.0))
            .await
            .unwrap();
        let reminder = store
            .create_reminder(OWNER, &task.id, now - ChronoDuration::minutes(1))
            .await
            .unwrap();
        store
            .create_reminder(OWNER, &task.id, now + ChronoDuration::hours(1))
            .await
            .unwrap();

        let events = notifier.check_reminders(now).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Standup");
        assert_eq!(events[0].reminder_id.as_deref(), Some(reminder.id.as_str()));
        assert!(notifier.check_reminders(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_tasks_are_not_notified() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(
            store.clone(),
            Arc::new(RecordingSink::default()),
            NotificationSettings::default(),
        );
        let now = Utc::now();
        let id = overdue_task(&store, now).await;
        store
            .update_task(
                OWNER,
                &id,
                &TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();
        store.create_reminder(OWNER, &id, now).await.unwrap();

        assert!(notifier.tick(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_still_marks_the_trigger() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(store.clone(), Arc::new(FailingSink), NotificationSettings::default());
        let now = Utc::now();
        let id = overdue_task(&store, now).await;

        assert_eq!(notifier.check_due(now).await.unwrap().len(), 1);
        assert!(store.task(OWNER, &id).await.unwrap().notified);
        assert!(notifier.check_due(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_permission_suppresses_delivery_only() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let settings = NotificationSettings {
            permission: Permission::Denied,
            ..NotificationSettings::default()
        };
        let notifier = notifier_with(store.clone(), sink.clone(), settings);
        let now = Utc::now();
        overdue_task(&store, now).await;

        assert_eq!(notifier.check_due(now).await.unwrap().len(), 1);
        assert!(sink.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn settings_updates_are_validated_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let settings_store = Arc::new(MemorySettingsStore::default());
        let notifier = Notifier::load(
            OWNER,
            store,
            Arc::new(RecordingSink::default()),
            settings_store.clone(),
            &EngineConfig::default(),
        )
        .await
        .unwrap();

        let quiet = NotificationSettings {
            sound_enabled: false,
            ..NotificationSettings::default()
        };
        notifier.update_settings(quiet.clone()).await.unwrap();
        assert_eq!(notifier.settings(), quiet);
        assert_eq!(settings_store.load().await.unwrap(), quiet);

        let loud = NotificationSettings {
            volume: 3.0,
            ..NotificationSettings::default()
        };
        assert!(notifier.update_settings(loud).await.is_err());
        assert_eq!(notifier.settings(), quiet);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_is_signalled() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier_with(
            store,
            Arc::new(RecordingSink::default()),
            NotificationSettings::default(),
        );
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        notifier.run(rx).await.unwrap();
    }
}
