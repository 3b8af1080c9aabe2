use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Inbox,
    NextActions,
    Waiting,
    Someday,
    Reference,
    Completed,
    Trash,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::NextActions => "next-actions",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Someday => "someday",
            TaskStatus::Reference => "reference",
            TaskStatus::Completed => "completed",
            TaskStatus::Trash => "trash",
        }
    }

    /// Completed and trashed tasks take no further workflow transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Trash)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbox" => Ok(TaskStatus::Inbox),
            "next-actions" | "next_actions" | "next" => Ok(TaskStatus::NextActions),
            "waiting" => Ok(TaskStatus::Waiting),
            "someday" => Ok(TaskStatus::Someday),
            "reference" => Ok(TaskStatus::Reference),
            "completed" | "done" => Ok(TaskStatus::Completed),
            "trash" => Ok(TaskStatus::Trash),
            other => Err(anyhow!(
                "Unknown status '{}': expected inbox|next-actions|waiting|someday|reference|completed|trash",
                other
            )),
        }
    }
}

impl ValueEnum for TaskStatus {
    fn value_variants<'a>() -> &'a [Self] {
        const VARIANTS: [TaskStatus; 7] = [
            TaskStatus::Inbox,
            TaskStatus::NextActions,
            TaskStatus::Waiting,
            TaskStatus::Someday,
            TaskStatus::Reference,
            TaskStatus::Completed,
            TaskStatus::Trash,
        ];
        &VARIANTS
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// A task together with its resolved context links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    pub position: f64,
    pub status: TaskStatus,
    /// `None` until the item has been clarified.
    pub is_actionable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub contexts: Vec<String>,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    pub parent_task_id: Option<String>,
    pub position: f64,
    pub status: TaskStatus,
    pub is_actionable: Option<bool>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    /// An unclarified inbox item.
    pub fn captured(title: impl Into<String>, position: f64) -> Self {
        Self {
            title: title.into(),
            notes: None,
            parent_task_id: None,
            position,
            status: TaskStatus::Inbox,
            is_actionable: None,
            due_date: None,
        }
    }

    pub fn into_task(self, owner_id: &str, now: DateTime<Utc>) -> Task {
        Task {
            id: Ulid::new().to_string(),
            owner_id: owner_id.to_string(),
            title: self.title,
            notes: self.notes,
            parent_task_id: self.parent_task_id,
            position: self.position,
            status: self.status,
            is_actionable: self.is_actionable,
            project_id: None,
            contexts: Vec::new(),
            priority: 0,
            waiting_on: None,
            due_date: self.due_date,
            notified: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Partial update. Outer `None` leaves a field untouched; nullable fields use
/// an inner `Option` so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub parent_task_id: Option<Option<String>>,
    pub position: Option<f64>,
    pub status: Option<TaskStatus>,
    pub is_actionable: Option<Option<bool>>,
    pub project_id: Option<Option<String>>,
    pub contexts: Option<Vec<String>>,
    pub priority: Option<u8>,
    pub waiting_on: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub notified: Option<bool>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(parent) = &self.parent_task_id {
            task.parent_task_id = parent.clone();
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(actionable) = self.is_actionable {
            task.is_actionable = actionable;
        }
        if let Some(project) = &self.project_id {
            task.project_id = project.clone();
        }
        if let Some(contexts) = &self.contexts {
            task.contexts = contexts.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority.min(3);
        }
        if let Some(waiting_on) = &self.waiting_on {
            task.waiting_on = waiting_on.clone();
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(notified) = self.notified {
            task.notified = notified;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        task.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub reminder_time: DateTime<Utc>,
    pub notified: bool,
}

impl Reminder {
    pub fn new(task_id: &str, reminder_time: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            task_id: task_id.to_string(),
            reminder_time,
            notified: false,
        }
    }
}

/// A reminder that has elapsed, joined with its task's title.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReminder {
    pub reminder: Reminder,
    pub task_title: String,
}

/// One row of a batch reorder: parent and position always travel together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReorderItem {
    pub id: String,
    pub position: f64,
    pub parent_task_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Due,
    Reminder,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Due => "due",
            TriggerKind::Reminder => "reminder",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationEvent {
    pub task_id: String,
    pub title: String,
    pub trigger: TriggerKind,
    pub trigger_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_id: Option<String>,
}
