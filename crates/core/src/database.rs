use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{named_params, Connection, OptionalExtension, Row, Transaction};

use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{DueReminder, NewTask, Reminder, ReorderItem, Task, TaskPatch, TaskStatus};

const TASK_COLUMNS: &str = "id, owner_id, title, notes, parent_task_id, position, status, \
    is_actionable, project_id, priority, waiting_on, due_date, notified, created_at, updated_at, \
    completed_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn initialize(config: &AppConfig) -> CoreResult<Self> {
        Self::open(config.db_path())
    }

    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path).map_err(|err| {
            CoreError::Store(format!(
                "Failed to open database at {}: {}",
                path.display(),
                err
            ))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    pub fn fetch_tasks(&self, owner: &str, status: Option<TaskStatus>) -> CoreResult<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks WHERE owner_id = :owner", TASK_COLUMNS);
        if status.is_some() {
            sql.push_str(" AND status = :status");
        }
        sql.push_str(" ORDER BY parent_task_id IS NOT NULL, parent_task_id, position ASC, created_at ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match status {
            Some(status) => stmt.query(named_params![":owner": owner, ":status": status.as_str()])?,
            None => stmt.query(named_params![":owner": owner])?,
        };
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(map_task(row)?);
        }
        drop(rows);
        self.attach_contexts(&mut tasks)?;
        Ok(tasks)
    }

    pub fn fetch_task(&self, owner: &str, id: &str) -> CoreResult<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = :id AND owner_id = :owner LIMIT 1",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(named_params![":id": id, ":owner": owner])?;
        let task = match rows.next()? {
            Some(row) => map_task(row)?,
            None => return Ok(None),
        };
        drop(rows);
        let mut tasks = vec![task];
        self.attach_contexts(&mut tasks)?;
        Ok(tasks.pop())
    }

    fn require_task(&self, owner: &str, id: &str) -> CoreResult<Task> {
        self.fetch_task(owner, id)?
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    fn task_exists(&self, owner: &str, id: &str) -> CoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id = :id AND owner_id = :owner",
                named_params![":id": id, ":owner": owner],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_task(&self, owner: &str, new_task: NewTask) -> CoreResult<Task> {
        if let Some(parent) = new_task.parent_task_id.as_deref() {
            if !self.task_exists(owner, parent)? {
                return Err(CoreError::task_not_found(parent));
            }
        }
        let task = new_task.into_task(owner, Utc::now());
        self.conn.execute(
            "INSERT INTO tasks (
                id, owner_id, title, notes, parent_task_id, position, status, is_actionable,
                project_id, priority, waiting_on, due_date, notified, created_at, updated_at, completed_at
            ) VALUES (
                :id, :owner_id, :title, :notes, :parent_task_id, :position, :status, :is_actionable,
                NULL, 0, NULL, :due_date, 0, :created_at, :updated_at, NULL
            )",
            named_params![
                ":id": &task.id,
                ":owner_id": &task.owner_id,
                ":title": &task.title,
                ":notes": task.notes.as_deref(),
                ":parent_task_id": task.parent_task_id.as_deref(),
                ":position": task.position,
                ":status": task.status.as_str(),
                ":is_actionable": task.is_actionable,
                ":due_date": task.due_date.map(format_timestamp),
                ":created_at": format_timestamp(task.created_at),
                ":updated_at": format_timestamp(task.updated_at),
            ],
        )?;
        Ok(task)
    }

    pub fn update_task(&mut self, owner: &str, id: &str, patch: &TaskPatch) -> CoreResult<Task> {
        let mut task = self.require_task(owner, id)?;
        if let Some(Some(parent)) = patch.parent_task_id.as_ref() {
            if !self.task_exists(owner, parent)? {
                return Err(CoreError::task_not_found(parent));
            }
        }
        patch.apply_to(&mut task, Utc::now());

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE tasks SET
                title = :title,
                parent_task_id = :parent_task_id,
                position = :position,
                status = :status,
                is_actionable = :is_actionable,
                project_id = :project_id,
                priority = :priority,
                waiting_on = :waiting_on,
                due_date = :due_date,
                notified = :notified,
                updated_at = :updated_at,
                completed_at = :completed_at
             WHERE id = :id AND owner_id = :owner",
            named_params![
                ":title": &task.title,
                ":parent_task_id": task.parent_task_id.as_deref(),
                ":position": task.position,
                ":status": task.status.as_str(),
                ":is_actionable": task.is_actionable,
                ":project_id": task.project_id.as_deref(),
                ":priority": task.priority as i64,
                ":waiting_on": task.waiting_on.as_deref(),
                ":due_date": task.due_date.map(format_timestamp),
                ":notified": task.notified,
                ":updated_at": format_timestamp(task.updated_at),
                ":completed_at": task.completed_at.map(format_timestamp),
                ":id": id,
                ":owner": owner,
            ],
        )?;
        if patch.contexts.is_some() {
            tx.execute(
                "DELETE FROM task_contexts WHERE task_id = :id",
                named_params![":id": id],
            )?;
            for context in &task.contexts {
                tx.execute(
                    "INSERT OR IGNORE INTO task_contexts (task_id, context) VALUES (:id, :context)",
                    named_params![":id": id, ":context": context],
                )?;
            }
        }
        tx.commit()?;
        Ok(task)
    }

    /// Apply `reparented` and delete the task in one transaction.
    pub fn delete_task(
        &mut self,
        owner: &str,
        id: &str,
        reparented: &[ReorderItem],
    ) -> CoreResult<()> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        apply_reorder(&tx, owner, reparented, &now)?;
        let affected = tx.execute(
            "DELETE FROM tasks WHERE id = :id AND owner_id = :owner",
            named_params![":id": id, ":owner": owner],
        )?;
        if affected == 0 {
            return Err(CoreError::task_not_found(id));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn reorder(&mut self, owner: &str, items: &[ReorderItem]) -> CoreResult<()> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        apply_reorder(&tx, owner, items, &now)?;
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_reminders(&self, owner: &str, task_id: &str) -> CoreResult<Vec<Reminder>> {
        if !self.task_exists(owner, task_id)? {
            return Err(CoreError::task_not_found(task_id));
        }
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, reminder_time, notified FROM reminders
             WHERE task_id = :task_id ORDER BY reminder_time ASC",
        )?;
        let mut rows = stmt.query(named_params![":task_id": task_id])?;
        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(map_reminder(row)?);
        }
        Ok(reminders)
    }

    pub fn insert_reminder(
        &self,
        owner: &str,
        task_id: &str,
        time: DateTime<Utc>,
    ) -> CoreResult<Reminder> {
        if !self.task_exists(owner, task_id)? {
            return Err(CoreError::task_not_found(task_id));
        }
        let reminder = Reminder::new(task_id, time);
        self.conn.execute(
            "INSERT INTO reminders (id, task_id, reminder_time, notified)
             VALUES (:id, :task_id, :reminder_time, 0)",
            named_params![
                ":id": &reminder.id,
                ":task_id": &reminder.task_id,
                ":reminder_time": format_timestamp(reminder.reminder_time),
            ],
        )?;
        Ok(reminder)
    }

    pub fn delete_reminder(&self, owner: &str, id: &str) -> CoreResult<()> {
        let affected = self.conn.execute(
            "DELETE FROM reminders WHERE id = :id
             AND task_id IN (SELECT id FROM tasks WHERE owner_id = :owner)",
            named_params![":id": id, ":owner": owner],
        )?;
        if affected == 0 {
            return Err(CoreError::reminder_not_found(id));
        }
        Ok(())
    }

    pub fn fetch_due_tasks(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks
             WHERE owner_id = :owner AND notified = 0 AND due_date IS NOT NULL
               AND due_date <= :now AND status NOT IN ('completed', 'trash')
             ORDER BY due_date ASC",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(named_params![":owner": owner, ":now": format_timestamp(now)])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(map_task(row)?);
        }
        drop(rows);
        self.attach_contexts(&mut tasks)?;
        Ok(tasks)
    }

    pub fn fetch_due_reminders(&self, owner: &str, now: DateTime<Utc>) -> CoreResult<Vec<DueReminder>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.task_id, r.reminder_time, r.notified, t.title
             FROM reminders r JOIN tasks t ON t.id = r.task_id
             WHERE t.owner_id = :owner AND r.notified = 0 AND r.reminder_time <= :now
               AND t.status NOT IN ('completed', 'trash')
             ORDER BY r.reminder_time ASC",
        )?;
        let mut rows = stmt.query(named_params![":owner": owner, ":now": format_timestamp(now)])?;
        let mut due = Vec::new();
        while let Some(row) = rows.next()? {
            due.push(DueReminder {
                reminder: map_reminder(row)?,
                task_title: row.get(4)?,
            });
        }
        Ok(due)
    }

    pub fn mark_task_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET notified = 1, updated_at = :updated
             WHERE id = :id AND owner_id = :owner AND notified = 0",
            named_params![
                ":updated": format_timestamp(Utc::now()),
                ":id": id,
                ":owner": owner,
            ],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        if self.task_exists(owner, id)? {
            Ok(false)
        } else {
            Err(CoreError::task_not_found(id))
        }
    }

    pub fn mark_reminder_notified(&self, owner: &str, id: &str) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE reminders SET notified = 1
             WHERE id = :id AND notified = 0
               AND task_id IN (SELECT id FROM tasks WHERE owner_id = :owner)",
            named_params![":id": id, ":owner": owner],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM reminders r JOIN tasks t ON t.id = r.task_id
                 WHERE r.id = :id AND t.owner_id = :owner",
                named_params![":id": id, ":owner": owner],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(false),
            None => Err(CoreError::reminder_not_found(id)),
        }
    }

    fn attach_contexts(&self, tasks: &mut [Task]) -> CoreResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "SELECT context FROM task_contexts WHERE task_id = :id ORDER BY context ASC",
        )?;
        for task in tasks.iter_mut() {
            let contexts = stmt
                .query_map(named_params![":id": &task.id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            task.contexts = contexts;
        }
        Ok(())
    }

    fn apply_migrations(&self) -> CoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                notes TEXT,
                parent_task_id TEXT,
                position REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                is_actionable INTEGER,
                project_id TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                waiting_on TEXT,
                due_date TEXT,
                notified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
             );
             CREATE TABLE IF NOT EXISTS task_contexts (
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                context TEXT NOT NULL,
                PRIMARY KEY (task_id, context)
             );
             CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                reminder_time TEXT NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_tasks_owner_parent ON tasks(owner_id, parent_task_id, position);
             CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(owner_id, status);
             CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date) WHERE notified = 0;
             CREATE INDEX IF NOT EXISTS idx_reminders_task ON reminders(task_id);
             CREATE INDEX IF NOT EXISTS idx_reminders_time ON reminders(reminder_time) WHERE notified = 0;
            ",
        )?;
        Ok(())
    }
}

/// Dropping `tx` without commit after an error rolls every item back.
fn apply_reorder(
    tx: &Transaction<'_>,
    owner: &str,
    items: &[ReorderItem],
    now: &str,
) -> CoreResult<()> {
    for item in items {
        if let Some(parent) = item.parent_task_id.as_deref() {
            let parent_found: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE id = :id AND owner_id = :owner",
                    named_params![":id": parent, ":owner": owner],
                    |row| row.get(0),
                )
                .optional()?;
            if parent_found.is_none() {
                return Err(CoreError::task_not_found(parent));
            }
        }
        let affected = tx.execute(
            "UPDATE tasks SET position = :position, parent_task_id = :parent, updated_at = :updated
             WHERE id = :id AND owner_id = :owner",
            named_params![
                ":position": item.position,
                ":parent": item.parent_task_id.as_deref(),
                ":updated": now,
                ":id": &item.id,
                ":owner": owner,
            ],
        )?;
        if affected == 0 {
            return Err(CoreError::task_not_found(&item.id));
        }
    }
    Ok(())
}

/// Fixed-width UTC timestamps so string comparison in SQL matches time order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_datetime_required(raw: String) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Store(format!("Failed to parse timestamp '{}': {}", raw, e)))
}

fn map_task(row: &Row<'_>) -> CoreResult<Task> {
    let status: String = row.get(6)?;
    let status = status
        .parse::<TaskStatus>()
        .map_err(|err| CoreError::Store(err.to_string()))?;

    Ok(Task {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        notes: row.get(3)?,
        parent_task_id: row.get(4)?,
        position: row.get(5)?,
        status,
        is_actionable: row.get(7)?,
        project_id: row.get(8)?,
        contexts: Vec::new(),
        priority: row.get::<_, i64>(9)? as u8,
        waiting_on: row.get(10)?,
        due_date: parse_datetime(row.get::<_, Option<String>>(11)?),
        notified: row.get(12)?,
        created_at: parse_datetime_required(row.get::<_, String>(13)?)?,
        updated_at: parse_datetime_required(row.get::<_, String>(14)?)?,
        completed_at: parse_datetime(row.get::<_, Option<String>>(15)?),
    })
}

fn map_reminder(row: &Row<'_>) -> CoreResult<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        task_id: row.get(1)?,
        reminder_time: parse_datetime_required(row.get::<_, String>(2)?)?,
        notified: row.get(3)?,
    })
}
