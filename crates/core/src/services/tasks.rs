use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::capture::CaptureInput;
use crate::clarify::{self, Clarified, Disposition};
use crate::config::{AppConfig, EngineConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::{NewTask, Reminder, ReorderItem, Task, TaskPatch, TaskStatus};
use crate::moves::{MoveIntent, MoveResolution, MoveResolver};
use crate::position::{Allocation, PositionAllocator};
use crate::services::TaskBoard;
use crate::store::{SqliteStore, TaskStore};
use crate::tree::TreeProjection;

/// Outcome of clarifying an inbox item.
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifyOutcome {
    Updated(Task),
    /// Trashed items are deleted; children, if any, moved to the root group.
    Removed(DeleteOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub id: String,
    /// Former children, now roots, with their new tail positions.
    pub orphaned: Vec<ReorderItem>,
}

#[derive(Clone)]
pub struct TasksService {
    store: Arc<dyn TaskStore>,
    engine: EngineConfig,
    resolver: MoveResolver,
}

impl TasksService {
    pub fn new(store: Arc<dyn TaskStore>, engine: EngineConfig) -> CoreResult<Self> {
        let resolver = MoveResolver::from_config(&engine)?;
        Ok(Self {
            store,
            engine,
            resolver,
        })
    }

    /// Service backed by the SQLite database in the configured data directory.
    pub fn open(config: &AppConfig, engine: EngineConfig) -> CoreResult<Self> {
        let store = SqliteStore::open(config)?;
        Self::new(Arc::new(store), engine)
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn resolver(&self) -> &MoveResolver {
        &self.resolver
    }

    fn allocator(&self) -> &PositionAllocator {
        self.resolver.allocator()
    }

    pub async fn capture(&self, owner: &str, input: CaptureInput) -> CoreResult<Task> {
        input
            .require_text()
            .map_err(|err| CoreError::validation(err.to_string()))?;

        let tasks = self.store.tasks_by_owner(owner).await?;
        let parent = input.parent_id.as_deref();
        if let Some(parent) = parent {
            if !tasks.iter().any(|task| task.id == parent) {
                return Err(CoreError::task_not_found(parent));
            }
        }
        let position = self.tail_position(owner, &tasks, parent).await?;

        let mut new_task = NewTask::captured(input.title(), position);
        new_task.notes = input.notes();
        new_task.parent_task_id = input.parent_id.clone();
        new_task.due_date = input.due_date;
        let task = self.store.create_task(owner, new_task).await?;
        info!(task_id = %task.id, position, "captured task");
        Ok(task)
    }

    /// Tail position in the `parent` group, respacing the group first if needed.
    async fn tail_position(
        &self,
        owner: &str,
        tasks: &[Task],
        parent: Option<&str>,
    ) -> CoreResult<f64> {
        let expanded = HashSet::new();
        let projection = TreeProjection::new(tasks, &expanded);
        let group = projection.siblings(parent);
        let positions: Vec<f64> = group.iter().map(|task| task.position).collect();
        let allocation = self.allocator().append(&positions)?;
        if let Allocation::Rebalanced { siblings, .. } = &allocation {
            let items: Vec<ReorderItem> = group
                .iter()
                .zip(siblings)
                .map(|(task, position)| ReorderItem {
                    id: task.id.clone(),
                    position: *position,
                    parent_task_id: parent.map(str::to_string),
                })
                .collect();
            self.store.reorder(owner, &items).await?;
        }
        Ok(allocation.position())
    }

    pub async fn tasks(&self, owner: &str) -> CoreResult<Vec<Task>> {
        self.store.tasks_by_owner(owner).await
    }

    pub async fn tasks_by_status(&self, owner: &str, status: TaskStatus) -> CoreResult<Vec<Task>> {
        self.store.tasks_by_status(owner, status).await
    }

    /// Items still waiting for clarification.
    pub async fn inbox(&self, owner: &str) -> CoreResult<Vec<Task>> {
        let mut tasks = self.store.tasks_by_status(owner, TaskStatus::Inbox).await?;
        tasks.retain(|task| task.is_actionable.is_none());
        Ok(tasks)
    }

    pub async fn task(&self, owner: &str, id: &str) -> CoreResult<Task> {
        self.store.task(owner, id).await
    }

    pub async fn board(&self, owner: &str) -> CoreResult<TaskBoard> {
        let tasks = self.store.tasks_by_owner(owner).await?;
        Ok(TaskBoard::new(owner, tasks))
    }

    pub async fn refresh(&self, board: &mut TaskBoard) -> CoreResult<()> {
        let tasks = self.store.tasks_by_owner(board.owner()).await?;
        board.replace(tasks);
        Ok(())
    }

    /// Resolve a drop against the board and persist it.
    ///
    /// The board shows the move before the store confirms it and reverts to
    /// its previous state if the write fails.
    pub async fn move_task(
        &self,
        board: &mut TaskBoard,
        intent: &MoveIntent,
    ) -> CoreResult<MoveResolution> {
        let resolution = self.resolver.resolve(board.tasks(), intent)?;
        let plan = match &resolution {
            MoveResolution::Commit(plan) => plan,
            MoveResolution::Cancelled => {
                debug!(task_id = %intent.dragged_id, "move cancelled");
                return Ok(resolution);
            }
        };

        board.apply(plan);
        let persisted = self.store.reorder(board.owner(), &plan.updates()).await;
        match persisted {
            Ok(()) => {
                board.commit();
                info!(
                    task_id = %plan.task_id,
                    mode = ?plan.mode,
                    parent = ?plan.new_parent,
                    position = plan.position,
                    "move committed"
                );
                Ok(resolution)
            }
            Err(err) => {
                board.rollback();
                warn!(task_id = %plan.task_id, error = %err, "move failed; board restored");
                Err(err)
            }
        }
    }

    pub async fn clarify(
        &self,
        owner: &str,
        id: &str,
        disposition: Disposition,
    ) -> CoreResult<ClarifyOutcome> {
        let task = self.store.task(owner, id).await?;
        match clarify::clarify(&task, disposition)? {
            Clarified::Remove => {
                let outcome = self.delete_task(owner, id).await?;
                Ok(ClarifyOutcome::Removed(outcome))
            }
            Clarified::Update(mut patch) => {
                if let Some(due) = patch.due_date {
                    if due != task.due_date {
                        patch.notified = Some(false);
                    }
                }
                ensure_consistent(&task, &patch)?;
                let updated = self.store.update_task(owner, id, &patch).await?;
                info!(task_id = %id, status = %updated.status, "clarified task");
                Ok(ClarifyOutcome::Updated(updated))
            }
        }
    }

    pub async fn complete(&self, owner: &str, id: &str) -> CoreResult<Task> {
        let task = self.store.task(owner, id).await?;
        let patch = clarify::complete(&task, Utc::now())?;
        ensure_consistent(&task, &patch)?;
        let updated = self.store.update_task(owner, id, &patch).await?;
        info!(task_id = %id, "completed task");
        Ok(updated)
    }

    /// Change the due date. A new date is a new trigger, so `notified` resets.
    pub async fn set_due_date(
        &self,
        owner: &str,
        id: &str,
        due_date: Option<DateTime<Utc>>,
    ) -> CoreResult<Task> {
        let task = self.store.task(owner, id).await?;
        if task.due_date == due_date {
            return Ok(task);
        }
        let patch = TaskPatch {
            due_date: Some(due_date),
            notified: Some(false),
            ..TaskPatch::default()
        };
        self.store.update_task(owner, id, &patch).await
    }

    /// Delete a task. Its children move to the end of the root group, keeping
    /// their relative order; its reminders are deleted with it.
    ///
    /// The re-homing and the delete are a single store write. If the root
    /// group has no room left at its tail, it is respaced in that same write.
    pub async fn delete_task(&self, owner: &str, id: &str) -> CoreResult<DeleteOutcome> {
        let tasks = self.store.tasks_by_owner(owner).await?;
        if !tasks.iter().any(|task| task.id == id) {
            return Err(CoreError::task_not_found(id));
        }

        let expanded = HashSet::new();
        let projection = TreeProjection::new(&tasks, &expanded);
        let mut group: Vec<(String, f64)> = projection
            .roots()
            .iter()
            .filter(|task| task.id != id)
            .map(|task| (task.id.clone(), task.position))
            .collect();
        let first_orphan = group.len();
        let mut respaced = false;
        for child in projection.children_of(id) {
            let positions: Vec<f64> = group.iter().map(|(_, position)| *position).collect();
            match self.allocator().append(&positions)? {
                Allocation::Fresh(position) => group.push((child.id.clone(), position)),
                Allocation::Rebalanced { siblings, position } => {
                    for (entry, position) in group.iter_mut().zip(siblings) {
                        entry.1 = position;
                    }
                    group.push((child.id.clone(), position));
                    respaced = true;
                }
            }
        }

        let written_from = if respaced { 0 } else { first_orphan };
        let reparented: Vec<ReorderItem> = group[written_from..]
            .iter()
            .map(|(task_id, position)| ReorderItem {
                id: task_id.clone(),
                position: *position,
                parent_task_id: None,
            })
            .collect();
        self.store.delete_task(owner, id, &reparented).await?;

        let orphaned = reparented[first_orphan - written_from..].to_vec();
        info!(task_id = %id, orphaned = orphaned.len(), respaced, "deleted task");
        Ok(DeleteOutcome {
            id: id.to_string(),
            orphaned,
        })
    }

    pub async fn add_reminder(
        &self,
        owner: &str,
        task_id: &str,
        time: DateTime<Utc>,
    ) -> CoreResult<Reminder> {
        let reminder = self.store.create_reminder(owner, task_id, time).await?;
        debug!(task_id, reminder_id = %reminder.id, "reminder added");
        Ok(reminder)
    }

    pub async fn remove_reminder(&self, owner: &str, id: &str) -> CoreResult<()> {
        self.store.delete_reminder(owner, id).await
    }

    pub async fn reminders(&self, owner: &str, task_id: &str) -> CoreResult<Vec<Reminder>> {
        self.store.reminders_by_task(owner, task_id).await
    }
}

/// Reject a patch that would leave `is_actionable` out of step with the status.
fn ensure_consistent(task: &Task, patch: &TaskPatch) -> CoreResult<()> {
    let mut preview = task.clone();
    patch.apply_to(&mut preview, Utc::now());
    clarify::check_actionability(&preview)
}
