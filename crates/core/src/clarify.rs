//! Lifecycle of a captured item from the inbox to its disposition.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::model::{Task, TaskPatch, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// In the inbox, actionability unknown.
    Captured,
    Actionable,
    NonActionable,
    Completed,
    Trashed,
}

impl Stage {
    pub fn of(task: &Task) -> Stage {
        match (task.status, task.is_actionable) {
            (TaskStatus::Completed, _) => Stage::Completed,
            (TaskStatus::Trash, _) => Stage::Trashed,
            (_, None) => Stage::Captured,
            (_, Some(true)) => Stage::Actionable,
            (_, Some(false)) => Stage::NonActionable,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Trashed)
    }
}

/// Organising details chosen for an actionable item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPlan {
    pub project_id: Option<String>,
    pub contexts: Vec<String>,
    pub priority: Option<u8>,
    pub due_date: Option<DateTime<Utc>>,
    /// Set when the action is delegated; the item then waits on this person.
    pub delegated_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Trash,
    Someday,
    Reference,
    Actionable(ActionPlan),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clarified {
    /// The item is discarded.
    Remove,
    Update(TaskPatch),
}

/// Decide what a clarification does to `task`.
///
/// Any non-terminal item can be (re)clarified; the result always sets
/// `is_actionable` to a definite value.
pub fn clarify(task: &Task, disposition: Disposition) -> CoreResult<Clarified> {
    let stage = Stage::of(task);
    if stage.is_terminal() {
        return Err(CoreError::validation(format!(
            "task {} is {} and cannot be clarified",
            task.id, task.status
        )));
    }

    let patch = match disposition {
        Disposition::Trash => return Ok(Clarified::Remove),
        Disposition::Someday => non_actionable(TaskStatus::Someday),
        Disposition::Reference => non_actionable(TaskStatus::Reference),
        Disposition::Actionable(plan) => {
            let waiting_on = normalize(plan.delegated_to);
            let status = if waiting_on.is_some() {
                TaskStatus::Waiting
            } else {
                TaskStatus::NextActions
            };
            TaskPatch {
                status: Some(status),
                is_actionable: Some(Some(true)),
                project_id: plan.project_id.map(|p| normalize(Some(p))),
                contexts: (!plan.contexts.is_empty()).then(|| normalize_contexts(plan.contexts)),
                priority: plan.priority.map(|p| p.min(3)),
                waiting_on: Some(waiting_on),
                due_date: plan.due_date.map(Some),
                ..TaskPatch::default()
            }
        }
    };
    Ok(Clarified::Update(patch))
}

/// Mark a non-terminal task completed at `now`.
pub fn complete(task: &Task, now: DateTime<Utc>) -> CoreResult<TaskPatch> {
    if Stage::of(task).is_terminal() {
        return Err(CoreError::validation(format!(
            "task {} is already {}",
            task.id, task.status
        )));
    }
    Ok(TaskPatch {
        status: Some(TaskStatus::Completed),
        // Doing it settles the actionability question.
        is_actionable: task.is_actionable.is_none().then_some(Some(true)),
        completed_at: Some(Some(now)),
        ..TaskPatch::default()
    })
}

/// `is_actionable` is unknown exactly while the item sits unclarified in the inbox.
pub fn check_actionability(task: &Task) -> CoreResult<()> {
    let consistent = match task.is_actionable {
        None => task.status == TaskStatus::Inbox,
        Some(_) => task.status != TaskStatus::Inbox,
    };
    if consistent {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "task {} has status {} with actionability {:?}",
            task.id, task.status, task.is_actionable
        )))
    }
}

fn non_actionable(status: TaskStatus) -> TaskPatch {
    TaskPatch {
        status: Some(status),
        is_actionable: Some(Some(false)),
        waiting_on: Some(None),
        ..TaskPatch::default()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn normalize_contexts(contexts: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = contexts
        .into_iter()
        .filter_map(|ctx| normalize(Some(ctx.trim_start_matches('@').to_string())))
        .collect();
    result.sort();
    result.dedup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use pretty_assertions::assert_eq;

    fn inbox_task() -> Task {
        NewTask::captured("Read article", 1000.0).into_task("owner", Utc::now())
    }

    fn updated(task: &Task, disposition: Disposition) -> Task {
        let mut task = task.clone();
        match clarify(&task, disposition).unwrap() {
            Clarified::Update(patch) => patch.apply_to(&mut task, Utc::now()),
            Clarified::Remove => panic!("expected update"),
        }
        task
    }

    #[test]
    fn someday_is_non_actionable() {
        let task = updated(&inbox_task(), Disposition::Someday);
        assert_eq!(task.status, TaskStatus::Someday);
        assert_eq!(task.is_actionable, Some(false));
        assert_eq!(Stage::of(&task), Stage::NonActionable);
        check_actionability(&task).unwrap();
    }

    #[test]
    fn reference_is_non_actionable() {
        let task = updated(&inbox_task(), Disposition::Reference);
        assert_eq!(task.status, TaskStatus::Reference);
        assert_eq!(task.is_actionable, Some(false));
    }

    #[test]
    fn trash_removes_the_item() {
        assert_eq!(
            clarify(&inbox_task(), Disposition::Trash).unwrap(),
            Clarified::Remove
        );
    }

    #[test]
    fn actionable_item_becomes_next_action_with_details() {
        let due = Utc::now();
        let task = updated(
            &inbox_task(),
            Disposition::Actionable(ActionPlan {
                project_id: Some(" website ".into()),
                contexts: vec!["@desk".into(), "phone".into(), "desk".into()],
                priority: Some(9),
                due_date: Some(due),
                delegated_to: None,
            }),
        );
        assert_eq!(task.status, TaskStatus::NextActions);
        assert_eq!(task.is_actionable, Some(true));
        assert_eq!(task.project_id.as_deref(), Some("website"));
        assert_eq!(task.contexts, vec!["desk".to_string(), "phone".to_string()]);
        assert_eq!(task.priority, 3);
        assert_eq!(task.due_date, Some(due));
    }

    #[test]
    fn delegated_action_waits() {
        let task = updated(
            &inbox_task(),
            Disposition::Actionable(ActionPlan {
                delegated_to: Some("Sam".into()),
                ..ActionPlan::default()
            }),
        );
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.waiting_on.as_deref(), Some("Sam"));
        assert_eq!(task.is_actionable, Some(true));
    }

    #[test]
    fn reclarifying_never_returns_to_unknown() {
        let someday = updated(&inbox_task(), Disposition::Someday);
        let next = updated(&someday, Disposition::Actionable(ActionPlan::default()));
        assert_eq!(next.is_actionable, Some(true));
        assert_eq!(next.status, TaskStatus::NextActions);
    }

    #[test]
    fn completed_items_reject_further_transitions() {
        let mut task = inbox_task();
        complete(&task, Utc::now())
            .unwrap()
            .apply_to(&mut task, Utc::now());
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        check_actionability(&task).unwrap();
        assert!(complete(&task, Utc::now()).is_err());
        assert!(clarify(&task, Disposition::Someday).is_err());
    }

    #[test]
    fn inconsistent_actionability_is_reported() {
        let mut task = inbox_task();
        check_actionability(&task).unwrap();
        task.status = TaskStatus::NextActions;
        assert!(check_actionability(&task).is_err());
    }
}
