use std::collections::HashSet;

use crate::model::Task;
use crate::moves::MovePlan;
use crate::tree::{FlattenedNode, TreeProjection};

/// An owner's task list as shown to the user, with room for one optimistic
/// change that has not been confirmed by the store yet.
#[derive(Debug, Clone)]
pub struct TaskBoard {
    owner: String,
    tasks: Vec<Task>,
    expanded: HashSet<String>,
    confirmed: Option<(Vec<Task>, HashSet<String>)>,
}

impl TaskBoard {
    pub fn new(owner: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            owner: owner.into(),
            tasks,
            expanded: HashSet::new(),
            confirmed: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Swap in freshly loaded tasks; expansion state is kept for ids that still exist.
    pub fn replace(&mut self, tasks: Vec<Task>) {
        let present: HashSet<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
        self.expanded.retain(|id| present.contains(id.as_str()));
        self.tasks = tasks;
        self.confirmed = None;
    }

    pub fn expanded(&self) -> &HashSet<String> {
        &self.expanded
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn expand(&mut self, id: impl Into<String>) {
        self.expanded.insert(id.into());
    }

    pub fn collapse(&mut self, id: &str) {
        self.expanded.remove(id);
    }

    /// Flip expansion and report the new state.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.to_string());
            true
        }
    }

    pub fn expand_all(&mut self) {
        self.expanded = self.tasks.iter().map(|task| task.id.clone()).collect();
    }

    pub fn projection(&self) -> TreeProjection<'_> {
        TreeProjection::new(&self.tasks, &self.expanded)
    }

    pub fn visible(&self) -> Vec<FlattenedNode<'_>> {
        self.projection().iter().collect()
    }

    pub fn is_pending(&self) -> bool {
        self.confirmed.is_some()
    }

    /// Show `plan` immediately. The previous state is kept until
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn apply(&mut self, plan: &MovePlan) {
        if self.confirmed.is_none() {
            self.confirmed = Some((self.tasks.clone(), self.expanded.clone()));
        }
        for item in plan.updates() {
            if let Some(task) = self.tasks.iter_mut().find(|task| task.id == item.id) {
                task.position = item.position;
                task.parent_task_id = item.parent_task_id;
            }
        }
        if let Some(parent) = &plan.expand {
            self.expanded.insert(parent.clone());
        }
    }

    pub fn commit(&mut self) {
        self.confirmed = None;
    }

    /// Restore the last confirmed state. Returns whether anything was pending.
    pub fn rollback(&mut self) -> bool {
        match self.confirmed.take() {
            Some((tasks, expanded)) => {
                self.tasks = tasks;
                self.expanded = expanded;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use crate::moves::{MoveIntent, MoveResolution, MoveResolver};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn task(id: &str, position: f64) -> Task {
        let mut task = NewTask::captured(id, position).into_task("alice", Utc::now());
        task.id = id.to_string();
        task
    }

    fn board() -> TaskBoard {
        TaskBoard::new("alice", vec![task("x", 1000.0), task("y", 2000.0)])
    }

    fn nest_plan(board: &TaskBoard) -> MovePlan {
        let intent = MoveIntent::new("x", Some("y".into()), 80.0);
        match MoveResolver::default().resolve(board.tasks(), &intent).unwrap() {
            MoveResolution::Commit(plan) => plan,
            MoveResolution::Cancelled => panic!("expected a plan"),
        }
    }

    fn ids(board: &TaskBoard) -> Vec<(String, usize)> {
        board
            .visible()
            .iter()
            .map(|node| (node.id.to_string(), node.depth))
            .collect()
    }

    #[test]
    fn applied_plan_is_visible_and_expands_the_new_parent() {
        let mut board = board();
        let plan = nest_plan(&board);
        board.apply(&plan);

        assert!(board.is_pending());
        assert!(board.is_expanded("y"));
        assert_eq!(ids(&board), vec![("y".into(), 0), ("x".into(), 1)]);
        board.commit();
        assert!(!board.is_pending());
        assert!(!board.rollback());
    }

    #[test]
    fn rollback_restores_tasks_and_expansion() {
        let mut board = board();
        let before = board.tasks().to_vec();
        let plan = nest_plan(&board);
        board.apply(&plan);

        assert!(board.rollback());
        assert_eq!(board.tasks(), before.as_slice());
        assert!(!board.is_expanded("y"));
        assert_eq!(ids(&board), vec![("x".into(), 0), ("y".into(), 0)]);
    }

    #[test]
    fn replace_drops_expansion_for_missing_tasks() {
        let mut board = board();
        board.expand("x");
        board.expand("y");
        board.replace(vec![task("y", 1000.0)]);
        assert!(!board.is_expanded("x"));
        assert!(board.is_expanded("y"));
        assert!(!board.toggle("y"));
        assert!(board.toggle("y"));
    }
}
