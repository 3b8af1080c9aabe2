use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::model::Task;

/// Answers reparenting questions over a loaded set of tasks.
///
/// Side-effect free: it never mutates or persists anything.
pub struct HierarchyValidator<'a> {
    parents: HashMap<&'a str, Option<&'a str>>,
}

impl<'a> HierarchyValidator<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        let parents = tasks
            .iter()
            .map(|task| (task.id.as_str(), task.parent_task_id.as_deref()))
            .collect();
        Self { parents }
    }

    /// Whether `candidate` may become a child of `proposed_parent`.
    ///
    /// Walks the proposed parent's ancestor chain; the move is rejected when
    /// the candidate appears in it. A chain longer than the number of known
    /// tasks can only come from corrupt data and is reported as an error.
    pub fn can_reparent(&self, candidate: &str, proposed_parent: Option<&str>) -> CoreResult<bool> {
        let Some(parent) = proposed_parent else {
            return Ok(true);
        };
        if parent == candidate {
            return Ok(false);
        }

        let bound = self.parents.len() + 1;
        let mut current = parent;
        let mut steps = 0usize;
        loop {
            if current == candidate {
                return Ok(false);
            }
            match self.parents.get(current) {
                Some(Some(next)) => current = *next,
                // Reached a root, or a parent outside the loaded set.
                Some(None) | None => return Ok(true),
            }
            steps += 1;
            if steps > bound {
                return Err(CoreError::CorruptHierarchy {
                    task_id: parent.to_string(),
                    bound,
                });
            }
        }
    }

    /// Like [`can_reparent`](Self::can_reparent) but rejects with
    /// [`CoreError::Cycle`].
    pub fn ensure_can_reparent(&self, candidate: &str, proposed_parent: Option<&str>) -> CoreResult<()> {
        if self.can_reparent(candidate, proposed_parent)? {
            Ok(())
        } else {
            Err(CoreError::Cycle {
                candidate: candidate.to_string(),
                parent: proposed_parent.unwrap_or_default().to_string(),
            })
        }
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> CoreResult<Vec<&'a str>> {
        let bound = self.parents.len() + 1;
        let mut chain = Vec::new();
        let mut current = self.parents.get(id).copied().flatten();
        while let Some(parent) = current {
            if chain.len() > bound {
                return Err(CoreError::CorruptHierarchy {
                    task_id: id.to_string(),
                    bound,
                });
            }
            chain.push(parent);
            current = self.parents.get(parent).copied().flatten();
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use chrono::Utc;

    fn task(id: &str, parent: Option<&str>) -> Task {
        let mut task = NewTask::captured(id, 0.0).into_task("owner", Utc::now());
        task.id = id.to_string();
        task.parent_task_id = parent.map(str::to_string);
        task
    }

    fn forest() -> Vec<Task> {
        vec![
            task("x", None),
            task("y", Some("x")),
            task("z", Some("y")),
            task("w", None),
        ]
    }

    #[test]
    fn rejects_self_parenting() {
        let tasks = forest();
        let validator = HierarchyValidator::new(&tasks);
        assert!(!validator.can_reparent("w", Some("w")).unwrap());
    }

    #[test]
    fn rejects_moving_ancestor_under_descendant() {
        let tasks = forest();
        let validator = HierarchyValidator::new(&tasks);
        assert!(!validator.can_reparent("x", Some("z")).unwrap());
        let err = validator.ensure_can_reparent("x", Some("y")).unwrap_err();
        assert!(matches!(err, CoreError::Cycle { .. }));
    }

    #[test]
    fn accepts_unrelated_and_root_moves() {
        let tasks = forest();
        let validator = HierarchyValidator::new(&tasks);
        assert!(validator.can_reparent("w", Some("z")).unwrap());
        assert!(validator.can_reparent("z", Some("w")).unwrap());
        assert!(validator.can_reparent("y", None).unwrap());
    }

    #[test]
    fn corrupt_chain_is_a_hard_failure() {
        let tasks = vec![task("a", Some("b")), task("b", Some("a")), task("c", None)];
        let validator = HierarchyValidator::new(&tasks);
        let err = validator.can_reparent("c", Some("a")).unwrap_err();
        assert!(matches!(err, CoreError::CorruptHierarchy { .. }));
        assert!(validator.ancestors("a").is_err());
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tasks = forest();
        let validator = HierarchyValidator::new(&tasks);
        assert_eq!(validator.ancestors("z").unwrap(), vec!["y", "x"]);
        assert!(validator.ancestors("x").unwrap().is_empty());
    }

    #[test]
    fn accepted_moves_never_produce_cycles() {
        let tasks = forest();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        for candidate in &ids {
            for parent in &ids {
                let validator = HierarchyValidator::new(&tasks);
                if !validator.can_reparent(candidate, Some(*parent)).unwrap() {
                    continue;
                }
                let mut moved = tasks.clone();
                for t in moved.iter_mut().filter(|t| t.id == *candidate) {
                    t.parent_task_id = Some(parent.to_string());
                }
                let after = HierarchyValidator::new(&moved);
                for id in &ids {
                    assert!(after.ancestors(id).is_ok(), "{candidate} under {parent}");
                }
            }
        }
    }
}
