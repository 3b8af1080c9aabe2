//! Flat task rows to an ordered, depth-annotated outline.

use std::collections::{HashMap, HashSet};

use crate::model::Task;

/// One visible row of the outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlattenedNode<'a> {
    pub id: &'a str,
    /// Effective parent: `None` for roots, including tasks whose parent is
    /// not part of the projected set.
    pub parent_id: Option<&'a str>,
    pub depth: usize,
    pub task: &'a Task,
}

/// Sibling groups of a task set, sorted by position.
///
/// Cheap to rebuild; recompute whenever the tasks or the expanded set change.
pub struct TreeProjection<'a> {
    present: HashSet<&'a str>,
    roots: Vec<&'a Task>,
    children: HashMap<&'a str, Vec<&'a Task>>,
    expanded: &'a HashSet<String>,
}

impl<'a> TreeProjection<'a> {
    pub fn new(tasks: &'a [Task], expanded: &'a HashSet<String>) -> Self {
        let present: HashSet<&'a str> = tasks.iter().map(|task| task.id.as_str()).collect();
        let mut roots = Vec::new();
        let mut children: HashMap<&'a str, Vec<&'a Task>> = HashMap::new();

        for task in tasks {
            match task.parent_task_id.as_deref() {
                Some(parent) if present.contains(parent) => {
                    children.entry(parent).or_default().push(task)
                }
                _ => roots.push(task),
            }
        }

        // Stable sort: equal positions keep their input order.
        roots.sort_by(|a, b| a.position.total_cmp(&b.position));
        for group in children.values_mut() {
            group.sort_by(|a, b| a.position.total_cmp(&b.position));
        }

        Self {
            present,
            roots,
            children,
            expanded,
        }
    }

    /// Pre-order, depth-first walk that descends only into expanded tasks.
    ///
    /// Each call starts a fresh walk.
    pub fn iter(&self) -> Nodes<'_, 'a> {
        let stack = self.roots.iter().rev().map(|task| (*task, None, 0)).collect();
        Nodes {
            projection: self,
            stack,
        }
    }

    pub fn roots(&self) -> &[&'a Task] {
        &self.roots
    }

    pub fn children_of(&self, id: &str) -> &[&'a Task] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, id: &str) -> bool {
        !self.children_of(id).is_empty()
    }

    /// The sorted sibling group under `parent` (`None` for the root group).
    pub fn siblings(&self, parent: Option<&str>) -> &[&'a Task] {
        match parent {
            Some(id) => self.children_of(id),
            None => &self.roots,
        }
    }

    /// The parent a task is grouped under in this projection.
    pub fn effective_parent(&self, task: &Task) -> Option<&'a str> {
        let parent = task.parent_task_id.as_deref()?;
        self.present.get(parent).copied()
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }
}

pub struct Nodes<'p, 'a> {
    projection: &'p TreeProjection<'a>,
    stack: Vec<(&'a Task, Option<&'a str>, usize)>,
}

impl<'p, 'a> Iterator for Nodes<'p, 'a> {
    type Item = FlattenedNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (task, parent_id, depth) = self.stack.pop()?;
        let id = task.id.as_str();
        if self.projection.is_expanded(id) {
            let children = self.projection.children_of(id);
            self.stack
                .extend(children.iter().rev().map(|child| (*child, Some(id), depth + 1)));
        }
        Some(FlattenedNode {
            id,
            parent_id,
            depth,
            task,
        })
    }
}

/// Convenience wrapper collecting the visible outline.
pub fn project<'a>(tasks: &'a [Task], expanded: &'a HashSet<String>) -> Vec<FlattenedNode<'a>> {
    TreeProjection::new(tasks, expanded).iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn task(id: &str, parent: Option<&str>, position: f64) -> Task {
        let mut task = NewTask::captured(id, position).into_task("owner", Utc::now());
        task.id = id.to_string();
        task.parent_task_id = parent.map(str::to_string);
        task
    }

    fn sample() -> Vec<Task> {
        vec![
            task("b", None, 2000.0),
            task("a", None, 1000.0),
            task("a2", Some("a"), 2000.0),
            task("a1", Some("a"), 1000.0),
            task("a1x", Some("a1"), 1000.0),
            task("c", None, 3000.0),
        ]
    }

    fn rows(nodes: &[FlattenedNode<'_>]) -> Vec<(String, usize)> {
        nodes.iter().map(|n| (n.id.to_string(), n.depth)).collect()
    }

    #[test]
    fn collapsed_tree_shows_roots_in_position_order() {
        let tasks = sample();
        let expanded = HashSet::new();
        let nodes = project(&tasks, &expanded);
        assert_eq!(
            rows(&nodes),
            vec![("a".into(), 0), ("b".into(), 0), ("c".into(), 0)]
        );
    }

    #[test]
    fn expanded_nodes_emit_children_depth_first() {
        let tasks = sample();
        let expanded: HashSet<String> = ["a".to_string(), "a1".to_string()].into();
        let nodes = project(&tasks, &expanded);
        assert_eq!(
            rows(&nodes),
            vec![
                ("a".into(), 0),
                ("a1".into(), 1),
                ("a1x".into(), 2),
                ("a2".into(), 1),
                ("b".into(), 0),
                ("c".into(), 0),
            ]
        );
        assert_eq!(nodes[1].parent_id, Some("a"));
        assert_eq!(nodes[0].parent_id, None);
    }

    #[test]
    fn expanding_a_grandchild_alone_does_not_reveal_it() {
        let tasks = sample();
        let expanded: HashSet<String> = ["a1".to_string()].into();
        let nodes = project(&tasks, &expanded);
        assert!(nodes.iter().all(|n| n.id != "a1x"));
    }

    #[test]
    fn tasks_with_missing_parent_become_roots() {
        let tasks = vec![task("orphan", Some("gone"), 500.0), task("a", None, 1000.0)];
        let expanded = HashSet::new();
        let projection = TreeProjection::new(&tasks, &expanded);
        let nodes: Vec<_> = projection.iter().collect();
        assert_eq!(rows(&nodes), vec![("orphan".into(), 0), ("a".into(), 0)]);
        assert_eq!(nodes[0].parent_id, None);
        assert_eq!(projection.effective_parent(&tasks[0]), None);
    }

    #[test]
    fn walk_is_restartable_and_bounded_with_corrupt_links() {
        let tasks = vec![
            task("a", Some("b"), 1000.0),
            task("b", Some("a"), 2000.0),
            task("r", None, 1000.0),
        ];
        let expanded: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let projection = TreeProjection::new(&tasks, &expanded);
        assert_eq!(projection.iter().count(), 1);
        assert_eq!(projection.iter().count(), 1);
    }

    #[test]
    fn sibling_queries_follow_sorted_order() {
        let tasks = sample();
        let expanded = HashSet::new();
        let projection = TreeProjection::new(&tasks, &expanded);
        let ids: Vec<&str> = projection
            .siblings(Some("a"))
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert!(projection.has_children("a1"));
        assert!(!projection.has_children("c"));
        assert_eq!(projection.roots().len(), 3);
    }
}
