//! Turning a drop into a committed parent/position change.
//!
//! The gesture layer only reports `{dragged, drop target, lateral offset}`;
//! everything else (mode selection, cycle checks, position allocation) is
//! decided here so it can be exercised without any pointer events.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::config::{EngineConfig, DEFAULT_NEST_THRESHOLD};
use crate::error::{CoreError, CoreResult};
use crate::hierarchy::HierarchyValidator;
use crate::model::{ReorderItem, Task};
use crate::position::{Allocation, PositionAllocator};
use crate::tree::TreeProjection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveMode {
    /// Become a sibling of the drop target.
    Reorder,
    /// Become the last child of the drop target.
    Nest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveIntent {
    pub dragged_id: String,
    /// `None` when the item was dropped outside any valid target.
    pub drop_target_id: Option<String>,
    pub lateral_offset: f64,
}

impl MoveIntent {
    pub fn new(dragged_id: impl Into<String>, drop_target_id: Option<String>, lateral_offset: f64) -> Self {
        Self {
            dragged_id: dragged_id.into(),
            drop_target_id,
            lateral_offset,
        }
    }
}

/// A fully resolved move, ready to persist as one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovePlan {
    pub task_id: String,
    pub mode: MoveMode,
    pub from_parent: Option<String>,
    pub new_parent: Option<String>,
    pub position: f64,
    /// Respaced siblings in the destination group, when precision ran out.
    pub rebalanced: Vec<ReorderItem>,
    /// Parent to expand so the moved task stays visible.
    pub expand: Option<String>,
}

impl MovePlan {
    /// Every row this move writes: respaced siblings first, then the moved task.
    pub fn updates(&self) -> Vec<ReorderItem> {
        let mut items = self.rebalanced.clone();
        items.push(ReorderItem {
            id: self.task_id.clone(),
            position: self.position,
            parent_task_id: self.new_parent.clone(),
        });
        items
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveResolution {
    Commit(MovePlan),
    /// Nothing to do; no state may be written.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct MoveResolver {
    allocator: PositionAllocator,
    nest_threshold: f64,
}

impl Default for MoveResolver {
    fn default() -> Self {
        Self::new(PositionAllocator::default(), DEFAULT_NEST_THRESHOLD)
    }
}

impl MoveResolver {
    pub fn new(allocator: PositionAllocator, nest_threshold: f64) -> Self {
        Self {
            allocator,
            nest_threshold,
        }
    }

    pub fn from_config(config: &EngineConfig) -> CoreResult<Self> {
        let allocator = PositionAllocator::new(config.gap)?;
        Ok(Self::new(allocator, config.nest_threshold))
    }

    pub fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    pub fn mode_for(&self, lateral_offset: f64) -> MoveMode {
        if lateral_offset > self.nest_threshold {
            MoveMode::Nest
        } else {
            MoveMode::Reorder
        }
    }

    /// Resolve `intent` against the currently loaded tasks.
    ///
    /// A cycle is rejected with [`CoreError::Cycle`] before anything could be
    /// persisted.
    pub fn resolve(&self, tasks: &[Task], intent: &MoveIntent) -> CoreResult<MoveResolution> {
        let no_expansion = HashSet::new();
        let projection = TreeProjection::new(tasks, &no_expansion);
        let validator = HierarchyValidator::new(tasks);

        let dragged = find(tasks, &intent.dragged_id)?;
        let Some(target_id) = intent.drop_target_id.as_deref() else {
            return Ok(MoveResolution::Cancelled);
        };
        if target_id == dragged.id {
            return Ok(MoveResolution::Cancelled);
        }
        let target = find(tasks, target_id)?;

        let mode = self.mode_for(intent.lateral_offset);
        let from_parent = projection.effective_parent(dragged).map(str::to_string);
        let new_parent = match mode {
            MoveMode::Nest => Some(target.id.as_str()),
            MoveMode::Reorder => projection.effective_parent(target),
        };

        if let Err(err) = validator.ensure_can_reparent(&dragged.id, new_parent) {
            debug!(task_id = %dragged.id, target_id, error = %err, "move rejected");
            return Err(err);
        }

        let group = projection.siblings(new_parent);
        let siblings: Vec<&Task> = group.iter().copied().filter(|t| t.id != dragged.id).collect();
        let index = match mode {
            MoveMode::Nest => siblings.len(),
            MoveMode::Reorder => {
                let target_index = siblings
                    .iter()
                    .position(|t| t.id == target.id)
                    .unwrap_or(siblings.len());
                // Moving down within the same group lands after the target.
                let original = |id: &str| group.iter().position(|t| t.id == id);
                match (original(&dragged.id), original(&target.id)) {
                    (Some(from), Some(to)) if from < to => target_index + 1,
                    _ => target_index,
                }
            }
        };

        let positions: Vec<f64> = siblings.iter().map(|t| t.position).collect();
        let allocation = self.allocator.allocate(&positions, index)?;
        let rebalanced = match &allocation {
            Allocation::Fresh(_) => Vec::new(),
            Allocation::Rebalanced { siblings: respaced, .. } => siblings
                .iter()
                .zip(respaced)
                .map(|(task, position)| ReorderItem {
                    id: task.id.clone(),
                    position: *position,
                    parent_task_id: new_parent.map(str::to_string),
                })
                .collect(),
        };

        let plan = MovePlan {
            task_id: dragged.id.clone(),
            mode,
            from_parent,
            new_parent: new_parent.map(str::to_string),
            position: allocation.position(),
            rebalanced,
            expand: match mode {
                MoveMode::Nest => Some(target.id.clone()),
                MoveMode::Reorder => None,
            },
        };
        debug!(
            task_id = %plan.task_id,
            mode = ?plan.mode,
            position = plan.position,
            rebalanced = plan.rebalanced.len(),
            "move resolved"
        );
        Ok(MoveResolution::Commit(plan))
    }
}

fn find<'a>(tasks: &'a [Task], id: &str) -> CoreResult<&'a Task> {
    tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or_else(|| CoreError::task_not_found(id))
}

/// In-progress drag, fed by whatever gesture layer the client has.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MoveGesture {
    #[default]
    Idle,
    Dragging {
        dragged_id: String,
        over_id: Option<String>,
        lateral_offset: f64,
    },
}

impl MoveGesture {
    pub fn start(&mut self, dragged_id: impl Into<String>) {
        *self = MoveGesture::Dragging {
            dragged_id: dragged_id.into(),
            over_id: None,
            lateral_offset: 0.0,
        };
    }

    pub fn hover(&mut self, over: Option<String>, offset: f64) {
        if let MoveGesture::Dragging {
            over_id,
            lateral_offset,
            ..
        } = self
        {
            *over_id = over;
            *lateral_offset = offset;
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, MoveGesture::Dragging { .. })
    }

    /// Mode the drop would currently resolve to, for drop indicators.
    pub fn preview(&self, resolver: &MoveResolver) -> Option<MoveMode> {
        match self {
            MoveGesture::Dragging {
                over_id: Some(_),
                lateral_offset,
                ..
            } => Some(resolver.mode_for(*lateral_offset)),
            _ => None,
        }
    }

    /// Finish the drag, producing the intent for the resolver.
    pub fn drop(&mut self) -> Option<MoveIntent> {
        match std::mem::take(self) {
            MoveGesture::Dragging {
                dragged_id,
                over_id,
                lateral_offset,
            } => Some(MoveIntent {
                dragged_id,
                drop_target_id: over_id,
                lateral_offset,
            }),
            MoveGesture::Idle => None,
        }
    }

    pub fn cancel(&mut self) {
        *self = MoveGesture::Idle;
    }
}
