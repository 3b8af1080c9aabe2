//! Fractional ordering keys for sibling lists.
//!
//! Inserting or moving a task only ever writes the moved task's position,
//! except when two neighbours have run out of representable values between
//! them. In that case the whole sibling group is respaced and the insertion
//! retried against the new spacing.

use tracing::debug;

use crate::config::DEFAULT_GAP;
use crate::error::{CoreError, CoreResult};

/// Result of allocating a slot in a sibling group.
#[derive(Debug, Clone, PartialEq)]
pub enum Allocation {
    /// Only the inserted item needs a position.
    Fresh(f64),
    /// The existing siblings were respaced; `siblings[i]` is the new position
    /// for the i-th existing sibling, in the order they were given.
    Rebalanced { siblings: Vec<f64>, position: f64 },
}

impl Allocation {
    pub fn position(&self) -> f64 {
        match self {
            Allocation::Fresh(position) => *position,
            Allocation::Rebalanced { position, .. } => *position,
        }
    }

    pub fn is_rebalanced(&self) -> bool {
        matches!(self, Allocation::Rebalanced { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAllocator {
    gap: f64,
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self { gap: DEFAULT_GAP }
    }
}

impl PositionAllocator {
    pub fn new(gap: f64) -> CoreResult<Self> {
        if !gap.is_finite() || gap <= 0.0 {
            return Err(CoreError::validation(format!(
                "position gap must be a positive finite number, got {}",
                gap
            )));
        }
        Ok(Self { gap })
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Evenly spaced positions for `count` siblings: `gap, 2*gap, ...`.
    pub fn spaced(&self, count: usize) -> Vec<f64> {
        (1..=count).map(|slot| slot as f64 * self.gap).collect()
    }

    /// Position for appending after every sibling.
    pub fn append(&self, siblings: &[f64]) -> CoreResult<Allocation> {
        self.allocate(siblings, siblings.len())
    }

    /// Allocate a position so the new item sorts at `index` among `siblings`.
    ///
    /// `siblings` must be in ascending sibling order. `index == 0` inserts at
    /// the head and `index == siblings.len()` at the tail.
    pub fn allocate(&self, siblings: &[f64], index: usize) -> CoreResult<Allocation> {
        if index > siblings.len() {
            return Err(CoreError::validation(format!(
                "insertion index {} is out of range for {} siblings",
                index,
                siblings.len()
            )));
        }

        if let Some(position) = self.slot(siblings, index) {
            return Ok(Allocation::Fresh(position));
        }

        debug!(
            siblings = siblings.len(),
            index, "position precision exhausted; rebalancing sibling group"
        );
        let respaced = self.spaced(siblings.len());
        match self.slot(&respaced, index) {
            Some(position) => Ok(Allocation::Rebalanced {
                siblings: respaced,
                position,
            }),
            None => Err(CoreError::Conflict(format!(
                "no position available at index {} after rebalancing {} siblings",
                index,
                siblings.len()
            ))),
        }
    }

    /// A value strictly between the neighbours of `index`, if one exists.
    fn slot(&self, siblings: &[f64], index: usize) -> Option<f64> {
        let candidate = match (index.checked_sub(1).map(|i| siblings[i]), siblings.get(index)) {
            (None, None) => self.gap,
            (None, Some(&first)) => first - self.gap,
            (Some(last), None) => last + self.gap,
            (Some(lower), Some(&upper)) => (lower + upper) / 2.0,
        };

        let above_lower = index == 0 || siblings[index - 1] < candidate;
        let below_upper = siblings.get(index).map_or(true, |&upper| candidate < upper);
        (candidate.is_finite() && above_lower && below_upper).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&[], 0, 1000.0)]
    #[case(&[1000.0], 1, 2000.0)]
    #[case(&[1000.0, 2000.0, 3000.0], 0, 0.0)]
    #[case(&[1000.0, 2000.0, 3000.0], 3, 4000.0)]
    #[case(&[1000.0, 2000.0, 3000.0], 1, 1500.0)]
    fn allocates_without_touching_siblings(
        #[case] siblings: &[f64],
        #[case] index: usize,
        #[case] expected: f64,
    ) {
        let allocator = PositionAllocator::default();
        assert_eq!(
            allocator.allocate(siblings, index).unwrap(),
            Allocation::Fresh(expected)
        );
    }

    #[test]
    fn appends_increment_by_gap() {
        let allocator = PositionAllocator::default();
        let mut siblings = Vec::new();
        for _ in 0..3 {
            let next = allocator.append(&siblings).unwrap().position();
            siblings.push(next);
        }
        assert_eq!(siblings, vec![1000.0, 2000.0, 3000.0]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let allocator = PositionAllocator::default();
        let err = allocator.allocate(&[1000.0], 2).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_non_positive_gap() {
        assert!(PositionAllocator::new(0.0).is_err());
        assert!(PositionAllocator::new(f64::NAN).is_err());
        assert_eq!(PositionAllocator::new(10.0).unwrap().gap(), 10.0);
    }

    #[test]
    fn repeated_midpoint_insertion_eventually_rebalances() {
        let allocator = PositionAllocator::default();
        // Always insert directly after the first sibling.
        let mut siblings = vec![1000.0, 2000.0];
        let mut rebalanced_at = None;

        for round in 0..200 {
            let allocation = allocator.allocate(&siblings, 1).unwrap();
            let position = allocation.position();
            if let Allocation::Rebalanced { siblings: respaced, .. } = &allocation {
                rebalanced_at = Some(round);
                assert_eq!(respaced.len(), siblings.len());
                assert!(respaced.windows(2).all(|pair| pair[0] < pair[1]));
                siblings = respaced.clone();
            }
            siblings.insert(1, position);
            assert!(siblings.windows(2).all(|pair| pair[0] < pair[1]));
            if rebalanced_at.is_some() {
                break;
            }
        }

        assert!(rebalanced_at.is_some(), "expected a rebalance");
        let after = allocator.allocate(&siblings, 1).unwrap();
        assert!(!after.is_rebalanced());
    }

    #[test]
    fn tied_neighbours_trigger_rebalance() {
        let allocator = PositionAllocator::default();
        let allocation = allocator.allocate(&[0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(
            allocation,
            Allocation::Rebalanced {
                siblings: vec![1000.0, 2000.0, 3000.0],
                position: 2500.0,
            }
        );
    }
}
