//! Lineage merging for forked entities
//!
//! A forked run continues the history of its parent from a fork step. The
//! fork step is the last step taken from the parent (inclusive), so when
//! parent and child both logged at exactly that step the parent's point is
//! kept.
//!
//! Walking the chain from the leaf back to the root, each link contributes
//! its own points in `(forked_at, bound]`, where `bound` is the smallest fork
//! step of any descendant (`+inf` for the leaf) and the root's lower end is
//! open.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::EntityId;
use crate::series::SeriesPoint;
use crate::{Error, Result};

/// One entity of a lineage chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageLink {
    /// Entity in the chain
    pub entity: EntityId,
    /// Last step taken from the parent; `None` for the root
    pub forked_at: Option<f64>,
}

impl LineageLink {
    /// Root link (no parent).
    #[must_use]
    pub fn root(entity: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            forked_at: None,
        }
    }

    /// Link forked from the previous link at `step`.
    #[must_use]
    pub fn forked(entity: impl Into<EntityId>, step: f64) -> Self {
        Self {
            entity: entity.into(),
            forked_at: Some(step),
        }
    }
}

/// Ancestor chain of one entity, ordered root first and ending at the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// The queried (leaf) entity
    pub entity: EntityId,
    /// Chain from the root to `entity`
    pub links: Vec<LineageLink>,
}

impl Lineage {
    /// Lineage of an entity that was never forked.
    #[must_use]
    pub fn unforked(entity: EntityId) -> Self {
        Self {
            links: vec![LineageLink {
                entity: entity.clone(),
                forked_at: None,
            }],
            entity,
        }
    }

    /// Whether the entity has ancestors.
    #[must_use]
    pub fn is_forked(&self) -> bool {
        self.links.len() > 1
    }

    /// Check the chain shape returned by the service.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if the chain is empty, does not end at the
    /// queried entity, or has a non-root link without a fork step.
    pub fn validate(&self) -> Result<()> {
        let Some(last) = self.links.last() else {
            return Err(Error::UnexpectedResponse(format!(
                "empty lineage for '{}'",
                self.entity
            )));
        };
        if last.entity != self.entity {
            return Err(Error::UnexpectedResponse(format!(
                "lineage of '{}' ends at '{}'",
                self.entity, last.entity
            )));
        }
        if let Some(link) = self.links.iter().skip(1).find(|l| l.forked_at.is_none()) {
            return Err(Error::UnexpectedResponse(format!(
                "lineage of '{}': '{}' has no fork step",
                self.entity, link.entity
            )));
        }
        Ok(())
    }
}

fn step_order<V>(a: &SeriesPoint<V>, b: &SeriesPoint<V>) -> Ordering {
    a.step.total_cmp(&b.step)
}

/// Sort by step and drop repeated steps (first occurrence wins).
pub fn normalize<V>(mut points: Vec<SeriesPoint<V>>) -> Vec<SeriesPoint<V>> {
    points.sort_by(step_order);
    points.dedup_by(|later, earlier| later.step == earlier.step);
    points
}

/// Stitch one series across a lineage chain.
///
/// `points` maps every entity of the chain to its own logged points (any
/// order). Entities missing from the map contribute nothing.
///
/// # Errors
///
/// Returns `UnexpectedResponse` for a malformed chain (see [`Lineage::validate`]).
pub fn merge<V: Clone>(
    lineage: &Lineage,
    points: &FxHashMap<EntityId, Vec<SeriesPoint<V>>>,
) -> Result<Vec<SeriesPoint<V>>> {
    if let Err(err) = lineage.validate() {
        warn!(entity = %lineage.entity, error = %err, "inconsistent lineage");
        return Err(err);
    }

    let mut segments = Vec::with_capacity(lineage.links.len());
    let mut upper = f64::INFINITY;

    for (i, link) in lineage.links.iter().enumerate().rev() {
        let lower = if i == 0 {
            f64::NEG_INFINITY
        } else {
            link.forked_at.unwrap_or(f64::NEG_INFINITY)
        };

        let own = points
            .get(&link.entity)
            .map(|p| normalize(p.clone()))
            .unwrap_or_default();
        segments.push(
            own.into_iter()
                .filter(|p| p.step > lower && p.step <= upper)
                .collect::<Vec<_>>(),
        );
        upper = upper.min(lower);
    }

    Ok(segments.into_iter().rev().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(steps: &[(f64, f64)]) -> Vec<SeriesPoint<f64>> {
        steps.iter().map(|&(s, v)| SeriesPoint::new(s, v)).collect()
    }

    fn steps_values(points: &[SeriesPoint<f64>]) -> Vec<(f64, f64)> {
        points.iter().map(|p| (p.step, p.value)).collect()
    }

    #[test]
    fn test_unforked_chain_returns_own_series() {
        let id = EntityId::new("run-1");
        let own = pts(&[(1.0, 0.5), (2.0, 0.4), (3.0, 0.3)]);
        let mut map = FxHashMap::default();
        map.insert(id.clone(), own.clone());
        let merged = merge(&Lineage::unforked(id), &map).unwrap();
        assert_eq!(merged, own);
    }

    #[test]
    fn test_ancestor_wins_at_fork_step() {
        let lineage = Lineage {
            entity: EntityId::new("child"),
            links: vec![LineageLink::root("parent"), LineageLink::forked("child", 3.0)],
        };
        let mut map = FxHashMap::default();
        map.insert(EntityId::new("parent"), pts(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]));
        map.insert(EntityId::new("child"), pts(&[(3.0, 30.0), (4.0, 40.0), (5.0, 50.0)]));

        let merged = merge(&lineage, &map).unwrap();
        assert_eq!(
            steps_values(&merged),
            vec![(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 40.0), (5.0, 50.0)]
        );
    }

    #[test]
    fn test_grandchild_bound_is_smallest_descendant_fork() {
        // grandchild forks from child before child's own fork point from root
        let lineage = Lineage {
            entity: EntityId::new("c"),
            links: vec![
                LineageLink::root("a"),
                LineageLink::forked("b", 5.0),
                LineageLink::forked("c", 3.0),
            ],
        };
        let mut map = FxHashMap::default();
        map.insert(EntityId::new("a"), pts(&[(1.0, 1.0), (4.0, 4.0), (5.0, 5.0)]));
        map.insert(EntityId::new("b"), pts(&[(6.0, 6.0)]));
        map.insert(EntityId::new("c"), pts(&[(3.5, 35.0)]));

        let merged = merge(&lineage, &map).unwrap();
        assert_eq!(steps_values(&merged), vec![(1.0, 1.0), (3.5, 35.0)]);
    }

    #[test]
    fn test_malformed_chains_rejected() {
        let map: FxHashMap<EntityId, Vec<SeriesPoint<f64>>> = FxHashMap::default();
        let wrong_leaf = Lineage {
            entity: EntityId::new("x"),
            links: vec![LineageLink::root("y")],
        };
        assert!(matches!(merge(&wrong_leaf, &map), Err(Error::UnexpectedResponse(_))));

        let missing_fork = Lineage {
            entity: EntityId::new("x"),
            links: vec![LineageLink::root("y"), LineageLink::root("x")],
        };
        assert!(matches!(merge(&missing_fork, &map), Err(Error::UnexpectedResponse(_))));
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let out = normalize(pts(&[(2.0, 2.0), (1.0, 1.0), (2.0, 9.0)]));
        assert_eq!(out.len(), 2);
        assert!(out[0].step < out[1].step);
    }
}
