//! Constraint zones and the pure evaluator the planner ranks placements with.
//!
//! Constraints are canvas-wide and persist across element mutations. The
//! evaluator is deterministic: identical inputs always produce identical
//! violation sets and scores.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CanvasResult;
use crate::region::Region;

/// Score penalty per unit of reserved-region overlap.
const RESERVED_WEIGHT: f64 = 1_000.0;
/// Score penalty per unit of avoid-region overlap.
const AVOID_WEIGHT: f64 = 10.0;
/// Score reward per unit of preferred-region overlap.
const PREFERRED_WEIGHT: f64 = 10.0;

/// Unique identifier for a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintId(Uuid);

impl ConstraintId {
    /// Create a new unique constraint ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConstraintId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a constraint zone means to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    /// Elements must never overlap this zone (e.g. a system menu bar).
    Reserved,
    /// Elements should stay out of this zone when possible.
    Avoid,
    /// Elements should favor this zone.
    Preferred,
    /// Substrate-specific semantics, ignored by the evaluator.
    Custom,
}

/// A canvas-wide constraint zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Unique identifier.
    pub id: ConstraintId,
    /// What this zone means.
    pub kind: ConstraintKind,
    /// The zone itself.
    pub region: Region,
    /// Relative weight; higher-priority constraints dominate the score.
    pub priority: u32,
    /// Human-readable note for diagnostics.
    pub description: String,
}

impl Constraint {
    /// Create a constraint with priority 1 and no description.
    #[must_use]
    pub fn new(kind: ConstraintKind, region: Region) -> Self {
        Self {
            id: ConstraintId::new(),
            kind,
            region,
            priority: 1,
            description: String::new(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Every `Reserved` or `Avoid` constraint the candidate region overlaps.
///
/// # Errors
///
/// Returns [`crate::CanvasError::Validation`] on axis-count mismatch
/// between the candidate and a constraint zone.
pub fn violations(candidate: &Region, constraints: &[Constraint]) -> CanvasResult<Vec<ConstraintId>> {
    let mut out = Vec::new();
    for constraint in constraints {
        if matches!(
            constraint.kind,
            ConstraintKind::Reserved | ConstraintKind::Avoid
        ) && candidate.intersects(&constraint.region)?
        {
            out.push(constraint.id);
        }
    }
    Ok(out)
}

/// Only the `Reserved` constraints the candidate overlaps.
///
/// # Errors
///
/// Returns [`crate::CanvasError::Validation`] on axis-count mismatch.
pub fn reserved_violations(
    candidate: &Region,
    constraints: &[Constraint],
) -> CanvasResult<Vec<ConstraintId>> {
    let mut out = Vec::new();
    for constraint in constraints {
        if constraint.kind == ConstraintKind::Reserved
            && candidate.intersects(&constraint.region)?
        {
            out.push(constraint.id);
        }
    }
    Ok(out)
}

/// Rank a candidate placement; higher is better.
///
/// Preferred overlap raises the score, avoid overlap lowers it, reserved
/// overlap lowers it hard. Each contribution is weighted by the constraint
/// priority and the fraction of the candidate covered by the zone.
///
/// # Errors
///
/// Returns [`crate::CanvasError::Validation`] on axis-count mismatch.
pub fn score(candidate: &Region, constraints: &[Constraint]) -> CanvasResult<f64> {
    let candidate_area = candidate.area();
    if candidate_area <= 0.0 {
        return Ok(f64::from(i32::MIN));
    }
    let mut total = 0.0;
    for constraint in constraints {
        let Some(overlap) = candidate.intersection(&constraint.region)? else {
            continue;
        };
        let fraction = overlap.area() / candidate_area;
        let weight = f64::from(constraint.priority.max(1));
        total += match constraint.kind {
            ConstraintKind::Reserved => -RESERVED_WEIGHT * weight * fraction,
            ConstraintKind::Avoid => -AVOID_WEIGHT * weight * fraction,
            ConstraintKind::Preferred => PREFERRED_WEIGHT * weight * fraction,
            ConstraintKind::Custom => 0.0,
        };
    }
    Ok(total)
}

/// The boundary minus padding claimed by edge-flush reserved and preferred
/// zones.
///
/// A zone pads the usable area when it spans the boundary's full width (or
/// height) and sits flush against one edge, the shape of a menu bar or
/// dock. Interior zones do not shrink the usable area; the planner routes
/// around those per cell instead.
///
/// # Errors
///
/// Returns [`crate::CanvasError::Validation`] on axis-count mismatch.
pub fn usable_area(boundary: &Region, constraints: &[Constraint]) -> CanvasResult<Region> {
    let axes = boundary.axes();
    let mut min = boundary.origin.clone();
    let mut max = boundary.max_corner();

    for constraint in constraints {
        if !matches!(
            constraint.kind,
            ConstraintKind::Reserved | ConstraintKind::Preferred
        ) {
            continue;
        }
        let Some(overlap) = boundary.intersection(&constraint.region)? else {
            continue;
        };
        let overlap_max = overlap.max_corner();
        for axis in 0..axes {
            // A strip pads along `axis` only if it spans the full usable
            // cross-section on every other axis.
            let spans_cross = (0..axes).all(|other| {
                other == axis
                    || (overlap.origin[other] <= min[other]
                        && overlap_max[other] >= max[other])
            });
            if !spans_cross {
                continue;
            }
            if overlap.origin[axis] <= min[axis] && overlap_max[axis] > min[axis] {
                min[axis] = min[axis].max(overlap_max[axis]);
            }
            if overlap_max[axis] >= max[axis] && overlap.origin[axis] < max[axis] {
                max[axis] = max[axis].min(overlap.origin[axis]);
            }
        }
    }

    let extent: Vec<f64> = min
        .iter()
        .zip(&max)
        .map(|(lo, hi)| (hi - lo).max(0.0))
        .collect();
    Region::new(min, extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Region {
        Region::rect(x, y, w, h).expect("valid rect")
    }

    fn menu_bar() -> Constraint {
        Constraint::new(ConstraintKind::Reserved, rect(0.0, 0.0, 1280.0, 40.0))
            .with_description("system menu bar")
    }

    #[test]
    fn test_violations_reserved_and_avoid() {
        let constraints = vec![
            menu_bar(),
            Constraint::new(ConstraintKind::Avoid, rect(0.0, 700.0, 1280.0, 100.0)),
            Constraint::new(ConstraintKind::Preferred, rect(0.0, 0.0, 1280.0, 800.0)),
        ];

        let candidate = rect(0.0, 20.0, 100.0, 100.0);
        let hits = violations(&candidate, &constraints).expect("same axes");
        assert_eq!(hits, vec![constraints[0].id]);

        let candidate = rect(0.0, 650.0, 100.0, 100.0);
        let hits = violations(&candidate, &constraints).expect("same axes");
        assert_eq!(hits, vec![constraints[1].id]);

        // Preferred zones never show up as violations.
        let candidate = rect(0.0, 100.0, 100.0, 100.0);
        assert!(violations(&candidate, &constraints)
            .expect("same axes")
            .is_empty());
    }

    #[test]
    fn test_score_orders_candidates() {
        let constraints = vec![
            Constraint::new(ConstraintKind::Preferred, rect(0.0, 0.0, 400.0, 400.0)),
            Constraint::new(ConstraintKind::Avoid, rect(800.0, 0.0, 400.0, 400.0)),
        ];

        let preferred = score(&rect(0.0, 0.0, 200.0, 200.0), &constraints).expect("same axes");
        let neutral = score(&rect(400.0, 400.0, 200.0, 200.0), &constraints).expect("same axes");
        let avoided = score(&rect(800.0, 0.0, 200.0, 200.0), &constraints).expect("same axes");

        assert!(preferred > neutral);
        assert!(neutral > avoided);
    }

    #[test]
    fn test_score_is_deterministic() {
        let constraints = vec![
            menu_bar(),
            Constraint::new(ConstraintKind::Avoid, rect(100.0, 100.0, 300.0, 300.0)),
        ];
        let candidate = rect(50.0, 20.0, 200.0, 200.0);
        let first = score(&candidate, &constraints).expect("same axes");
        let second = score(&candidate, &constraints).expect("same axes");
        assert!((first - second).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reserved_dominates_score() {
        let constraints = vec![menu_bar()];
        let touching = score(&rect(0.0, 0.0, 100.0, 80.0), &constraints).expect("same axes");
        let clear = score(&rect(0.0, 40.0, 100.0, 80.0), &constraints).expect("same axes");
        assert!(touching < -100.0);
        assert!(clear.abs() < f64::EPSILON);
    }

    #[test]
    fn test_usable_area_menu_bar() {
        let boundary = rect(0.0, 0.0, 1280.0, 800.0);
        let usable = usable_area(&boundary, &[menu_bar()]).expect("same axes");
        assert_eq!(usable, rect(0.0, 40.0, 1280.0, 760.0));
    }

    #[test]
    fn test_usable_area_dock_and_bar() {
        let boundary = rect(0.0, 0.0, 1280.0, 800.0);
        let constraints = vec![
            menu_bar(),
            Constraint::new(ConstraintKind::Preferred, rect(0.0, 720.0, 1280.0, 80.0))
                .with_description("dock"),
        ];
        let usable = usable_area(&boundary, &constraints).expect("same axes");
        assert_eq!(usable, rect(0.0, 40.0, 1280.0, 680.0));
    }

    #[test]
    fn test_interior_zone_does_not_pad() {
        let boundary = rect(0.0, 0.0, 1280.0, 800.0);
        let constraints = vec![Constraint::new(
            ConstraintKind::Reserved,
            rect(500.0, 300.0, 100.0, 100.0),
        )];
        let usable = usable_area(&boundary, &constraints).expect("same axes");
        assert_eq!(usable, boundary);
    }

    #[test]
    fn test_usable_area_three_axes() {
        let boundary = Region::new(vec![0.0, 0.0, 0.0], vec![10.0, 10.0, 10.0]).expect("valid");
        let slab = Constraint::new(
            ConstraintKind::Reserved,
            Region::new(vec![0.0, 0.0, 0.0], vec![10.0, 2.0, 10.0]).expect("valid"),
        );
        let usable = usable_area(&boundary, &[slab]).expect("same axes");
        assert_eq!(usable.origin, vec![0.0, 2.0, 0.0]);
        assert_eq!(usable.extent, vec![10.0, 8.0, 10.0]);
    }
}
