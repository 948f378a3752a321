//! Deterministic layout planning for an arbitrary number of elements.
//!
//! The planner is a pure function: given the boundary, the constraint set
//! and the ordered list of elements that must remain present after a
//! change, it produces a region for every element. The rule table, in
//! priority order:
//!
//! 1 element  - the full usable area.
//! 2 elements - side-by-side halves; a configured default width takes over
//!              when the boundary is too narrow, tolerating overflow.
//! 3 elements - the primary spans the full-width top half, the other two
//!              share the bottom half.
//! 4+         - the smallest square-ish grid, cells filled in creation
//!              order, row-major.
//!
//! Cells that land on a reserved zone are repaired by clipping within the
//! cell, ranked by the constraint evaluator's score. When no candidate
//! clears every reserved zone the planner reports the layout infeasible
//! instead of emitting overlapping or out-of-bounds transforms.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::constraint::{reserved_violations, score, usable_area, Constraint, ConstraintKind};
use crate::element::ElementId;
use crate::error::{CanvasError, CanvasResult};
use crate::region::Region;

/// Placement preference carried on create requests.
///
/// A `Primary` hint makes the element the layout's primary regardless of
/// creation order; a `Sidebar` hint pushes it toward the supporting slots.
/// Hints bias slot assignment only and never override constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotHint {
    /// No preference; creation order decides.
    #[default]
    Auto,
    /// Prefer the main slot.
    Primary,
    /// Prefer a supporting slot.
    Sidebar,
}

/// One element the planner must place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// The element to place.
    pub id: ElementId,
    /// Creation time in milliseconds since epoch; earlier wins the
    /// earlier slot. Ties fall back to list order.
    pub created_at: u64,
    /// Placement preference.
    pub slot: SlotHint,
}

/// A planned region for one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// The element this region is for.
    pub id: ElementId,
    /// Where the element goes, in absolute pixels.
    pub region: Region,
    /// Whether the region extends past the boundary (narrow-boundary
    /// overflow tolerance).
    pub overflows: bool,
}

/// The planner's output: one placement per input entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    /// Placements, in the same order as the input entries.
    pub placements: Vec<Placement>,
}

impl LayoutPlan {
    /// Look up the placement for an element.
    #[must_use]
    pub fn placement(&self, id: ElementId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.id == id)
    }
}

/// Computes deterministic multi-element arrangements.
#[derive(Debug, Clone)]
pub struct LayoutPlanner {
    default_width: f64,
    min_score: f64,
}

impl LayoutPlanner {
    /// Create a planner from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_width: config.default_element_width,
            min_score: config.min_placement_score,
        }
    }

    /// Produce a region for every entry.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayoutInfeasible`] when no arrangement clears
    /// every reserved zone, and [`CanvasError::Validation`] on axis-count
    /// mismatches between boundary and constraints.
    pub fn plan(
        &self,
        boundary: &Region,
        constraints: &[Constraint],
        entries: &[LayoutEntry],
    ) -> CanvasResult<LayoutPlan> {
        if entries.is_empty() {
            return Ok(LayoutPlan::default());
        }

        let usable = usable_area(boundary, constraints)?;
        if usable.area() <= 0.0 {
            return Err(CanvasError::LayoutInfeasible(
                "constraints leave no usable area".to_string(),
            ));
        }

        // Slot order: primary hints first, sidebar hints last, then
        // creation time, then list order for identical timestamps.
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| {
            let rank = match entries[i].slot {
                SlotHint::Primary => 0_u8,
                SlotHint::Auto => 1,
                SlotHint::Sidebar => 2,
            };
            (rank, entries[i].created_at, i)
        });

        let cells = self.cells(&usable, entries.len());

        let mut placements = vec![None; entries.len()];
        for (slot, &entry_index) in order.iter().enumerate() {
            let cell = &cells[slot];
            let region = repair_cell(cell, constraints)?;
            let placed_score = score(&region, constraints)?;
            if placed_score < self.min_score {
                return Err(CanvasError::LayoutInfeasible(format!(
                    "best placement for slot {slot} scores {placed_score:.1}, below minimum"
                )));
            }
            let overflows = !boundary.contains_region(&region)?;
            placements[entry_index] = Some(Placement {
                id: entries[entry_index].id,
                region,
                overflows,
            });
        }

        Ok(LayoutPlan {
            placements: placements.into_iter().flatten().collect(),
        })
    }

    /// The target cells for `n` elements, in slot order. Cells are computed
    /// over the first two axes; any further axes pass through the usable
    /// area unchanged.
    fn cells(&self, usable: &Region, n: usize) -> Vec<Region> {
        let x = usable.origin[0];
        let width = usable.extent[0];
        let (y, height) = if usable.axes() > 1 {
            (usable.origin[1], usable.extent[1])
        } else {
            (0.0, 0.0)
        };

        let cell = |cx: f64, cy: f64, cw: f64, ch: f64| -> Region {
            let mut origin = usable.origin.clone();
            let mut extent = usable.extent.clone();
            origin[0] = cx;
            extent[0] = cw;
            if usable.axes() > 1 {
                origin[1] = cy;
                extent[1] = ch;
            }
            Region { origin, extent }
        };

        match n {
            0 => Vec::new(),
            1 => vec![usable.clone()],
            2 => {
                let w = if width >= 2.0 * self.default_width {
                    width / 2.0
                } else {
                    self.default_width
                };
                vec![cell(x, y, w, height), cell(x + w, y, w, height)]
            }
            3 => {
                let half = height / 2.0;
                vec![
                    cell(x, y, width, half),
                    cell(x, y + half, width / 2.0, half),
                    cell(x + width / 2.0, y + half, width / 2.0, half),
                ]
            }
            n => {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let cols = (n as f64).sqrt().ceil() as usize;
                let rows = n.div_ceil(cols);
                #[allow(clippy::cast_precision_loss)]
                let (cw, ch) = (width / cols as f64, height / rows as f64);
                (0..n)
                    .map(|i| {
                        #[allow(clippy::cast_precision_loss)]
                        let (col, row) = ((i % cols) as f64, (i / cols) as f64);
                        cell(x + col * cw, y + row * ch, cw, ch)
                    })
                    .collect()
            }
        }
    }
}

/// Clear a cell of reserved zones by clipping, keeping the best-scoring
/// candidate. Candidates never leave the original cell, so disjoint cells
/// stay disjoint after repair.
fn repair_cell(cell: &Region, constraints: &[Constraint]) -> CanvasResult<Region> {
    if reserved_violations(cell, constraints)?.is_empty() {
        return Ok(cell.clone());
    }

    let mut best: Option<(f64, f64, Region)> = None;
    for constraint in constraints {
        if constraint.kind != ConstraintKind::Reserved {
            continue;
        }
        let Some(overlap) = cell.intersection(&constraint.region)? else {
            continue;
        };
        let overlap_max = overlap.max_corner();
        let cell_max = cell.max_corner();
        for axis in 0..cell.axes().min(2) {
            // The slice of the cell before the zone, and the slice after.
            let mut before = cell.clone();
            before.extent[axis] = overlap.origin[axis] - cell.origin[axis];
            let mut after = cell.clone();
            after.origin[axis] = overlap_max[axis];
            after.extent[axis] = cell_max[axis] - overlap_max[axis];

            for candidate in [before, after] {
                if candidate.extent.iter().any(|e| *e <= 0.0) {
                    continue;
                }
                if !reserved_violations(&candidate, constraints)?.is_empty() {
                    continue;
                }
                let candidate_score = score(&candidate, constraints)?;
                let candidate_area = candidate.area();
                let better = match &best {
                    None => true,
                    Some((s, a, _)) => {
                        candidate_score > *s
                            || ((candidate_score - s).abs() < f64::EPSILON && candidate_area > *a)
                    }
                };
                if better {
                    best = Some((candidate_score, candidate_area, candidate));
                }
            }
        }
    }

    best.map(|(_, _, region)| region).ok_or_else(|| {
        CanvasError::LayoutInfeasible(
            "cell cannot be cleared of reserved zones".to_string(),
        )
    })
}
