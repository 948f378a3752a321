//! Axis-aligned regions used both as element geometry and constraint zones.

use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};
use crate::geometry::{check_axes, check_finite};

/// Tolerance for the containment and intersection predicates. Cell edges
/// come out of repeated division and multiplication, so exact comparisons
/// would flag one-ulp overlaps between cells laid edge to edge.
const EPSILON: f64 = 1e-6;

/// An axis-aligned region: an origin corner plus an extent per axis.
///
/// Works over 2 or 3 axes uniformly. Regions that merely share an edge do
/// not count as intersecting; layout cells are laid edge to edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Minimum corner per axis.
    pub origin: Vec<f64>,
    /// Length per axis, non-negative.
    pub extent: Vec<f64>,
}

impl Region {
    /// Create a region, validating shape and values.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] if the axis counts differ, any
    /// value is non-finite, or an extent is negative.
    pub fn new(origin: Vec<f64>, extent: Vec<f64>) -> CanvasResult<Self> {
        check_axes(&origin, &extent)?;
        check_finite(&origin)?;
        check_finite(&extent)?;
        if extent.iter().any(|e| *e < 0.0) {
            return Err(CanvasError::Validation(
                "region extent must be non-negative".to_string(),
            ));
        }
        Ok(Self { origin, extent })
    }

    /// Convenience constructor for a 2-axis region.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on non-finite or negative input.
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> CanvasResult<Self> {
        Self::new(vec![x, y], vec![width, height])
    }

    /// Number of axes.
    #[must_use]
    pub fn axes(&self) -> usize {
        self.origin.len()
    }

    /// Maximum corner per axis.
    #[must_use]
    pub fn max_corner(&self) -> Vec<f64> {
        self.origin
            .iter()
            .zip(&self.extent)
            .map(|(o, e)| o + e)
            .collect()
    }

    /// Midpoint per axis.
    #[must_use]
    pub fn center(&self) -> Vec<f64> {
        self.origin
            .iter()
            .zip(&self.extent)
            .map(|(o, e)| o + e / 2.0)
            .collect()
    }

    /// Product of extents (area in 2D, volume in 3D).
    #[must_use]
    pub fn area(&self) -> f64 {
        self.extent.iter().product()
    }

    /// Whether the two regions overlap with positive area on every axis.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch.
    pub fn intersects(&self, other: &Self) -> CanvasResult<bool> {
        check_axes(&self.origin, &other.origin)?;
        let a_max = self.max_corner();
        let b_max = other.max_corner();
        Ok(self
            .origin
            .iter()
            .zip(&other.origin)
            .zip(a_max.iter().zip(&b_max))
            .all(|((a_min, b_min), (a_max, b_max))| {
                *a_min + EPSILON < *b_max && *b_min + EPSILON < *a_max
            }))
    }

    /// The overlapping region, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch.
    pub fn intersection(&self, other: &Self) -> CanvasResult<Option<Self>> {
        if !self.intersects(other)? {
            return Ok(None);
        }
        let a_max = self.max_corner();
        let b_max = other.max_corner();
        let origin: Vec<f64> = self
            .origin
            .iter()
            .zip(&other.origin)
            .map(|(a, b)| a.max(*b))
            .collect();
        let extent: Vec<f64> = a_max
            .iter()
            .zip(&b_max)
            .zip(&origin)
            .map(|((a, b), o)| a.min(*b) - o)
            .collect();
        Ok(Some(Self { origin, extent }))
    }

    /// Whether a point lies within this region (inclusive of edges).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch.
    pub fn contains_point(&self, point: &[f64]) -> CanvasResult<bool> {
        check_axes(&self.origin, point)?;
        let max = self.max_corner();
        Ok(self
            .origin
            .iter()
            .zip(point)
            .zip(&max)
            .all(|((min, p), max)| *p >= *min - EPSILON && *p <= *max + EPSILON))
    }

    /// Whether `other` lies entirely within this region.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch.
    pub fn contains_region(&self, other: &Self) -> CanvasResult<bool> {
        check_axes(&self.origin, &other.origin)?;
        let a_max = self.max_corner();
        let b_max = other.max_corner();
        Ok(self
            .origin
            .iter()
            .zip(&other.origin)
            .all(|(a, b)| *b >= *a - EPSILON)
            && b_max.iter().zip(&a_max).all(|(b, a)| *b <= *a + EPSILON))
    }

    /// This region translated elementwise by `delta`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch or
    /// non-finite delta.
    pub fn translated(&self, delta: &[f64]) -> CanvasResult<Self> {
        check_axes(&self.origin, delta)?;
        check_finite(delta)?;
        Ok(Self {
            origin: self
                .origin
                .iter()
                .zip(delta)
                .map(|(o, d)| o + d)
                .collect(),
            extent: self.extent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Region {
        Region::rect(x, y, w, h).expect("valid rect")
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(Region::new(vec![0.0, 0.0], vec![10.0]).is_err());
        assert!(Region::new(vec![0.0, f64::NAN], vec![10.0, 10.0]).is_err());
        assert!(Region::new(vec![0.0, 0.0], vec![-1.0, 10.0]).is_err());
    }

    #[test]
    fn test_intersects() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(50.0, 50.0, 100.0, 100.0);
        let c = rect(200.0, 200.0, 10.0, 10.0);
        assert!(a.intersects(&b).expect("same axes"));
        assert!(!a.intersects(&c).expect("same axes"));
    }

    #[test]
    fn test_shared_edge_does_not_intersect() {
        let left = rect(0.0, 0.0, 640.0, 800.0);
        let right = rect(640.0, 0.0, 640.0, 800.0);
        assert!(!left.intersects(&right).expect("same axes"));
    }

    #[test]
    fn test_intersection_area() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(50.0, 50.0, 100.0, 100.0);
        let overlap = a.intersection(&b).expect("same axes").expect("overlaps");
        assert_eq!(overlap, rect(50.0, 50.0, 50.0, 50.0));
        assert!((overlap.area() - 2500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contains() {
        let outer = rect(0.0, 0.0, 100.0, 100.0);
        let inner = rect(10.0, 10.0, 50.0, 50.0);
        assert!(outer.contains_region(&inner).expect("same axes"));
        assert!(!inner.contains_region(&outer).expect("same axes"));
        assert!(outer.contains_point(&[100.0, 100.0]).expect("same axes"));
        assert!(!outer.contains_point(&[100.1, 0.0]).expect("same axes"));
    }

    #[test]
    fn test_three_axis_volume() {
        let a = Region::new(vec![0.0, 0.0, 0.0], vec![2.0, 3.0, 4.0]).expect("valid");
        let b = Region::new(vec![1.0, 1.0, 1.0], vec![4.0, 4.0, 4.0]).expect("valid");
        assert!((a.area() - 24.0).abs() < f64::EPSILON);
        let overlap = a.intersection(&b).expect("same axes").expect("overlaps");
        assert_eq!(overlap.extent, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_axis_mismatch_fails() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = Region::new(vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]).expect("valid");
        assert!(a.intersects(&b).is_err());
        assert!(a.contains_point(&[1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_translated() {
        let a = rect(10.0, 10.0, 5.0, 5.0);
        let moved = a.translated(&[-10.0, 30.0]).expect("should translate");
        assert_eq!(moved, rect(0.0, 40.0, 5.0, 5.0));
    }
}
