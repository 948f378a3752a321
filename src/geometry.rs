//! Unit-aware, dimension-agnostic geometry primitives.
//!
//! Coordinates are arrays rather than fixed x/y fields so the same model
//! covers a 2-axis desktop substrate and a 3-axis spatial one. Every
//! operation works elementwise over the coordinate array and fails with
//! [`CanvasError::Validation`] when the axis counts disagree.

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::error::{CanvasError, CanvasResult};

/// Measurement unit carried by every position and extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Device pixels.
    Pixels,
    /// Physical meters (spatial substrates).
    Meters,
    /// Percentage of a reference boundary (0.0 to 100.0).
    Percent,
    /// Fraction of a reference boundary (0.0 to 1.0).
    Viewport,
}

/// Named anchor points on a boundary or element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorPoint {
    /// Minimum corner on every axis.
    TopLeft,
    /// Maximum on the first axis, minimum on the rest.
    TopRight,
    /// Minimum on the first axis, maximum on the second.
    BottomLeft,
    /// Maximum corner on the first two axes.
    BottomRight,
    /// Midpoint on every axis.
    Center,
}

/// How a position's coordinates are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "to")]
#[serde(rename_all = "lowercase")]
pub enum RefMode {
    /// Coordinates are absolute within the canvas boundary.
    Absolute,
    /// Coordinates are an offset from another element's origin.
    Relative(ElementId),
    /// Coordinates are an offset from a named boundary anchor.
    Anchor(AnchorPoint),
}

/// A position with explicit unit and reference mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Coordinate per axis (2 or 3 entries).
    pub coords: Vec<f64>,
    /// Unit the coordinates are expressed in.
    pub unit: Unit,
    /// How the coordinates are interpreted.
    pub reference: RefMode,
}

impl Position {
    /// Create an absolute pixel position.
    #[must_use]
    pub fn absolute(coords: Vec<f64>) -> Self {
        Self {
            coords,
            unit: Unit::Pixels,
            reference: RefMode::Absolute,
        }
    }

    /// Number of axes.
    #[must_use]
    pub fn axes(&self) -> usize {
        self.coords.len()
    }

    /// Offset this position elementwise by `delta`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] if `delta` has a different axis
    /// count or contains non-finite values.
    pub fn offset(&self, delta: &[f64]) -> CanvasResult<Self> {
        check_axes(&self.coords, delta)?;
        check_finite(delta)?;
        let coords = self
            .coords
            .iter()
            .zip(delta)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Self {
            coords,
            unit: self.unit,
            reference: self.reference.clone(),
        })
    }
}

/// A size with explicit unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Length per axis (2 or 3 entries).
    pub dims: Vec<f64>,
    /// Unit the lengths are expressed in.
    pub unit: Unit,
}

impl Extent {
    /// Create a pixel extent.
    #[must_use]
    pub fn pixels(dims: Vec<f64>) -> Self {
        Self {
            dims,
            unit: Unit::Pixels,
        }
    }

    /// Number of axes.
    #[must_use]
    pub fn axes(&self) -> usize {
        self.dims.len()
    }

    /// Scale every axis by `factor`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] if `factor` is not finite.
    pub fn scale(&self, factor: f64) -> CanvasResult<Self> {
        check_finite(&[factor])?;
        Ok(Self {
            dims: self.dims.iter().map(|d| d * factor).collect(),
            unit: self.unit,
        })
    }

    /// Scale elementwise by per-axis factors.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on axis-count mismatch or
    /// non-finite factors.
    pub fn scale_by(&self, factors: &[f64]) -> CanvasResult<Self> {
        check_axes(&self.dims, factors)?;
        check_finite(factors)?;
        Ok(Self {
            dims: self
                .dims
                .iter()
                .zip(factors)
                .map(|(d, f)| d * f)
                .collect(),
            unit: self.unit,
        })
    }
}

/// Assert two coordinate arrays cover the same axes.
///
/// # Errors
///
/// Returns [`CanvasError::Validation`] on mismatch.
pub fn check_axes(a: &[f64], b: &[f64]) -> CanvasResult<()> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(CanvasError::Validation(format!(
            "dimension mismatch: {} vs {} axes",
            a.len(),
            b.len()
        )))
    }
}

/// Assert every value is a finite number.
///
/// # Errors
///
/// Returns [`CanvasError::Validation`] when a value is NaN or infinite.
pub fn check_finite(values: &[f64]) -> CanvasResult<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(CanvasError::Validation(format!(
            "non-numeric coordinate: {v}"
        )));
    }
    Ok(())
}

/// Convert coordinate values between units.
///
/// Pixel, percent and viewport conversions need the reference boundary's
/// extent per axis. Meters need a substrate-specific scale and are the
/// adapter's concern; converting them here fails.
///
/// # Errors
///
/// Returns [`CanvasError::Validation`] if the conversion requires a
/// reference boundary and none is given, if axis counts mismatch, or if
/// the conversion involves meters.
pub fn convert_units(
    values: &[f64],
    from: Unit,
    to: Unit,
    reference: Option<&[f64]>,
) -> CanvasResult<Vec<f64>> {
    check_finite(values)?;
    if from == to {
        return Ok(values.to_vec());
    }
    if from == Unit::Meters || to == Unit::Meters {
        return Err(CanvasError::Validation(
            "meter conversion requires a substrate scale; convert in the adapter".to_string(),
        ));
    }
    let reference = reference.ok_or_else(|| {
        CanvasError::Validation(format!(
            "converting {from:?} to {to:?} requires a reference boundary"
        ))
    })?;
    check_axes(values, reference)?;
    check_finite(reference)?;

    // Normalize to a 0..1 fraction of the reference, then project out.
    let fractions: Vec<f64> = values
        .iter()
        .zip(reference)
        .map(|(v, r)| match from {
            Unit::Pixels => if *r == 0.0 { 0.0 } else { v / r },
            Unit::Percent => v / 100.0,
            Unit::Viewport => *v,
            Unit::Meters => unreachable!("meters rejected above"),
        })
        .collect();

    Ok(fractions
        .iter()
        .zip(reference)
        .map(|(f, r)| match to {
            Unit::Pixels => f * r,
            Unit::Percent => f * 100.0,
            Unit::Viewport => *f,
            Unit::Meters => unreachable!("meters rejected above"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_two_axes() {
        let pos = Position::absolute(vec![10.0, 20.0]);
        let moved = pos.offset(&[5.0, -5.0]).expect("should offset");
        assert_eq!(moved.coords, vec![15.0, 15.0]);
    }

    #[test]
    fn test_offset_three_axes() {
        let pos = Position::absolute(vec![1.0, 2.0, 3.0]);
        let moved = pos.offset(&[1.0, 1.0, 1.0]).expect("should offset");
        assert_eq!(moved.coords, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_offset_dimension_mismatch() {
        let pos = Position::absolute(vec![10.0, 20.0]);
        let err = pos.offset(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, CanvasError::Validation(_)));
    }

    #[test]
    fn test_non_finite_rejected() {
        let pos = Position::absolute(vec![0.0, 0.0]);
        assert!(pos.offset(&[f64::NAN, 0.0]).is_err());
        assert!(Extent::pixels(vec![10.0, 10.0]).scale(f64::INFINITY).is_err());
    }

    #[test]
    fn test_scale() {
        let ext = Extent::pixels(vec![100.0, 50.0]);
        let scaled = ext.scale(2.0).expect("should scale");
        assert_eq!(scaled.dims, vec![200.0, 100.0]);

        let scaled = ext.scale_by(&[0.5, 2.0]).expect("should scale");
        assert_eq!(scaled.dims, vec![50.0, 100.0]);
    }

    #[test]
    fn test_pixels_to_percent() {
        let result = convert_units(
            &[640.0, 400.0],
            Unit::Pixels,
            Unit::Percent,
            Some(&[1280.0, 800.0]),
        )
        .expect("should convert");
        assert_eq!(result, vec![50.0, 50.0]);
    }

    #[test]
    fn test_viewport_to_pixels_three_axes() {
        let result = convert_units(
            &[0.5, 0.25, 1.0],
            Unit::Viewport,
            Unit::Pixels,
            Some(&[1280.0, 800.0, 4.0]),
        )
        .expect("should convert");
        assert_eq!(result, vec![640.0, 200.0, 4.0]);
    }

    #[test]
    fn test_convert_without_reference_fails() {
        let err = convert_units(&[50.0, 50.0], Unit::Percent, Unit::Pixels, None).unwrap_err();
        assert!(matches!(err, CanvasError::Validation(_)));
    }

    #[test]
    fn test_meter_conversion_rejected() {
        let err = convert_units(
            &[1.0, 1.0],
            Unit::Meters,
            Unit::Pixels,
            Some(&[1280.0, 800.0]),
        )
        .unwrap_err();
        assert!(matches!(err, CanvasError::Validation(_)));
    }

    #[test]
    fn test_same_unit_is_identity() {
        let result =
            convert_units(&[1.0, 2.0], Unit::Pixels, Unit::Pixels, None).expect("identity");
        assert_eq!(result, vec![1.0, 2.0]);
    }
}
