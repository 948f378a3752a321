//! The canonical workspace aggregate: elements, boundaries, capabilities
//! and constraints for one canvas instance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraint::Constraint;
use crate::element::{CanvasElement, CanvasTransform, ElementId};
use crate::error::{CanvasError, CanvasResult};
use crate::geometry::{convert_units, AnchorPoint, RefMode, Unit};
use crate::region::Region;

/// Unique identifier for a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasId(Uuid);

impl CanvasId {
    /// Create a new unique canvas ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CanvasId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CanvasId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The substrate family a canvas renders onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateKind {
    /// A 2D desktop window substrate.
    Desktop,
    /// A 3-axis spatial-computing substrate.
    Spatial,
}

/// What a substrate can do; the engine degrades gracefully around gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasCapabilities {
    /// Number of coordinate axes (2 or 3).
    pub axes: usize,
    /// Whether surfaces can be rotated.
    pub supports_rotation: bool,
    /// Whether surfaces can hold focus.
    pub supports_focus: bool,
    /// Whether surfaces can be minimized.
    pub supports_minimize: bool,
    /// Substrate-imposed element limit, if any.
    pub max_elements: Option<usize>,
}

impl CanvasCapabilities {
    /// Capabilities of a typical desktop window substrate.
    #[must_use]
    pub const fn desktop() -> Self {
        Self {
            axes: 2,
            supports_rotation: false,
            supports_focus: true,
            supports_minimize: true,
            max_elements: None,
        }
    }
}

/// The canvas boundary plus elements exempted from containment.
///
/// Exemptions exist for the narrow-boundary overflow case: the planner
/// keeps the configured default width even when two side-by-side elements
/// no longer fit, and the overflowing element is recorded here instead of
/// failing the invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasBoundaries {
    /// The boundary region.
    pub region: Region,
    /// Elements allowed to extend past the boundary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exempt: Vec<ElementId>,
}

impl CanvasBoundaries {
    /// Boundaries with no exemptions.
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            region,
            exempt: Vec::new(),
        }
    }

    /// Whether an element may overflow the boundary.
    #[must_use]
    pub fn is_exempt(&self, id: ElementId) -> bool {
        self.exempt.contains(&id)
    }

    /// Exempt an element from containment.
    pub fn exempt(&mut self, id: ElementId) {
        if !self.exempt.contains(&id) {
            self.exempt.push(id);
        }
    }

    /// Drop an element's exemption, if present.
    pub fn unexempt(&mut self, id: ElementId) {
        self.exempt.retain(|e| *e != id);
    }
}

/// One workspace instance.
///
/// Elements are kept in creation order; ids are unique within a canvas, and
/// every element lies within the boundaries unless explicitly exempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    /// Unique identifier.
    pub id: CanvasId,
    /// Which substrate family this canvas renders onto.
    pub substrate: SubstrateKind,
    /// Managed elements, in creation order.
    elements: Vec<CanvasElement>,
    /// Boundary and overflow exemptions.
    pub boundaries: CanvasBoundaries,
    /// What the substrate supports.
    pub capabilities: CanvasCapabilities,
    /// Canvas-wide constraint zones.
    pub constraints: Vec<Constraint>,
}

impl Canvas {
    /// Create an empty canvas.
    #[must_use]
    pub fn new(
        substrate: SubstrateKind,
        boundaries: CanvasBoundaries,
        capabilities: CanvasCapabilities,
    ) -> Self {
        Self {
            id: CanvasId::new(),
            substrate,
            elements: Vec::new(),
            boundaries,
            capabilities,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint zone.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Add an element, enforcing the canvas invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] if the id already exists, the
    /// element lies outside the boundaries without an exemption, or the
    /// substrate's element limit is reached.
    pub fn add_element(&mut self, element: CanvasElement) -> CanvasResult<ElementId> {
        if self.contains(element.id) {
            return Err(CanvasError::Validation(format!(
                "duplicate element id: {}",
                element.id
            )));
        }
        if let Some(max) = self.capabilities.max_elements {
            if self.elements.len() >= max {
                return Err(CanvasError::Validation(format!(
                    "element limit reached ({max})"
                )));
            }
        }
        let region = self.resolve_region(&element.transform)?;
        if !self.boundaries.region.contains_region(&region)?
            && !self.boundaries.is_exempt(element.id)
        {
            return Err(CanvasError::Validation(format!(
                "element {} lies outside the canvas boundaries",
                element.id
            )));
        }
        let id = element.id;
        self.elements.push(element);
        Ok(id)
    }

    /// Remove an element.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] if the element is not found.
    pub fn remove_element(&mut self, id: ElementId) -> CanvasResult<CanvasElement> {
        let index = self
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CanvasError::Validation(format!("unknown element id: {id}")))?;
        self.boundaries.unexempt(id);
        Ok(self.elements.remove(index))
    }

    /// Get an element by ID.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&CanvasElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Get a mutable reference to an element by ID.
    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut CanvasElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// All elements, in creation order.
    pub fn elements(&self) -> impl Iterator<Item = &CanvasElement> {
        self.elements.iter()
    }

    /// Whether an element with this ID exists.
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.iter().any(|e| e.id == id)
    }

    /// Number of elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Whether the canvas holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Resolve a transform to an absolute pixel region within this canvas.
    ///
    /// Percent and viewport units convert against the boundary extent;
    /// relative positions resolve against the referenced element; anchored
    /// positions offset from the named boundary corner. An element-level
    /// anchor shifts the origin so the position names that point of the
    /// element itself.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] on unknown referenced elements,
    /// relative-reference cycles, axis-count mismatches, or unit
    /// conversions lacking a reference.
    pub fn resolve_region(&self, transform: &CanvasTransform) -> CanvasResult<Region> {
        self.resolve_region_chain(transform, &mut Vec::new())
    }

    /// Resolve a transform proposed for `id`, rejecting relative-reference
    /// chains that would loop back through that element once stored.
    ///
    /// # Errors
    ///
    /// As [`Canvas::resolve_region`], plus [`CanvasError::Validation`] when
    /// the chain of referenced elements reaches `id` itself.
    pub fn resolve_region_for(
        &self,
        id: ElementId,
        transform: &CanvasTransform,
    ) -> CanvasResult<Region> {
        self.resolve_region_chain(transform, &mut vec![id])
    }

    fn resolve_region_chain(
        &self,
        transform: &CanvasTransform,
        chain: &mut Vec<ElementId>,
    ) -> CanvasResult<Region> {
        let reference = &self.boundaries.region;
        let size = convert_units(
            &transform.size.dims,
            transform.size.unit,
            Unit::Pixels,
            Some(&reference.extent),
        )?;
        let coords = convert_units(
            &transform.position.coords,
            transform.position.unit,
            Unit::Pixels,
            Some(&reference.extent),
        )?;

        let base: Vec<f64> = match &transform.position.reference {
            RefMode::Absolute => coords,
            RefMode::Relative(other_id) => {
                if chain.contains(other_id) {
                    return Err(CanvasError::Validation(format!(
                        "relative reference cycle through element {other_id}"
                    )));
                }
                let other = self.element(*other_id).ok_or_else(|| {
                    CanvasError::Validation(format!(
                        "transform references unknown element: {other_id}"
                    ))
                })?;
                chain.push(*other_id);
                let other_region = self.resolve_region_chain(&other.transform, chain)?;
                other_region
                    .origin
                    .iter()
                    .zip(&coords)
                    .map(|(o, c)| o + c)
                    .collect()
            }
            RefMode::Anchor(point) => anchor_coords(reference, *point)
                .iter()
                .zip(&coords)
                .map(|(a, c)| a + c)
                .collect(),
        };

        let origin = match transform.anchor {
            None => base,
            Some(point) => {
                let offsets = anchor_offsets(&size, point);
                base.iter().zip(&offsets).map(|(b, o)| b - o).collect()
            }
        };

        Region::new(origin, size)
    }

    /// Serialize the canvas to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        serde_json::to_string(self).map_err(CanvasError::Serialization)
    }

    /// Deserialize a canvas from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        serde_json::from_str(json).map_err(CanvasError::Serialization)
    }
}

/// The absolute coordinates of a named point on a region.
fn anchor_coords(region: &Region, point: AnchorPoint) -> Vec<f64> {
    let offsets = anchor_offsets(&region.extent, point);
    region
        .origin
        .iter()
        .zip(&offsets)
        .map(|(o, off)| o + off)
        .collect()
}

/// Offsets from a region's origin to a named anchor point. Anchors are
/// defined over the first two axes; further axes stay at the origin except
/// for `Center`.
fn anchor_offsets(extent: &[f64], point: AnchorPoint) -> Vec<f64> {
    extent
        .iter()
        .enumerate()
        .map(|(axis, e)| match (point, axis) {
            (AnchorPoint::Center, _) => e / 2.0,
            (AnchorPoint::TopRight | AnchorPoint::BottomRight, 0)
            | (AnchorPoint::BottomLeft | AnchorPoint::BottomRight, 1) => *e,
            _ => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::CanvasTransform;
    use crate::geometry::{Extent, Position};

    fn desktop_canvas() -> Canvas {
        Canvas::new(
            SubstrateKind::Desktop,
            CanvasBoundaries::new(Region::rect(0.0, 0.0, 1280.0, 800.0).expect("valid")),
            CanvasCapabilities::desktop(),
        )
    }

    fn window_at(region: Region, created_at: u64) -> CanvasElement {
        CanvasElement::new(
            "window",
            CanvasTransform::from_region(&region),
            SubstrateKind::Desktop,
            created_at,
        )
    }

    #[test]
    fn test_add_remove() {
        let mut canvas = desktop_canvas();
        assert!(canvas.is_empty());

        let element = window_at(Region::rect(0.0, 0.0, 640.0, 800.0).expect("valid"), 1);
        let id = canvas.add_element(element).expect("in bounds");
        assert_eq!(canvas.element_count(), 1);
        assert!(canvas.contains(id));

        canvas.remove_element(id).expect("exists");
        assert!(canvas.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut canvas = desktop_canvas();
        let element = window_at(Region::rect(0.0, 0.0, 100.0, 100.0).expect("valid"), 1);
        let dup = element.clone();
        canvas.add_element(element).expect("in bounds");
        assert!(matches!(
            canvas.add_element(dup),
            Err(CanvasError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_rejected_unless_exempt() {
        let mut canvas = desktop_canvas();
        let element = window_at(Region::rect(1000.0, 0.0, 530.0, 800.0).expect("valid"), 1);
        let id = element.id;
        assert!(canvas.add_element(element.clone()).is_err());

        canvas.boundaries.exempt(id);
        canvas.add_element(element).expect("exempted");
        assert!(canvas.contains(id));
    }

    #[test]
    fn test_element_limit() {
        let mut canvas = desktop_canvas();
        canvas.capabilities.max_elements = Some(1);
        let region = Region::rect(0.0, 0.0, 100.0, 100.0).expect("valid");
        canvas.add_element(window_at(region.clone(), 1)).expect("first");
        assert!(canvas.add_element(window_at(region, 2)).is_err());
    }

    #[test]
    fn test_resolve_percent_units() {
        let canvas = desktop_canvas();
        let transform = CanvasTransform {
            position: Position {
                coords: vec![50.0, 0.0],
                unit: Unit::Percent,
                reference: RefMode::Absolute,
            },
            size: Extent {
                dims: vec![50.0, 100.0],
                unit: Unit::Percent,
            },
            rotation: None,
            anchor: None,
        };
        let region = canvas.resolve_region(&transform).expect("resolvable");
        assert_eq!(region, Region::rect(640.0, 0.0, 640.0, 800.0).expect("valid"));
    }

    #[test]
    fn test_resolve_relative_to_element() {
        let mut canvas = desktop_canvas();
        let base = window_at(Region::rect(100.0, 200.0, 300.0, 300.0).expect("valid"), 1);
        let base_id = base.id;
        canvas.add_element(base).expect("in bounds");

        let transform = CanvasTransform {
            position: Position {
                coords: vec![300.0, 0.0],
                unit: Unit::Pixels,
                reference: RefMode::Relative(base_id),
            },
            size: Extent::pixels(vec![200.0, 300.0]),
            rotation: None,
            anchor: None,
        };
        let region = canvas.resolve_region(&transform).expect("resolvable");
        assert_eq!(region.origin, vec![400.0, 200.0]);
    }

    #[test]
    fn test_resolve_unknown_reference_fails() {
        let canvas = desktop_canvas();
        let transform = CanvasTransform {
            position: Position {
                coords: vec![0.0, 0.0],
                unit: Unit::Pixels,
                reference: RefMode::Relative(ElementId::new()),
            },
            size: Extent::pixels(vec![100.0, 100.0]),
            rotation: None,
            anchor: None,
        };
        assert!(matches!(
            canvas.resolve_region(&transform),
            Err(CanvasError::Validation(_))
        ));
    }

    fn relative_to(target: ElementId) -> CanvasTransform {
        CanvasTransform {
            position: Position {
                coords: vec![10.0, 10.0],
                unit: Unit::Pixels,
                reference: RefMode::Relative(target),
            },
            size: Extent::pixels(vec![100.0, 100.0]),
            rotation: None,
            anchor: None,
        }
    }

    #[test]
    fn test_resolve_mutual_reference_cycle_fails() {
        let mut canvas = desktop_canvas();
        let a = window_at(Region::rect(0.0, 0.0, 200.0, 200.0).expect("valid"), 1);
        let b = window_at(Region::rect(300.0, 0.0, 200.0, 200.0).expect("valid"), 2);
        let (a_id, b_id) = (a.id, b.id);
        canvas.add_element(a).expect("in bounds");
        canvas.add_element(b).expect("in bounds");

        canvas.element_mut(a_id).expect("exists").transform = relative_to(b_id);
        canvas.element_mut(b_id).expect("exists").transform = relative_to(a_id);

        let stored = canvas.element(a_id).expect("exists").transform.clone();
        assert!(matches!(
            canvas.resolve_region(&stored),
            Err(CanvasError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_for_rejects_self_reference() {
        let mut canvas = desktop_canvas();
        let a = window_at(Region::rect(0.0, 0.0, 200.0, 200.0).expect("valid"), 1);
        let a_id = a.id;
        canvas.add_element(a).expect("in bounds");

        assert!(matches!(
            canvas.resolve_region_for(a_id, &relative_to(a_id)),
            Err(CanvasError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_anchored_center() {
        let canvas = desktop_canvas();
        let transform = CanvasTransform {
            position: Position {
                coords: vec![0.0, 0.0],
                unit: Unit::Pixels,
                reference: RefMode::Anchor(AnchorPoint::Center),
            },
            size: Extent::pixels(vec![200.0, 100.0]),
            rotation: None,
            anchor: Some(AnchorPoint::Center),
        };
        let region = canvas.resolve_region(&transform).expect("resolvable");
        assert_eq!(region.origin, vec![540.0, 350.0]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut canvas = desktop_canvas();
        canvas
            .add_element(window_at(
                Region::rect(0.0, 0.0, 640.0, 800.0).expect("valid"),
                1,
            ))
            .expect("in bounds");

        let json = canvas.to_json().expect("serialize");
        let restored = Canvas::from_json(&json).expect("deserialize");
        assert_eq!(restored, canvas);
    }
}
