//! Canvas elements - the managed surfaces placed on a canvas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::SubstrateKind;
use crate::geometry::{AnchorPoint, Extent, Position};
use crate::region::Region;

/// Unique identifier for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Create a new unique element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an element displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "lowercase")]
pub enum ElementContent {
    /// A URL loaded into the surface.
    Url(String),
    /// A named widget component with its configuration.
    Component {
        /// Component name (e.g. "notes", "reminders", "settings").
        name: String,
        /// Component-specific configuration.
        props: serde_json::Value,
    },
    /// An opaque native reference the substrate understands.
    Native(String),
}

/// Substrate-visible state of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Whether the surface is shown.
    pub visible: bool,
    /// Whether the surface accepts input.
    pub interactive: bool,
    /// Whether the surface holds focus.
    pub focused: bool,
    /// Whether the surface is minimized.
    pub minimized: bool,
    /// Substrate-specific flags the engine carries but does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, bool>,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            visible: true,
            interactive: true,
            focused: false,
            minimized: false,
            flags: BTreeMap::new(),
        }
    }
}

/// Partial update to an element's state; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChanges {
    /// New visibility, if changing.
    pub visible: Option<bool>,
    /// New interactivity, if changing.
    pub interactive: Option<bool>,
    /// New focus, if changing.
    pub focused: Option<bool>,
    /// New minimized state, if changing.
    pub minimized: Option<bool>,
}

impl StateChanges {
    /// Apply these changes to a state in place.
    pub fn apply(&self, state: &mut ElementState) {
        if let Some(visible) = self.visible {
            state.visible = visible;
        }
        if let Some(interactive) = self.interactive {
            state.interactive = interactive;
        }
        if let Some(focused) = self.focused {
            state.focused = focused;
        }
        if let Some(minimized) = self.minimized {
            state.minimized = minimized;
        }
    }
}

/// Position, size and optional rotation/anchor for one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasTransform {
    /// Where the element sits.
    pub position: Position,
    /// How large the element is.
    pub size: Extent,
    /// Rotation per axis in radians, when the substrate supports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec<f64>>,
    /// Anchor the position is measured from, when not the origin corner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorPoint>,
}

impl CanvasTransform {
    /// An absolute pixel transform covering the given region.
    #[must_use]
    pub fn from_region(region: &Region) -> Self {
        Self {
            position: Position::absolute(region.origin.clone()),
            size: Extent::pixels(region.extent.clone()),
            rotation: None,
            anchor: None,
        }
    }
}

/// One managed surface on a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasElement {
    /// Unique identifier.
    pub id: ElementId,
    /// Element type tag (e.g. "window", "panel").
    pub element_type: String,
    /// Position and size.
    pub transform: CanvasTransform,
    /// What the element displays, if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ElementContent>,
    /// Substrate-visible state.
    pub state: ElementState,
    /// Which substrate family owns this element.
    pub substrate: SubstrateKind,
    /// Creation time in milliseconds since epoch; drives layout ordering.
    pub created_at: u64,
}

impl CanvasElement {
    /// Create an element of the given type with a transform.
    #[must_use]
    pub fn new(
        element_type: impl Into<String>,
        transform: CanvasTransform,
        substrate: SubstrateKind,
        created_at: u64,
    ) -> Self {
        Self {
            id: ElementId::new(),
            element_type: element_type.into(),
            transform,
            content: None,
            state: ElementState::default(),
            substrate,
            created_at,
        }
    }

    /// Set the content.
    #[must_use]
    pub fn with_content(mut self, content: ElementContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Set the state.
    #[must_use]
    pub fn with_state(mut self, state: ElementState) -> Self {
        self.state = state;
        self
    }

    /// Replace the generated ID (used when adopting substrate surfaces).
    #[must_use]
    pub fn with_id(mut self, id: ElementId) -> Self {
        self.id = id;
        self
    }
}
