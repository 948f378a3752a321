//! The substrate boundary: the contract every adapter variant implements.
//!
//! The engine is written once against this capability set and never
//! against a concrete substrate. Adapter calls are the only place the real
//! substrate is touched, the only calls that may block, and the only calls
//! that may fail with substrate-side errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::canvas::{Canvas, SubstrateKind};
use crate::element::{
    CanvasElement, CanvasTransform, ElementContent, ElementId, ElementState, StateChanges,
};
use crate::error::CanvasResult;
use crate::region::Region;

/// Parameters for materializing one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
    /// Element type tag (e.g. "window").
    pub element_type: String,
    /// What the surface displays, if anything. URL content is normalized
    /// by the engine before it reaches the adapter.
    pub content: Option<ElementContent>,
    /// Where the surface goes, as planned by the engine.
    pub transform: CanvasTransform,
    /// Initial substrate-visible state.
    pub state: ElementState,
}

/// Changes to apply to an existing surface; `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementChanges {
    /// New transform, if moving or resizing.
    pub transform: Option<CanvasTransform>,
    /// State changes, if any.
    pub state: Option<StateChanges>,
    /// Replacement content, if any.
    pub content: Option<ElementContent>,
}

impl ElementChanges {
    /// Whether there is nothing to apply.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.transform.is_none() && self.state.is_none() && self.content.is_none()
    }
}

/// One real surface as observed on the substrate, managed or not.
///
/// This is ground truth, not canonical state: the engine reconciles its
/// canonical `Canvas` against lists of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSurface {
    /// Substrate-native surface identifier.
    pub surface_id: String,
    /// Surface bounds in substrate pixels.
    pub bounds: Region,
    /// Surface title, when the substrate exposes one.
    pub title: Option<String>,
    /// Whether the surface holds focus.
    pub focused: bool,
    /// Whether the surface is minimized.
    pub minimized: bool,
    /// Whether the surface is shown.
    pub visible: bool,
    /// Stacking position, higher is frontmost.
    pub z_order: u32,
    /// The engine element this surface backs, when engine-managed.
    pub managed: Option<ElementId>,
}

impl RawSurface {
    /// Whether this surface is engine-managed.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.managed.is_some()
    }
}

/// A substrate-driven change, pushed by [`CanvasAdapter::monitor_changes`].
///
/// Adapters fire at most one event per observed change, coalescing rapid
/// duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum SubstrateEvent {
    /// A surface appeared (engine-created or not).
    SurfaceCreated(RawSurface),
    /// A surface was moved or resized outside the engine.
    SurfaceMoved {
        /// The surface that moved.
        surface_id: String,
        /// Its new bounds.
        bounds: Region,
    },
    /// A surface disappeared.
    SurfaceClosed {
        /// The surface that closed.
        surface_id: String,
        /// The managed element it backed, if any.
        element: Option<ElementId>,
    },
    /// Focus moved to a surface.
    SurfaceFocused {
        /// The surface that took focus.
        surface_id: String,
    },
}

/// The operation contract between the engine and one substrate.
///
/// All operations are asynchronous and may suspend on the real substrate
/// for an unbounded time. Timeouts are the adapter's own configuration
/// concern; the engine treats an adapter timeout like any other adapter
/// error.
#[async_trait]
pub trait CanvasAdapter: Send + Sync {
    /// Which substrate family this adapter drives.
    fn substrate(&self) -> SubstrateKind;

    /// Discover or create the initial canonical snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterInit`] if the substrate cannot
    /// be reached.
    async fn initialize_canvas(&self) -> CanvasResult<Canvas>;

    /// Materialize one surface.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterCreate`] when the content
    /// source is invalid or a resource limit is hit.
    async fn create_element(&self, params: CreateParams) -> CanvasResult<CanvasElement>;

    /// Apply transform/state/content changes to an existing surface.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterModify`] if the target no
    /// longer exists on the substrate.
    async fn modify_element(
        &self,
        element: &CanvasElement,
        changes: &ElementChanges,
    ) -> CanvasResult<()>;

    /// Destroy a surface. Idempotent: removing an already-gone surface is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterRemove`] on substrate failures
    /// other than the surface already being gone.
    async fn remove_element(&self, element: &CanvasElement) -> CanvasResult<()>;

    /// Re-read ground truth from the substrate. Used for reconciliation;
    /// not assumed to equal canonical state at all times.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterInit`] if the substrate cannot
    /// be reached.
    async fn get_canvas_state(&self) -> CanvasResult<Canvas>;

    /// Enumerate every surface currently on the substrate, including
    /// surfaces the engine does not manage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::AdapterInit`] if the substrate cannot
    /// be reached.
    async fn list_surfaces(&self) -> CanvasResult<Vec<RawSurface>>;

    /// Subscribe to substrate-driven changes (the user moved, closed or
    /// focused a surface outside the engine).
    fn monitor_changes(&self) -> broadcast::Receiver<SubstrateEvent>;

    /// Release all substrate resources and subscriptions. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an adapter error if the substrate rejects the teardown.
    async fn destroy(&self) -> CanvasResult<()>;
}
