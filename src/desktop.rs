//! Concrete desktop-window adapter.
//!
//! The adapter drives a [`DesktopShell`] handle: a thread-safe view of the
//! hosting shell's window table. The OS windowing primitives themselves
//! live behind that handle; the shell side of the handle is also how a
//! user's out-of-engine actions (moving or closing a real window) enter
//! the system, which makes it the seam integration tests drive.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::adapter::{CanvasAdapter, CreateParams, ElementChanges, RawSurface, SubstrateEvent};
use crate::canvas::{Canvas, CanvasBoundaries, CanvasCapabilities, SubstrateKind};
use crate::constraint::Constraint;
use crate::element::{CanvasElement, CanvasTransform, ElementContent, ElementId};
use crate::error::{CanvasError, CanvasResult};
use crate::oplog::now_ms;
use crate::region::Region;

/// Capacity of the substrate event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default window limit for a desktop shell.
const DEFAULT_MAX_WINDOWS: usize = 64;

/// One window in the shell's table.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopWindow {
    /// Shell-native window identifier.
    pub window_id: u64,
    /// Window title.
    pub title: String,
    /// Window bounds in desktop pixels.
    pub bounds: Region,
    /// Whether the window holds focus.
    pub focused: bool,
    /// Whether the window is minimized.
    pub minimized: bool,
    /// Whether the window is shown.
    pub visible: bool,
    /// Stacking position, higher is frontmost.
    pub z_order: u32,
    /// The engine element this window backs, when engine-managed.
    pub element: Option<ElementId>,
    /// What the window displays, for managed windows.
    pub content: Option<ElementContent>,
    /// Element type tag, for managed windows.
    pub element_type: String,
    /// When the window appeared, milliseconds since epoch.
    pub created_at: u64,
}

#[derive(Debug, Default)]
struct ShellState {
    windows: BTreeMap<u64, DesktopWindow>,
    next_window_id: u64,
    next_z: u32,
}

impl ShellState {
    fn allocate(&mut self) -> (u64, u32) {
        self.next_window_id += 1;
        self.next_z += 1;
        (self.next_window_id, self.next_z)
    }

    fn window_for_element(&self, element: ElementId) -> Option<&DesktopWindow> {
        self.windows.values().find(|w| w.element == Some(element))
    }
}

/// Shared handle onto the hosting shell's window table.
///
/// Cloning the handle shares the same table. The shell-side methods model
/// what the user or the shell itself does outside the engine's control;
/// each emits at most one [`SubstrateEvent`] per observed change, and
/// no-op calls (moving a window to its current bounds, closing a window
/// that is already gone) emit nothing.
#[derive(Debug, Clone)]
pub struct DesktopShell {
    state: Arc<RwLock<ShellState>>,
    events: broadcast::Sender<SubstrateEvent>,
    bounds: Region,
    max_windows: usize,
}

impl DesktopShell {
    /// Create a shell with the given desktop size in pixels.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(ShellState::default())),
            events,
            bounds: Region {
                origin: vec![0.0, 0.0],
                extent: vec![width, height],
            },
            max_windows: DEFAULT_MAX_WINDOWS,
        }
    }

    /// Set the window limit.
    #[must_use]
    pub fn with_max_windows(mut self, max_windows: usize) -> Self {
        self.max_windows = max_windows;
        self
    }

    /// The desktop bounds.
    #[must_use]
    pub fn bounds(&self) -> &Region {
        &self.bounds
    }

    /// Subscribe to substrate events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.events.subscribe()
    }

    /// Open a window the engine does not manage (another application).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::AdapterCreate`] when the window limit is hit.
    pub fn open_unmanaged(&self, title: impl Into<String>, bounds: Region) -> CanvasResult<u64> {
        let mut state = self.write()?;
        if state.windows.len() >= self.max_windows {
            return Err(CanvasError::AdapterCreate {
                reason: format!("window limit reached ({})", self.max_windows),
            });
        }
        let (window_id, z_order) = state.allocate();
        let window = DesktopWindow {
            window_id,
            title: title.into(),
            bounds,
            focused: false,
            minimized: false,
            visible: true,
            z_order,
            element: None,
            content: None,
            element_type: "window".to_string(),
            created_at: now_ms(),
        };
        state.windows.insert(window_id, window.clone());
        drop(state);
        self.emit(SubstrateEvent::SurfaceCreated(raw_surface(&window)));
        Ok(window_id)
    }

    /// Close a window, as the user would. Returns whether a window was
    /// actually closed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn close_window(&self, window_id: u64) -> CanvasResult<bool> {
        let removed = self.write()?.windows.remove(&window_id);
        match removed {
            Some(window) => {
                self.emit(SubstrateEvent::SurfaceClosed {
                    surface_id: window_id.to_string(),
                    element: window.element,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move or resize a window, as the user would. Moving a window to its
    /// current bounds emits nothing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn move_window(&self, window_id: u64, bounds: Region) -> CanvasResult<bool> {
        let mut state = self.write()?;
        let Some(window) = state.windows.get_mut(&window_id) else {
            return Ok(false);
        };
        if window.bounds == bounds {
            return Ok(false);
        }
        window.bounds = bounds.clone();
        drop(state);
        self.emit(SubstrateEvent::SurfaceMoved {
            surface_id: window_id.to_string(),
            bounds,
        });
        Ok(true)
    }

    /// Focus a window, as the user would.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn focus_window(&self, window_id: u64) -> CanvasResult<bool> {
        let mut state = self.write()?;
        if !state.windows.contains_key(&window_id) {
            return Ok(false);
        }
        let already_focused = state
            .windows
            .get(&window_id)
            .is_some_and(|w| w.focused);
        if already_focused {
            return Ok(false);
        }
        let front = state.next_z + 1;
        state.next_z = front;
        for window in state.windows.values_mut() {
            window.focused = window.window_id == window_id;
        }
        if let Some(window) = state.windows.get_mut(&window_id) {
            window.z_order = front;
        }
        drop(state);
        self.emit(SubstrateEvent::SurfaceFocused {
            surface_id: window_id.to_string(),
        });
        Ok(true)
    }

    /// Every window currently in the table.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn windows(&self) -> CanvasResult<Vec<DesktopWindow>> {
        Ok(self.read()?.windows.values().cloned().collect())
    }

    /// Look up one window.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn window(&self, window_id: u64) -> CanvasResult<Option<DesktopWindow>> {
        Ok(self.read()?.windows.get(&window_id).cloned())
    }

    /// The window backing a managed element, if present.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shell lock is poisoned.
    pub fn window_for_element(&self, element: ElementId) -> CanvasResult<Option<DesktopWindow>> {
        Ok(self.read()?.window_for_element(element).cloned())
    }

    fn emit(&self, event: SubstrateEvent) {
        // No subscribers is fine; the monitor may not be running yet.
        let _ = self.events.send(event);
    }

    fn read(&self) -> CanvasResult<std::sync::RwLockReadGuard<'_, ShellState>> {
        self.state
            .read()
            .map_err(|_| CanvasError::AdapterInit("desktop shell lock poisoned".to_string()))
    }

    fn write(&self) -> CanvasResult<std::sync::RwLockWriteGuard<'_, ShellState>> {
        self.state
            .write()
            .map_err(|_| CanvasError::AdapterInit("desktop shell lock poisoned".to_string()))
    }
}

fn raw_surface(window: &DesktopWindow) -> RawSurface {
    RawSurface {
        surface_id: window.window_id.to_string(),
        bounds: window.bounds.clone(),
        title: Some(window.title.clone()),
        focused: window.focused,
        minimized: window.minimized,
        visible: window.visible,
        z_order: window.z_order,
        managed: window.element,
    }
}

/// Title for a managed window, derived from its content.
fn window_title(element_type: &str, content: Option<&ElementContent>) -> String {
    match content {
        Some(ElementContent::Component { name, .. }) => name.clone(),
        Some(ElementContent::Url(url)) => url.clone(),
        Some(ElementContent::Native(reference)) => reference.clone(),
        None => element_type.to_string(),
    }
}

/// Desktop-window implementation of the adapter contract.
pub struct DesktopAdapter {
    shell: DesktopShell,
    constraints: Vec<Constraint>,
    destroyed: AtomicBool,
}

impl DesktopAdapter {
    /// Create an adapter over a shell handle.
    #[must_use]
    pub fn new(shell: DesktopShell) -> Self {
        Self {
            shell,
            constraints: Vec::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Seed the canvas with substrate-wide constraints (e.g. a reserved
    /// menu bar strip) discovered from the shell.
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// The shell handle this adapter drives.
    #[must_use]
    pub fn shell(&self) -> &DesktopShell {
        &self.shell
    }

    fn check_alive(&self) -> CanvasResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(CanvasError::AdapterInit(
                "desktop adapter has been destroyed".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// A managed window's transform must already be absolute pixels; the
    /// engine resolves units before crossing the adapter boundary.
    fn window_region(transform: &CanvasTransform) -> CanvasResult<Region> {
        use crate::geometry::{RefMode, Unit};
        if transform.position.unit != Unit::Pixels
            || transform.size.unit != Unit::Pixels
            || transform.position.reference != RefMode::Absolute
        {
            return Err(CanvasError::AdapterCreate {
                reason: "desktop adapter requires absolute pixel transforms".to_string(),
            });
        }
        Region::new(
            transform.position.coords.clone(),
            transform.size.dims.clone(),
        )
    }

    fn validate_content(content: Option<&ElementContent>) -> CanvasResult<()> {
        if let Some(ElementContent::Url(url)) = content {
            url::Url::parse(url).map_err(|e| CanvasError::AdapterCreate {
                reason: format!("invalid content source {url:?}: {e}"),
            })?;
        }
        Ok(())
    }

    fn element_from_window(window: &DesktopWindow, id: ElementId) -> CanvasElement {
        let mut element = CanvasElement::new(
            window.element_type.clone(),
            CanvasTransform::from_region(&window.bounds),
            SubstrateKind::Desktop,
            window.created_at,
        )
        .with_id(id);
        element.content = window.content.clone();
        element.state.visible = window.visible;
        element.state.minimized = window.minimized;
        element.state.focused = window.focused;
        element
    }

    fn build_canvas(&self) -> CanvasResult<Canvas> {
        let mut canvas = Canvas::new(
            SubstrateKind::Desktop,
            CanvasBoundaries::new(self.shell.bounds.clone()),
            CanvasCapabilities {
                max_elements: Some(self.shell.max_windows),
                ..CanvasCapabilities::desktop()
            },
        );
        for constraint in &self.constraints {
            canvas.add_constraint(constraint.clone());
        }
        let mut windows = self.shell.windows()?;
        windows.sort_by_key(|w| (w.created_at, w.window_id));
        for window in windows {
            let Some(id) = window.element else { continue };
            let element = Self::element_from_window(&window, id);
            let region = canvas.resolve_region(&element.transform)?;
            if !canvas.boundaries.region.contains_region(&region)? {
                // The user may have dragged the window off-screen; ground
                // truth wins over the containment invariant.
                canvas.boundaries.exempt(id);
            }
            canvas.add_element(element)?;
        }
        Ok(canvas)
    }
}

#[async_trait]
impl CanvasAdapter for DesktopAdapter {
    fn substrate(&self) -> SubstrateKind {
        SubstrateKind::Desktop
    }

    async fn initialize_canvas(&self) -> CanvasResult<Canvas> {
        self.check_alive()
            .map_err(|_| CanvasError::AdapterInit("desktop adapter destroyed".to_string()))?;
        let canvas = self.build_canvas()?;
        tracing::info!(
            canvas = %canvas.id,
            windows = canvas.element_count(),
            "initialized desktop canvas"
        );
        Ok(canvas)
    }

    async fn create_element(&self, params: CreateParams) -> CanvasResult<CanvasElement> {
        self.check_alive().map_err(|_| CanvasError::AdapterCreate {
            reason: "desktop adapter destroyed".to_string(),
        })?;
        Self::validate_content(params.content.as_ref())?;
        let bounds = Self::window_region(&params.transform)?;

        let mut state = self.shell.write()?;
        if state.windows.len() >= self.shell.max_windows {
            return Err(CanvasError::AdapterCreate {
                reason: format!("window limit reached ({})", self.shell.max_windows),
            });
        }
        let id = ElementId::new();
        let (window_id, z_order) = state.allocate();
        let window = DesktopWindow {
            window_id,
            title: window_title(&params.element_type, params.content.as_ref()),
            bounds,
            focused: params.state.focused,
            minimized: params.state.minimized,
            visible: params.state.visible,
            z_order,
            element: Some(id),
            content: params.content.clone(),
            element_type: params.element_type.clone(),
            created_at: now_ms(),
        };
        state.windows.insert(window_id, window.clone());
        drop(state);
        self.shell
            .emit(SubstrateEvent::SurfaceCreated(raw_surface(&window)));

        let mut element = Self::element_from_window(&window, id);
        element.state = params.state;
        tracing::debug!(element = %id, window = window_id, "created desktop window");
        Ok(element)
    }

    async fn modify_element(
        &self,
        element: &CanvasElement,
        changes: &ElementChanges,
    ) -> CanvasResult<()> {
        self.check_alive().map_err(|_| CanvasError::AdapterModify {
            element: element.id.to_string(),
            reason: "desktop adapter destroyed".to_string(),
        })?;
        if let Some(content) = &changes.content {
            Self::validate_content(Some(content)).map_err(|e| CanvasError::AdapterModify {
                element: element.id.to_string(),
                reason: e.to_string(),
            })?;
        }
        let new_bounds = changes
            .transform
            .as_ref()
            .map(Self::window_region)
            .transpose()
            .map_err(|e| CanvasError::AdapterModify {
                element: element.id.to_string(),
                reason: e.to_string(),
            })?;

        let mut state = self.shell.write()?;
        let Some(window) = state
            .windows
            .values_mut()
            .find(|w| w.element == Some(element.id))
        else {
            return Err(CanvasError::AdapterModify {
                element: element.id.to_string(),
                reason: "surface no longer exists on the substrate".to_string(),
            });
        };

        let window_id = window.window_id;
        let mut moved = None;
        if let Some(bounds) = new_bounds {
            if window.bounds != bounds {
                window.bounds = bounds.clone();
                moved = Some(bounds);
            }
        }
        if let Some(state_changes) = &changes.state {
            if let Some(visible) = state_changes.visible {
                window.visible = visible;
            }
            if let Some(minimized) = state_changes.minimized {
                window.minimized = minimized;
            }
        }
        if let Some(content) = &changes.content {
            window.content = Some(content.clone());
            window.title = window_title(&window.element_type, Some(content));
        }
        let wants_focus = changes
            .state
            .as_ref()
            .and_then(|s| s.focused)
            .unwrap_or(false);
        drop(state);

        if let Some(bounds) = moved {
            self.shell.emit(SubstrateEvent::SurfaceMoved {
                surface_id: window_id.to_string(),
                bounds,
            });
        }
        if wants_focus {
            self.shell.focus_window(window_id)?;
        }
        tracing::debug!(element = %element.id, window = window_id, "modified desktop window");
        Ok(())
    }

    async fn remove_element(&self, element: &CanvasElement) -> CanvasResult<()> {
        self.check_alive().map_err(|_| CanvasError::AdapterRemove {
            element: element.id.to_string(),
            reason: "desktop adapter destroyed".to_string(),
        })?;
        let window = self.shell.window_for_element(element.id)?;
        match window {
            Some(window) => {
                self.shell.close_window(window.window_id)?;
                tracing::debug!(element = %element.id, window = window.window_id, "removed desktop window");
            }
            // Already gone: removal is idempotent.
            None => {
                tracing::debug!(element = %element.id, "window already gone; remove is a no-op");
            }
        }
        Ok(())
    }

    async fn get_canvas_state(&self) -> CanvasResult<Canvas> {
        self.check_alive()?;
        self.build_canvas()
    }

    async fn list_surfaces(&self) -> CanvasResult<Vec<RawSurface>> {
        self.check_alive()?;
        let mut surfaces: Vec<RawSurface> =
            self.shell.windows()?.iter().map(raw_surface).collect();
        surfaces.sort_by(|a, b| b.z_order.cmp(&a.z_order));
        Ok(surfaces)
    }

    fn monitor_changes(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.shell.subscribe()
    }

    async fn destroy(&self) -> CanvasResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Close every window this adapter materialized; unmanaged windows
        // belong to their own applications.
        let managed: Vec<u64> = self
            .shell
            .windows()?
            .into_iter()
            .filter(|w| w.element.is_some())
            .map(|w| w.window_id)
            .collect();
        for window_id in managed {
            self.shell.close_window(window_id)?;
        }
        tracing::info!("desktop adapter destroyed");
        Ok(())
    }
}
