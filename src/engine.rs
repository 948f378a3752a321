//! The canvas engine: the single entry point callers mutate a workspace
//! through.
//!
//! The engine owns the canonical [`Canvas`], the operation log and the
//! substrate monitor, and drives exactly one adapter. Mutations are
//! serialized through one async mutex, so concurrent requests queue and
//! each observes the state its predecessors left behind; snapshots read a
//! separate sync lock and never wait on a mutation in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::{CanvasAdapter, CreateParams, ElementChanges, RawSurface};
use crate::canvas::Canvas;
use crate::config::EngineConfig;
use crate::constraint::{reserved_violations, Constraint};
use crate::element::{CanvasElement, CanvasTransform, ElementContent, ElementId, ElementState};
use crate::error::{CanvasError, CanvasResult};
use crate::layout::{LayoutEntry, LayoutPlan, LayoutPlanner, SlotHint};
use crate::monitor::{ReconcileEvent, SubstrateMonitor};
use crate::oplog::{
    now_ms, CanvasOperation, OperationKind, OperationLog, OperationOutcome,
};

const STATE_READY: u8 = 0;
const STATE_MUTATING: u8 = 1;
const STATE_DESTROYED: u8 = 2;

/// Where the engine is in its lifecycle.
///
/// `Uninitialized` exists only before [`CanvasEngine::initialize`] returns;
/// a constructed engine is `Ready`, `Mutating` while a mutation holds the
/// stream, and terminally `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No engine exists yet.
    Uninitialized,
    /// Accepting requests.
    Ready,
    /// A mutation holds the stream; further mutations queue.
    Mutating,
    /// Torn down; every request fails.
    Destroyed,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_MUTATING => Self::Mutating,
            STATE_DESTROYED => Self::Destroyed,
            _ => Self::Ready,
        }
    }
}

/// A caller's request to place a new element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Element type tag (e.g. "window", "panel").
    pub element_type: String,
    /// What the element displays. URL content is normalized against the
    /// configured default scheme before it reaches the adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ElementContent>,
    /// Placement preference.
    #[serde(default)]
    pub slot: SlotHint,
    /// Explicit target transform. When present it is validated against the
    /// boundary and the reserved zones and honored as given; the other
    /// elements keep their regions instead of being replanned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_hint: Option<CanvasTransform>,
    /// Constraint zones to install on the canvas before planning. Like all
    /// constraints they persist across later mutations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    /// Initial substrate-visible state.
    #[serde(default)]
    pub state: ElementState,
}

impl CreateRequest {
    /// A request with default state and no content.
    #[must_use]
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            content: None,
            slot: SlotHint::Auto,
            transform_hint: None,
            constraints: Vec::new(),
            state: ElementState::default(),
        }
    }

    /// Set the content.
    #[must_use]
    pub fn with_content(mut self, content: ElementContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Set the placement preference.
    #[must_use]
    pub const fn with_slot(mut self, slot: SlotHint) -> Self {
        self.slot = slot;
        self
    }

    /// Set an explicit target transform.
    #[must_use]
    pub fn with_transform_hint(mut self, transform: CanvasTransform) -> Self {
        self.transform_hint = Some(transform);
        self
    }

    /// Install a constraint zone along with this creation.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Set the initial state.
    #[must_use]
    pub fn with_state(mut self, state: ElementState) -> Self {
        self.state = state;
        self
    }
}

/// Canonical state guarded by the snapshot lock.
struct Shared {
    canvas: Canvas,
    slots: HashMap<ElementId, SlotHint>,
}

struct EngineInner {
    config: EngineConfig,
    planner: LayoutPlanner,
    adapter: Arc<dyn CanvasAdapter>,
    shared: RwLock<Shared>,
    log: RwLock<OperationLog>,
    state: AtomicU8,
    mutation: tokio::sync::Mutex<()>,
    monitor: SubstrateMonitor,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the mutation stream; dropping it returns the engine to `Ready`
/// unless it was destroyed meanwhile.
struct MutationGuard<'a> {
    _lock: tokio::sync::MutexGuard<'a, ()>,
    state: &'a AtomicU8,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let _ = self.state.compare_exchange(
            STATE_MUTATING,
            STATE_READY,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Orchestrates one canvas over one substrate adapter.
///
/// Cloning the engine shares the same canvas, log and adapter.
#[derive(Clone)]
pub struct CanvasEngine {
    inner: Arc<EngineInner>,
}

impl CanvasEngine {
    /// Initialize an engine over an adapter: discover or create the
    /// canonical canvas, then start watching the substrate.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::AdapterInit`] if the substrate cannot be
    /// reached.
    pub async fn initialize(
        adapter: Arc<dyn CanvasAdapter>,
        config: EngineConfig,
    ) -> CanvasResult<Self> {
        let canvas = adapter.initialize_canvas().await?;
        let adopted = canvas.element_count();
        let planner = LayoutPlanner::new(&config);
        let (monitor, events) =
            SubstrateMonitor::start(Arc::clone(&adapter), config.poll_interval());

        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                planner,
                adapter,
                shared: RwLock::new(Shared {
                    canvas,
                    slots: HashMap::new(),
                }),
                log: RwLock::new(OperationLog::new()),
                state: AtomicU8::new(STATE_READY),
                mutation: tokio::sync::Mutex::new(()),
                monitor,
                reconcile: Mutex::new(None),
            }),
        };

        let task_engine = engine.clone();
        let handle = tokio::spawn(async move {
            task_engine.reconcile_loop(events).await;
        });
        if let Ok(mut slot) = engine.inner.reconcile.lock() {
            *slot = Some(handle);
        }

        engine.log_record(
            CanvasOperation::caller(
                OperationKind::Custom,
                None,
                serde_json::json!({"action": "initialize"}),
            )
            .with_outcome(OperationOutcome::Success(
                serde_json::json!({"adopted_elements": adopted}),
            )),
        );
        tracing::info!(adopted, "canvas engine initialized");
        Ok(engine)
    }

    /// Where the engine is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// A copy of the canonical canvas. Never waits on a mutation in
    /// flight, so the copy may be mid-mutation stale by one operation.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::EngineDestroyed`] after teardown.
    pub fn snapshot(&self) -> CanvasResult<Canvas> {
        self.check_alive()?;
        Ok(self.read_shared()?.canvas.clone())
    }

    /// The last observed substrate ground truth: every surface, managed
    /// or not.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::EngineDestroyed`] after teardown.
    pub fn substrate_snapshot(&self) -> CanvasResult<Vec<RawSurface>> {
        self.check_alive()?;
        Ok(self.inner.monitor.surfaces())
    }

    /// Every attempted operation so far, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::EngineDestroyed`] after teardown.
    pub fn operations(&self) -> CanvasResult<Vec<CanvasOperation>> {
        self.check_alive()?;
        Ok(self.read_log()?.records().to_vec())
    }

    /// Place a new element, replanning the layout around it.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] for unusable content,
    /// [`CanvasError::LayoutInfeasible`] when no arrangement fits, and
    /// adapter errors when the substrate rejects the surface. Failures are
    /// logged like successes.
    pub async fn request_create(&self, request: CreateRequest) -> CanvasResult<CanvasElement> {
        let params = serde_json::to_value(&request)?;
        let guard = self.begin_mutation().await?;
        let result = self.create_inner(&request).await;

        let record = match &result {
            Ok(element) => {
                CanvasOperation::caller(OperationKind::Create, Some(element.id), params)
                    .with_outcome(OperationOutcome::Success(
                        serde_json::json!({"element": element.id.to_string()}),
                    ))
            }
            Err(e) => CanvasOperation::caller(OperationKind::Create, None, params)
                .with_outcome(OperationOutcome::Failure(e.to_string())),
        };
        // Append while still holding the mutation stream, so log order
        // always matches commit order.
        self.log_record(record);
        drop(guard);
        result
    }

    /// Apply transform, state or content changes to one element.
    ///
    /// An explicit transform is honored as given: it is validated against
    /// the boundary and the reserved zones, not replanned. A relative
    /// transform whose reference chain would loop back through the element
    /// is rejected before anything is stored.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] for unknown elements or
    /// transforms that land on reserved zones, and adapter errors when the
    /// surface no longer exists.
    pub async fn request_modify(
        &self,
        id: ElementId,
        changes: ElementChanges,
    ) -> CanvasResult<()> {
        let params = serde_json::to_value(&changes)?;
        let guard = self.begin_mutation().await?;
        let result = self.modify_inner(id, &changes).await;
        self.log_result(OperationKind::Modify, Some(id), params, &result);
        drop(guard);
        result
    }

    /// Remove one element, replanning the layout for the survivors.
    ///
    /// Idempotent: removing an id with no canonical element left is a
    /// logged no-op, matching the adapter contract's removal semantics.
    ///
    /// # Errors
    ///
    /// Returns an adapter error if the substrate rejects the removal for
    /// any reason other than the surface already being gone.
    pub async fn request_remove(&self, id: ElementId) -> CanvasResult<()> {
        let guard = self.begin_mutation().await?;
        let result = self.remove_inner(id).await;
        self.log_result(
            OperationKind::Remove,
            Some(id),
            serde_json::Value::Null,
            &result,
        );
        drop(guard);
        result
    }

    /// Give one element focus, clearing it from the others.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Validation`] for unknown elements or when
    /// the substrate does not support focus.
    pub async fn request_focus(&self, id: ElementId) -> CanvasResult<()> {
        let guard = self.begin_mutation().await?;
        let result = self.focus_inner(id).await;
        self.log_result(
            OperationKind::Focus,
            Some(id),
            serde_json::Value::Null,
            &result,
        );
        drop(guard);
        result
    }

    /// Remove every managed element. Unmanaged surfaces are untouched.
    ///
    /// Logs one removal record per element plus a closing clear record.
    ///
    /// # Errors
    ///
    /// Returns an adapter error if the substrate rejects a removal;
    /// elements removed before the failure stay removed.
    pub async fn request_clear(&self) -> CanvasResult<usize> {
        let guard = self.begin_mutation().await?;
        let result = self.clear_inner().await;
        let record = match &result {
            Ok(removed) => {
                CanvasOperation::caller(OperationKind::Clear, None, serde_json::Value::Null)
                    .with_outcome(OperationOutcome::Success(
                        serde_json::json!({"removed": removed}),
                    ))
            }
            Err(e) => {
                CanvasOperation::caller(OperationKind::Clear, None, serde_json::Value::Null)
                    .with_outcome(OperationOutcome::Failure(e.to_string()))
            }
        };
        self.log_record(record);
        drop(guard);
        result
    }

    /// Replace canonical state with substrate ground truth.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::AdapterInit`] if the substrate cannot be
    /// read.
    pub async fn force_resync(&self) -> CanvasResult<Canvas> {
        let guard = self.begin_mutation().await?;
        let result = self.resync_inner().await;
        let record = match &result {
            Ok(canvas) => {
                CanvasOperation::caller(OperationKind::Resync, None, serde_json::Value::Null)
                    .with_outcome(OperationOutcome::Success(
                        serde_json::json!({"elements": canvas.element_count()}),
                    ))
            }
            Err(e) => {
                CanvasOperation::caller(OperationKind::Resync, None, serde_json::Value::Null)
                    .with_outcome(OperationOutcome::Failure(e.to_string()))
            }
        };
        self.log_record(record);
        drop(guard);
        result
    }

    /// Tear the engine down: stop watching, release the adapter, reject
    /// every further request. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an adapter error if the substrate rejects the teardown; the
    /// engine is destroyed regardless.
    pub async fn destroy(&self) -> CanvasResult<()> {
        let _lock = self.inner.mutation.lock().await;
        if self.inner.state.swap(STATE_DESTROYED, Ordering::SeqCst) == STATE_DESTROYED {
            return Ok(());
        }
        self.inner.monitor.stop();
        if let Ok(mut slot) = self.inner.reconcile.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let result = self.inner.adapter.destroy().await;
        let outcome = match &result {
            Ok(()) => OperationOutcome::Success(serde_json::Value::Null),
            Err(e) => OperationOutcome::Failure(e.to_string()),
        };
        self.log_record(
            CanvasOperation::caller(
                OperationKind::Custom,
                None,
                serde_json::json!({"action": "destroy"}),
            )
            .with_outcome(outcome),
        );
        tracing::info!("canvas engine destroyed");
        result
    }

    async fn create_inner(&self, request: &CreateRequest) -> CanvasResult<CanvasElement> {
        let content = request
            .content
            .clone()
            .map(|c| normalize_content(c, &self.inner.config.default_url_scheme))
            .transpose()?;

        if let Some(hint) = &request.transform_hint {
            return self.create_at_hint(request, hint, content).await;
        }

        let (boundary, mut constraints, mut entries) = {
            let shared = self.read_shared()?;
            let entries: Vec<LayoutEntry> = shared
                .canvas
                .elements()
                .map(|e| LayoutEntry {
                    id: e.id,
                    created_at: e.created_at,
                    slot: shared.slots.get(&e.id).copied().unwrap_or_default(),
                })
                .collect();
            (
                shared.canvas.boundaries.region.clone(),
                shared.canvas.constraints.clone(),
                entries,
            )
        };
        // Requested constraints participate in planning but only land on
        // the canvas once the create commits.
        constraints.extend(request.constraints.iter().cloned());

        // Plan with a pending id; the adapter assigns the real one.
        let pending = ElementId::new();
        entries.push(LayoutEntry {
            id: pending,
            created_at: now_ms(),
            slot: request.slot,
        });
        let plan = self.inner.planner.plan(&boundary, &constraints, &entries)?;
        let placement = plan.placement(pending).ok_or_else(|| {
            CanvasError::LayoutInfeasible("no placement produced for new element".to_string())
        })?;

        let element = self
            .inner
            .adapter
            .create_element(CreateParams {
                element_type: request.element_type.clone(),
                content,
                transform: CanvasTransform::from_region(&placement.region),
                state: request.state.clone(),
            })
            .await?;

        if let Err(e) = self
            .commit_create(request, Some((&plan, pending)), &element, placement.overflows)
            .await
        {
            self.rollback_surface(&element).await;
            return Err(e);
        }
        tracing::info!(element = %element.id, "created element");
        Ok(element)
    }

    /// Honor an explicit transform hint: validate it, materialize the
    /// surface there, and leave the other elements where they are.
    async fn create_at_hint(
        &self,
        request: &CreateRequest,
        hint: &CanvasTransform,
        content: Option<ElementContent>,
    ) -> CanvasResult<CanvasElement> {
        let region = {
            let shared = self.read_shared()?;
            let region = shared.canvas.resolve_region(hint)?;
            if !shared.canvas.boundaries.region.contains_region(&region)? {
                return Err(CanvasError::Validation(
                    "transform hint places the element outside the canvas boundaries".to_string(),
                ));
            }
            let mut constraints = shared.canvas.constraints.clone();
            constraints.extend(request.constraints.iter().cloned());
            if !reserved_violations(&region, &constraints)?.is_empty() {
                return Err(CanvasError::Validation(
                    "transform hint places the element on a reserved zone".to_string(),
                ));
            }
            region
        };

        let element = self
            .inner
            .adapter
            .create_element(CreateParams {
                element_type: request.element_type.clone(),
                content,
                transform: CanvasTransform::from_region(&region),
                state: request.state.clone(),
            })
            .await?;

        if let Err(e) = self.commit_create(request, None, &element, false).await {
            self.rollback_surface(&element).await;
            return Err(e);
        }
        tracing::info!(element = %element.id, "created element at hinted transform");
        Ok(element)
    }

    /// Fold a freshly created surface into canonical state: move the
    /// survivors per the plan, then admit the element along with any
    /// constraints its request carried. Nothing the request asked for is
    /// committed on the error path.
    async fn commit_create(
        &self,
        request: &CreateRequest,
        plan: Option<(&LayoutPlan, ElementId)>,
        element: &CanvasElement,
        overflows: bool,
    ) -> CanvasResult<()> {
        if let Some((plan, pending)) = plan {
            self.apply_plan(plan, pending).await?;
        }
        let mut shared = self.write_shared()?;
        if overflows {
            shared.canvas.boundaries.exempt(element.id);
        }
        if let Err(e) = shared.canvas.add_element(element.clone()) {
            shared.canvas.boundaries.unexempt(element.id);
            return Err(e);
        }
        for constraint in &request.constraints {
            shared.canvas.add_constraint(constraint.clone());
        }
        shared.slots.insert(element.id, request.slot);
        Ok(())
    }

    /// Best-effort removal of a surface whose create could not be
    /// committed; otherwise it would linger on the substrate flagged
    /// managed but invisible to canonical state.
    async fn rollback_surface(&self, element: &CanvasElement) {
        if let Err(e) = self.inner.adapter.remove_element(element).await {
            tracing::warn!(
                element = %element.id,
                error = %e,
                "uncommitted surface could not be removed"
            );
        }
    }

    async fn modify_inner(&self, id: ElementId, changes: &ElementChanges) -> CanvasResult<()> {
        let content = changes
            .content
            .clone()
            .map(|c| normalize_content(c, &self.inner.config.default_url_scheme))
            .transpose()?;

        let (element, resolved) = {
            let shared = self.read_shared()?;
            let element = shared
                .canvas
                .element(id)
                .cloned()
                .ok_or_else(|| CanvasError::Validation(format!("unknown element id: {id}")))?;
            let resolved = match &changes.transform {
                Some(transform) => {
                    let region = shared.canvas.resolve_region_for(id, transform)?;
                    if !shared.canvas.boundaries.region.contains_region(&region)? {
                        return Err(CanvasError::Validation(format!(
                            "transform places element {id} outside the canvas boundaries"
                        )));
                    }
                    if !reserved_violations(&region, &shared.canvas.constraints)?.is_empty() {
                        return Err(CanvasError::Validation(format!(
                            "transform places element {id} on a reserved zone"
                        )));
                    }
                    Some(region)
                }
                None => None,
            };
            (element, resolved)
        };

        // The adapter only sees absolute pixels; the caller's units stay
        // canonical.
        let adapter_changes = ElementChanges {
            transform: resolved
                .as_ref()
                .map(CanvasTransform::from_region),
            state: changes.state.clone(),
            content: content.clone(),
        };
        self.inner
            .adapter
            .modify_element(&element, &adapter_changes)
            .await?;

        let mut shared = self.write_shared()?;
        if resolved.is_some() {
            shared.canvas.boundaries.unexempt(id);
        }
        if changes.state.as_ref().and_then(|s| s.focused) == Some(true) {
            let others: Vec<ElementId> = shared
                .canvas
                .elements()
                .map(|e| e.id)
                .filter(|other| *other != id)
                .collect();
            for other in others {
                if let Some(e) = shared.canvas.element_mut(other) {
                    e.state.focused = false;
                }
            }
        }
        if let Some(e) = shared.canvas.element_mut(id) {
            if let Some(transform) = &changes.transform {
                e.transform = transform.clone();
            }
            if let Some(state_changes) = &changes.state {
                state_changes.apply(&mut e.state);
            }
            if let Some(content) = content {
                e.content = Some(content);
            }
        }
        tracing::debug!(element = %id, "modified element");
        Ok(())
    }

    async fn remove_inner(&self, id: ElementId) -> CanvasResult<()> {
        // Removal is idempotent end to end: an id with no canonical
        // element left to delete is a logged no-op, not an error.
        let Some(element) = self.read_shared()?.canvas.element(id).cloned() else {
            tracing::debug!(element = %id, "no canonical element to remove; no-op");
            return Ok(());
        };

        self.inner.adapter.remove_element(&element).await?;

        let (boundary, constraints, entries) = {
            let mut shared = self.write_shared()?;
            shared.canvas.remove_element(id)?;
            shared.slots.remove(&id);
            let entries: Vec<LayoutEntry> = shared
                .canvas
                .elements()
                .map(|e| LayoutEntry {
                    id: e.id,
                    created_at: e.created_at,
                    slot: shared.slots.get(&e.id).copied().unwrap_or_default(),
                })
                .collect();
            (
                shared.canvas.boundaries.region.clone(),
                shared.canvas.constraints.clone(),
                entries,
            )
        };

        if !entries.is_empty() {
            let plan = self.inner.planner.plan(&boundary, &constraints, &entries)?;
            self.apply_plan(&plan, id).await?;
        }
        tracing::info!(element = %id, "removed element");
        Ok(())
    }

    async fn focus_inner(&self, id: ElementId) -> CanvasResult<()> {
        let element = {
            let shared = self.read_shared()?;
            if !shared.canvas.capabilities.supports_focus {
                return Err(CanvasError::Validation(
                    "substrate does not support focus".to_string(),
                ));
            }
            shared
                .canvas
                .element(id)
                .cloned()
                .ok_or_else(|| CanvasError::Validation(format!("unknown element id: {id}")))?
        };

        let changes = ElementChanges {
            state: Some(crate::element::StateChanges {
                focused: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.inner.adapter.modify_element(&element, &changes).await?;

        let mut shared = self.write_shared()?;
        let ids: Vec<ElementId> = shared.canvas.elements().map(|e| e.id).collect();
        for other in ids {
            if let Some(e) = shared.canvas.element_mut(other) {
                e.state.focused = other == id;
            }
        }
        Ok(())
    }

    async fn clear_inner(&self) -> CanvasResult<usize> {
        let elements: Vec<CanvasElement> =
            self.read_shared()?.canvas.elements().cloned().collect();
        let mut removed = 0;
        for element in &elements {
            self.inner.adapter.remove_element(element).await?;
            {
                let mut shared = self.write_shared()?;
                shared.canvas.remove_element(element.id)?;
                shared.slots.remove(&element.id);
            }
            // One record per element, so a mid-clear failure still leaves
            // a trail of what was actually removed.
            self.log_record(
                CanvasOperation::caller(
                    OperationKind::Remove,
                    Some(element.id),
                    serde_json::json!({"via": "clear"}),
                )
                .with_outcome(OperationOutcome::Success(serde_json::Value::Null)),
            );
            removed += 1;
        }
        tracing::info!(removed, "cleared canvas");
        Ok(removed)
    }

    async fn resync_inner(&self) -> CanvasResult<Canvas> {
        let canvas = self.inner.adapter.get_canvas_state().await?;
        let mut shared = self.write_shared()?;
        shared
            .slots
            .retain(|id, _| canvas.contains(*id));
        shared.canvas = canvas.clone();
        tracing::info!(elements = canvas.element_count(), "resynced from substrate");
        Ok(canvas)
    }

    /// Move every planned element except `skip` into its cell.
    async fn apply_plan(&self, plan: &LayoutPlan, skip: ElementId) -> CanvasResult<()> {
        for placement in &plan.placements {
            if placement.id == skip {
                continue;
            }
            let (element, current) = {
                let shared = self.read_shared()?;
                let Some(element) = shared.canvas.element(placement.id).cloned() else {
                    continue;
                };
                let current = shared.canvas.resolve_region(&element.transform)?;
                (element, current)
            };
            if current == placement.region {
                continue;
            }
            let transform = CanvasTransform::from_region(&placement.region);
            self.inner
                .adapter
                .modify_element(
                    &element,
                    &ElementChanges {
                        transform: Some(transform.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            let mut shared = self.write_shared()?;
            if placement.overflows {
                shared.canvas.boundaries.exempt(placement.id);
            } else {
                shared.canvas.boundaries.unexempt(placement.id);
            }
            if let Some(e) = shared.canvas.element_mut(placement.id) {
                e.transform = transform;
            }
        }
        Ok(())
    }

    /// Consume monitor events, folding substrate-driven changes into
    /// canonical state. Waits out any mutation in flight first, so
    /// reconciliation never interleaves with a caller's request.
    async fn reconcile_loop(self, mut events: mpsc::Receiver<ReconcileEvent>) {
        while let Some(event) = events.recv().await {
            if self.state() == EngineState::Destroyed {
                break;
            }
            let _lock = self.inner.mutation.lock().await;
            if let Err(e) = self.reconcile(event) {
                tracing::warn!(error = %e, "reconciliation failed");
            }
        }
    }

    fn reconcile(&self, event: ReconcileEvent) -> CanvasResult<()> {
        match event {
            ReconcileEvent::SurfaceVanished {
                element,
                surface_id,
            } => {
                let mut shared = self.write_shared()?;
                if !shared.canvas.contains(element) {
                    return Ok(());
                }
                shared.canvas.remove_element(element)?;
                shared.slots.remove(&element);
                drop(shared);
                tracing::info!(element = %element, surface = %surface_id, "surface closed on the substrate");
                self.log_record(
                    CanvasOperation::substrate(
                        OperationKind::Remove,
                        Some(element),
                        serde_json::json!({"surface_id": surface_id}),
                    )
                    .with_outcome(OperationOutcome::Success(serde_json::Value::Null)),
                );
            }
            ReconcileEvent::SurfaceMoved { element, bounds } => {
                let mut shared = self.write_shared()?;
                let Some(e) = shared.canvas.element(element) else {
                    return Ok(());
                };
                // Engine-driven moves are already canonical; only genuine
                // drift gets reconciled.
                if shared.canvas.resolve_region(&e.transform)? == bounds {
                    return Ok(());
                }
                if shared.canvas.boundaries.region.contains_region(&bounds)? {
                    shared.canvas.boundaries.unexempt(element);
                } else {
                    // Dragged off-screen; ground truth wins over the
                    // containment invariant.
                    shared.canvas.boundaries.exempt(element);
                }
                let transform = CanvasTransform::from_region(&bounds);
                if let Some(e) = shared.canvas.element_mut(element) {
                    e.transform = transform;
                }
                drop(shared);
                self.log_record(
                    CanvasOperation::substrate(
                        OperationKind::Modify,
                        Some(element),
                        serde_json::json!({
                            "origin": bounds.origin,
                            "extent": bounds.extent,
                        }),
                    )
                    .with_outcome(OperationOutcome::Success(serde_json::Value::Null)),
                );
            }
            ReconcileEvent::FocusChanged { element } => {
                let mut shared = self.write_shared()?;
                if shared
                    .canvas
                    .element(element)
                    .is_none_or(|e| e.state.focused)
                {
                    return Ok(());
                }
                let ids: Vec<ElementId> = shared.canvas.elements().map(|e| e.id).collect();
                for other in ids {
                    if let Some(e) = shared.canvas.element_mut(other) {
                        e.state.focused = other == element;
                    }
                }
                drop(shared);
                self.log_record(
                    CanvasOperation::substrate(
                        OperationKind::Focus,
                        Some(element),
                        serde_json::Value::Null,
                    )
                    .with_outcome(OperationOutcome::Success(serde_json::Value::Null)),
                );
            }
        }
        Ok(())
    }

    fn check_alive(&self) -> CanvasResult<()> {
        if self.state() == EngineState::Destroyed {
            Err(CanvasError::EngineDestroyed)
        } else {
            Ok(())
        }
    }

    async fn begin_mutation(&self) -> CanvasResult<MutationGuard<'_>> {
        self.check_alive()?;
        let lock = self.inner.mutation.lock().await;
        // The engine may have been destroyed while this request queued.
        self.check_alive()?;
        self.inner.state.store(STATE_MUTATING, Ordering::SeqCst);
        Ok(MutationGuard {
            _lock: lock,
            state: &self.inner.state,
        })
    }

    fn log_result<T>(
        &self,
        kind: OperationKind,
        target: Option<ElementId>,
        params: serde_json::Value,
        result: &CanvasResult<T>,
    ) {
        let outcome = match result {
            Ok(_) => OperationOutcome::Success(serde_json::Value::Null),
            Err(e) => OperationOutcome::Failure(e.to_string()),
        };
        self.log_record(CanvasOperation::caller(kind, target, params).with_outcome(outcome));
    }

    fn log_record(&self, record: CanvasOperation) {
        if let Ok(mut log) = self.inner.log.write() {
            log.append(record);
        }
    }

    fn read_shared(&self) -> CanvasResult<RwLockReadGuard<'_, Shared>> {
        self.inner
            .shared
            .read()
            .map_err(|_| CanvasError::Validation("engine state lock poisoned".to_string()))
    }

    fn write_shared(&self) -> CanvasResult<RwLockWriteGuard<'_, Shared>> {
        self.inner
            .shared
            .write()
            .map_err(|_| CanvasError::Validation("engine state lock poisoned".to_string()))
    }

    fn read_log(&self) -> CanvasResult<RwLockReadGuard<'_, OperationLog>> {
        self.inner
            .log
            .read()
            .map_err(|_| CanvasError::Validation("operation log lock poisoned".to_string()))
    }
}

/// Normalize URL content: bare hosts get the configured default scheme,
/// anything unparseable is rejected before it reaches the adapter.
fn normalize_content(content: ElementContent, default_scheme: &str) -> CanvasResult<ElementContent> {
    match content {
        ElementContent::Url(raw) => {
            let normalized = match url::Url::parse(&raw) {
                Ok(_) => raw,
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    let candidate = format!("{default_scheme}://{raw}");
                    url::Url::parse(&candidate).map_err(|e| {
                        CanvasError::Validation(format!(
                            "cannot normalize content source {raw:?}: {e}"
                        ))
                    })?;
                    candidate
                }
                Err(e) => {
                    return Err(CanvasError::Validation(format!(
                        "invalid content source {raw:?}: {e}"
                    )))
                }
            };
            Ok(ElementContent::Url(normalized))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::{DesktopAdapter, DesktopShell};

    async fn engine() -> CanvasEngine {
        let adapter = Arc::new(DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)));
        CanvasEngine::initialize(adapter, EngineConfig::default())
            .await
            .expect("should initialize")
    }

    #[test]
    fn test_normalize_bare_host() {
        let normalized = normalize_content(
            ElementContent::Url("example.com/dashboard".to_string()),
            "https",
        )
        .expect("should normalize");
        assert_eq!(
            normalized,
            ElementContent::Url("https://example.com/dashboard".to_string())
        );
    }

    #[test]
    fn test_normalize_keeps_explicit_scheme() {
        let normalized = normalize_content(
            ElementContent::Url("http://example.com".to_string()),
            "https",
        )
        .expect("should normalize");
        assert_eq!(
            normalized,
            ElementContent::Url("http://example.com".to_string())
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = normalize_content(ElementContent::Url("http://[bad".to_string()), "https")
            .unwrap_err();
        assert!(matches!(err, CanvasError::Validation(_)));
    }

    #[test]
    fn test_normalize_passes_components_through() {
        let content = ElementContent::Component {
            name: "notes".to_string(),
            props: serde_json::Value::Null,
        };
        let normalized =
            normalize_content(content.clone(), "https").expect("should pass through");
        assert_eq!(normalized, content);
    }

    #[tokio::test]
    async fn test_initialize_is_ready() {
        let engine = engine().await;
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.snapshot().expect("alive").is_empty());
    }

    #[tokio::test]
    async fn test_destroy_is_terminal_and_idempotent() {
        let engine = engine().await;
        engine
            .request_create(CreateRequest::new("window"))
            .await
            .expect("should create");

        engine.destroy().await.expect("first destroy");
        engine.destroy().await.expect("second destroy is a no-op");

        assert_eq!(engine.state(), EngineState::Destroyed);
        assert!(matches!(
            engine.snapshot(),
            Err(CanvasError::EngineDestroyed)
        ));
        assert!(matches!(
            engine.request_create(CreateRequest::new("window")).await,
            Err(CanvasError::EngineDestroyed)
        ));
    }

    #[tokio::test]
    async fn test_failed_create_is_logged() {
        let engine = engine().await;
        let request = CreateRequest::new("window")
            .with_content(ElementContent::Url("http://[bad".to_string()));
        engine.request_create(request).await.unwrap_err();

        let operations = engine.operations().expect("alive");
        let last = operations.last().expect("logged");
        assert_eq!(last.kind, OperationKind::Create);
        assert!(!last.outcome.is_success());
    }

    #[tokio::test]
    async fn test_remove_unknown_element_is_logged_noop() {
        let engine = engine().await;
        engine
            .request_remove(ElementId::new())
            .await
            .expect("remove of unknown id is a no-op");

        let operations = engine.operations().expect("alive");
        let removes: Vec<_> = operations
            .iter()
            .filter(|op| op.kind == OperationKind::Remove)
            .collect();
        assert_eq!(removes.len(), 1);
        assert!(removes[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_modify_rejects_reserved_overlap() {
        let adapter = Arc::new(
            DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)).with_constraints(vec![
                crate::constraint::Constraint::new(
                    crate::constraint::ConstraintKind::Reserved,
                    crate::region::Region::rect(0.0, 0.0, 1280.0, 40.0).expect("valid"),
                ),
            ]),
        );
        let engine = CanvasEngine::initialize(adapter, EngineConfig::default())
            .await
            .expect("should initialize");
        let element = engine
            .request_create(CreateRequest::new("window"))
            .await
            .expect("should create");

        let changes = ElementChanges {
            transform: Some(CanvasTransform::from_region(
                &crate::region::Region::rect(0.0, 0.0, 200.0, 200.0).expect("valid"),
            )),
            ..Default::default()
        };
        let err = engine.request_modify(element.id, changes).await.unwrap_err();
        assert!(matches!(err, CanvasError::Validation(_)));
    }
}
