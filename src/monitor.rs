//! Substrate state monitor.
//!
//! Keeps the authoritative list of every surface on the substrate, managed
//! or not, and turns substrate-driven changes into reconciliation events
//! for the engine. One monitor exists per engine instance; it starts when
//! the engine becomes ready and stops when the engine is destroyed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::{CanvasAdapter, RawSurface, SubstrateEvent};
use crate::element::ElementId;
use crate::region::Region;

/// Capacity of the reconcile event channel.
const RECONCILE_CHANNEL_CAPACITY: usize = 64;

/// A change the engine must reconcile into canonical state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// A managed element's underlying surface disappeared outside the
    /// engine's control.
    SurfaceVanished {
        /// The element whose surface is gone.
        element: ElementId,
        /// The substrate surface that backed it.
        surface_id: String,
    },
    /// A managed element's surface was moved or resized outside the
    /// engine's control.
    SurfaceMoved {
        /// The element whose surface moved.
        element: ElementId,
        /// The surface's new bounds.
        bounds: Region,
    },
    /// Focus changed on a managed element's surface.
    FocusChanged {
        /// The element whose surface took focus.
        element: ElementId,
    },
}

/// Watches one substrate through its adapter.
///
/// Combines the adapter's push notifications with interval polling of
/// [`CanvasAdapter::list_surfaces`]; polling catches anything the push
/// channel misses or lags on.
pub struct SubstrateMonitor {
    surfaces: Arc<RwLock<Vec<RawSurface>>>,
    handle: JoinHandle<()>,
}

impl SubstrateMonitor {
    /// Start monitoring. Returns the monitor and the channel the engine
    /// consumes reconciliation events from.
    #[must_use]
    pub fn start(
        adapter: Arc<dyn CanvasAdapter>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<ReconcileEvent>) {
        let (tx, rx) = mpsc::channel(RECONCILE_CHANNEL_CAPACITY);
        // Subscribe before spawning so events emitted between this call
        // and the task's first poll are buffered, not lost.
        let events = adapter.monitor_changes();
        let surfaces = Arc::new(RwLock::new(Vec::new()));
        let task_surfaces = Arc::clone(&surfaces);
        let handle = tokio::spawn(async move {
            run(adapter, events, poll_interval, tx, task_surfaces).await;
        });
        (Self { surfaces, handle }, rx)
    }

    /// The last observed surface list: every surface on the substrate,
    /// each tagged with whether the engine manages it.
    #[must_use]
    pub fn surfaces(&self) -> Vec<RawSurface> {
        self.surfaces.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Stop watching. The reconcile channel closes once the task exits.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SubstrateMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    adapter: Arc<dyn CanvasAdapter>,
    mut events: tokio::sync::broadcast::Receiver<SubstrateEvent>,
    poll_interval: Duration,
    tx: mpsc::Sender<ReconcileEvent>,
    shared: Arc<RwLock<Vec<RawSurface>>>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Surfaces keyed by substrate id, and managed elements already
    // reported gone, so a push event and the next poll never produce a
    // duplicate reconciliation.
    let mut known: HashMap<String, RawSurface> = HashMap::new();
    let mut reported_gone: HashSet<ElementId> = HashSet::new();
    let mut push_open = true;

    loop {
        let reconcile = tokio::select! {
            event = events.recv(), if push_open => match event {
                Ok(event) => on_push(&mut known, &mut reported_gone, event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "substrate event stream lagged; polling will catch up");
                    None
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("substrate push channel closed; polling only");
                    push_open = false;
                    None
                }
            },
            _ = interval.tick() => {
                match adapter.list_surfaces().await {
                    Ok(current) => {
                        let vanished = diff_vanished(&known, &current, &mut reported_gone);
                        known = current
                            .iter()
                            .map(|s| (s.surface_id.clone(), s.clone()))
                            .collect();
                        publish(&shared, &known);
                        for event in vanished {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "substrate poll failed");
                        None
                    }
                }
            }
        };

        if let Some(event) = reconcile {
            publish(&shared, &known);
            if tx.send(event).await.is_err() {
                return;
            }
        } else {
            publish(&shared, &known);
        }
    }
}

/// Fold one push notification into the surface table, producing a
/// reconciliation event when it concerns a managed element.
fn on_push(
    known: &mut HashMap<String, RawSurface>,
    reported_gone: &mut HashSet<ElementId>,
    event: SubstrateEvent,
) -> Option<ReconcileEvent> {
    match event {
        SubstrateEvent::SurfaceCreated(surface) => {
            known.insert(surface.surface_id.clone(), surface);
            None
        }
        SubstrateEvent::SurfaceMoved { surface_id, bounds } => {
            let surface = known.get_mut(&surface_id)?;
            surface.bounds = bounds.clone();
            surface
                .managed
                .map(|element| ReconcileEvent::SurfaceMoved { element, bounds })
        }
        SubstrateEvent::SurfaceClosed {
            surface_id,
            element,
        } => {
            known.remove(&surface_id);
            let element = element?;
            reported_gone
                .insert(element)
                .then_some(ReconcileEvent::SurfaceVanished {
                    element,
                    surface_id,
                })
        }
        SubstrateEvent::SurfaceFocused { surface_id } => {
            for surface in known.values_mut() {
                surface.focused = surface.surface_id == surface_id;
            }
            known
                .get(&surface_id)
                .and_then(|s| s.managed)
                .map(|element| ReconcileEvent::FocusChanged { element })
        }
    }
}

/// Managed surfaces present in the previous poll but absent now.
fn diff_vanished(
    known: &HashMap<String, RawSurface>,
    current: &[RawSurface],
    reported_gone: &mut HashSet<ElementId>,
) -> Vec<ReconcileEvent> {
    let current_ids: HashSet<&str> = current.iter().map(|s| s.surface_id.as_str()).collect();
    let mut vanished = Vec::new();
    for surface in known.values() {
        if current_ids.contains(surface.surface_id.as_str()) {
            continue;
        }
        let Some(element) = surface.managed else {
            continue;
        };
        if reported_gone.insert(element) {
            vanished.push(ReconcileEvent::SurfaceVanished {
                element,
                surface_id: surface.surface_id.clone(),
            });
        }
    }
    // Deterministic delivery order regardless of hash iteration.
    vanished.sort_by(|a, b| match (a, b) {
        (
            ReconcileEvent::SurfaceVanished { surface_id: a, .. },
            ReconcileEvent::SurfaceVanished { surface_id: b, .. },
        ) => a.cmp(b),
        _ => std::cmp::Ordering::Equal,
    });
    vanished
}

fn publish(shared: &Arc<RwLock<Vec<RawSurface>>>, known: &HashMap<String, RawSurface>) {
    if let Ok(mut surfaces) = shared.write() {
        let mut list: Vec<RawSurface> = known.values().cloned().collect();
        list.sort_by(|a, b| b.z_order.cmp(&a.z_order));
        *surfaces = list;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CreateParams;
    use crate::desktop::{DesktopAdapter, DesktopShell};
    use crate::element::{CanvasTransform, ElementState};

    fn create_params(x: f64, y: f64, w: f64, h: f64) -> CreateParams {
        CreateParams {
            element_type: "window".to_string(),
            content: None,
            transform: CanvasTransform::from_region(&Region::rect(x, y, w, h).expect("valid")),
            state: ElementState::default(),
        }
    }

    #[tokio::test]
    async fn test_vanished_surface_emits_reconcile_event() {
        let adapter = Arc::new(DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)));
        let element = adapter
            .create_element(create_params(0.0, 0.0, 640.0, 800.0))
            .await
            .expect("should create");
        let window = adapter
            .shell()
            .window_for_element(element.id)
            .expect("lock ok")
            .expect("window exists");

        let (monitor, mut rx) = SubstrateMonitor::start(
            Arc::clone(&adapter) as Arc<dyn CanvasAdapter>,
            Duration::from_millis(10),
        );

        adapter.shell().close_window(window.window_id).expect("lock ok");

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("monitor should report in time")
            .expect("channel open");
        assert_eq!(
            event,
            ReconcileEvent::SurfaceVanished {
                element: element.id,
                surface_id: window.window_id.to_string(),
            }
        );
        monitor.stop();
    }

    #[tokio::test]
    async fn test_vanished_surface_reported_once() {
        let adapter = Arc::new(DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)));
        let element = adapter
            .create_element(create_params(0.0, 0.0, 640.0, 800.0))
            .await
            .expect("should create");
        let window = adapter
            .shell()
            .window_for_element(element.id)
            .expect("lock ok")
            .expect("window exists");

        let (monitor, mut rx) = SubstrateMonitor::start(
            Arc::clone(&adapter) as Arc<dyn CanvasAdapter>,
            Duration::from_millis(5),
        );
        adapter.shell().close_window(window.window_id).expect("lock ok");

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("first report")
            .expect("channel open");
        assert!(matches!(first, ReconcileEvent::SurfaceVanished { .. }));

        // Several poll ticks later there is still only the one report.
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "duplicate reconcile event: {second:?}");
        monitor.stop();
    }

    #[tokio::test]
    async fn test_surfaces_tracks_unmanaged_windows() {
        let adapter = Arc::new(DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)));
        adapter
            .shell()
            .open_unmanaged("Terminal", Region::rect(0.0, 0.0, 300.0, 300.0).expect("valid"))
            .expect("should open");
        adapter
            .create_element(create_params(400.0, 0.0, 300.0, 300.0))
            .await
            .expect("should create");

        let (monitor, _rx) = SubstrateMonitor::start(
            Arc::clone(&adapter) as Arc<dyn CanvasAdapter>,
            Duration::from_millis(5),
        );

        // Wait for at least one poll.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let surfaces = monitor.surfaces();
        assert_eq!(surfaces.len(), 2);
        assert_eq!(surfaces.iter().filter(|s| s.is_managed()).count(), 1);
        monitor.stop();
    }

    #[tokio::test]
    async fn test_user_move_emits_moved_event() {
        let adapter = Arc::new(DesktopAdapter::new(DesktopShell::new(1280.0, 800.0)));
        let element = adapter
            .create_element(create_params(0.0, 0.0, 640.0, 800.0))
            .await
            .expect("should create");
        let window = adapter
            .shell()
            .window_for_element(element.id)
            .expect("lock ok")
            .expect("window exists");

        let (monitor, mut rx) = SubstrateMonitor::start(
            Arc::clone(&adapter) as Arc<dyn CanvasAdapter>,
            Duration::from_millis(10),
        );
        // Let the first poll learn the surface table before pushing.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let bounds = Region::rect(10.0, 10.0, 640.0, 700.0).expect("valid");
        adapter
            .shell()
            .move_window(window.window_id, bounds.clone())
            .expect("lock ok");

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("monitor should report in time")
            .expect("channel open");
        assert_eq!(
            event,
            ReconcileEvent::SurfaceMoved {
                element: element.id,
                bounds,
            }
        );
        monitor.stop();
    }
}
