//! # Canvas Engine
//!
//! Substrate-agnostic workspace orchestration: a canonical canvas of
//! elements, deterministic multi-element layout planning, and adapters
//! that drive the real substrate (desktop windows today, spatial panels
//! tomorrow).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               CanvasEngine                  │
//! │  - mutation stream   - operation log        │
//! ├─────────────────────────────────────────────┤
//! │  Layout Planner   │  Constraint Evaluator   │
//! │  - rule table     │  - reserved zones       │
//! │  - cell repair    │  - placement scoring    │
//! ├─────────────────────────────────────────────┤
//! │  Substrate Monitor │  CanvasAdapter         │
//! │  - poll + push     │  - desktop windows     │
//! │  - reconciliation  │  - spatial (future)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The engine never touches a substrate directly: every surface operation
//! crosses the [`CanvasAdapter`] boundary, and every substrate-driven
//! change (the user moved or closed a real window) comes back through the
//! [`monitor::SubstrateMonitor`] to be reconciled into canonical state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod canvas;
pub mod config;
pub mod constraint;
pub mod desktop;
pub mod element;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod monitor;
pub mod oplog;
pub mod region;

pub use adapter::{CanvasAdapter, CreateParams, ElementChanges, RawSurface, SubstrateEvent};
pub use canvas::{Canvas, CanvasBoundaries, CanvasCapabilities, CanvasId, SubstrateKind};
pub use config::EngineConfig;
pub use constraint::{Constraint, ConstraintId, ConstraintKind};
pub use desktop::{DesktopAdapter, DesktopShell, DesktopWindow};
pub use element::{
    CanvasElement, CanvasTransform, ElementContent, ElementId, ElementState, StateChanges,
};
pub use engine::{CanvasEngine, CreateRequest, EngineState};
pub use error::{CanvasError, CanvasResult};
pub use geometry::{AnchorPoint, Extent, Position, RefMode, Unit};
pub use layout::{LayoutEntry, LayoutPlan, LayoutPlanner, Placement, SlotHint};
pub use monitor::{ReconcileEvent, SubstrateMonitor};
pub use oplog::{CanvasOperation, OperationId, OperationKind, OperationLog, Provenance};
pub use region::Region;

/// Canvas engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
