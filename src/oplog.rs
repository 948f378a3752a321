//! Append-only record of every attempted canvas-mutating operation.
//!
//! The log is owned and written exclusively by the engine; callers consume
//! it read-only for context and diagnosis. Records are never mutated after
//! being written, and failures are recorded the same way successes are.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::ElementId;

/// Unique identifier for a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of mutation an operation attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Element creation.
    Create,
    /// Element modification.
    Modify,
    /// Element removal.
    Remove,
    /// Focus change.
    Focus,
    /// Removal of every managed element.
    Clear,
    /// Ground-truth resynchronization.
    Resync,
    /// Engine teardown or substrate-specific operation.
    Custom,
}

/// Who initiated an operation.
///
/// A removal driven by the substrate (the user closed a real window) is
/// recorded as a normal operation with `Substrate` provenance, never as an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Requested through the engine's caller surface.
    Caller,
    /// Observed on the substrate and reconciled into canonical state.
    Substrate,
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail")]
#[serde(rename_all = "lowercase")]
pub enum OperationOutcome {
    /// The operation committed; the payload describes the result.
    Success(serde_json::Value),
    /// The operation failed; canonical state was not advanced beyond
    /// recording this attempt.
    Failure(String),
}

impl OperationOutcome {
    /// Whether the operation committed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// One attempted operation and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasOperation {
    /// Unique identifier.
    pub id: OperationId,
    /// What was attempted.
    pub kind: OperationKind,
    /// The element targeted, when the operation has one.
    pub target: Option<ElementId>,
    /// When the attempt was made, in milliseconds since epoch.
    pub timestamp: u64,
    /// The input parameters, as given by the caller.
    pub params: serde_json::Value,
    /// How the attempt ended.
    pub outcome: OperationOutcome,
    /// Who initiated the attempt.
    pub provenance: Provenance,
}

impl CanvasOperation {
    /// Build a caller-initiated record stamped with the current time.
    #[must_use]
    pub fn caller(kind: OperationKind, target: Option<ElementId>, params: serde_json::Value) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            target,
            timestamp: now_ms(),
            params,
            outcome: OperationOutcome::Success(serde_json::Value::Null),
            provenance: Provenance::Caller,
        }
    }

    /// Build a substrate-initiated record stamped with the current time.
    #[must_use]
    pub fn substrate(kind: OperationKind, target: Option<ElementId>, params: serde_json::Value) -> Self {
        Self {
            provenance: Provenance::Substrate,
            ..Self::caller(kind, target, params)
        }
    }

    /// Set the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: OperationOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// The current timestamp in milliseconds since epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append-only operation log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationLog {
    records: Vec<CanvasOperation>,
}

impl OperationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its ID.
    pub fn append(&mut self, record: CanvasOperation) -> OperationId {
        let id = record.id;
        self.records.push(record);
        id
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[CanvasOperation] {
        &self.records
    }

    /// The most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&CanvasOperation> {
        self.records.last()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
