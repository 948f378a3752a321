//! Error types for canvas operations.

use thiserror::Error;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas operations.
///
/// Validation failures are rejected before any adapter call is made.
/// Adapter failures carry the operation context so callers can decide
/// whether to retry with an adjusted request; the engine itself never
/// retries.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Malformed parameters: dimension mismatch, non-numeric coordinate,
    /// or a reference to an unknown element.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The planner cannot satisfy the active constraints.
    #[error("Layout infeasible: {0}")]
    LayoutInfeasible(String),

    /// The substrate could not be reached during initialization.
    #[error("Adapter initialization failed: {0}")]
    AdapterInit(String),

    /// The substrate rejected element creation.
    #[error("Failed to create element: {reason}")]
    AdapterCreate {
        /// Why the substrate rejected the creation.
        reason: String,
    },

    /// The substrate rejected an element modification.
    #[error("Failed to modify element {element}: {reason}")]
    AdapterModify {
        /// The element the modification targeted.
        element: String,
        /// Why the modification failed.
        reason: String,
    },

    /// The substrate rejected an element removal.
    #[error("Failed to remove element {element}: {reason}")]
    AdapterRemove {
        /// The element the removal targeted.
        element: String,
        /// Why the removal failed.
        reason: String,
    },

    /// An operation was attempted after engine teardown.
    #[error("Engine has been destroyed")]
    EngineDestroyed,

    /// Serialization or deserialization of canvas data failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CanvasError {
    /// Whether this error originated on the substrate side of the
    /// adapter boundary.
    #[must_use]
    pub const fn is_adapter_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterInit(_)
                | Self::AdapterCreate { .. }
                | Self::AdapterModify { .. }
                | Self::AdapterRemove { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CanvasError::Validation("dimension mismatch: 2 vs 3".to_string());
        assert!(err.to_string().contains("dimension mismatch"));

        let err = CanvasError::AdapterModify {
            element: "abc".to_string(),
            reason: "window gone".to_string(),
        };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("window gone"));
    }

    #[test]
    fn test_adapter_error_classification() {
        assert!(CanvasError::AdapterInit("no shell".into()).is_adapter_error());
        assert!(!CanvasError::EngineDestroyed.is_adapter_error());
        assert!(!CanvasError::Validation("bad".into()).is_adapter_error());
    }
}
