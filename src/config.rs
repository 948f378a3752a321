//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default element width in pixels, used by the two-element split when the
/// boundary is too narrow for equal halves.
pub const DEFAULT_ELEMENT_WIDTH: f64 = 530.0;

/// Default substrate poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Tunables for a [`crate::engine::CanvasEngine`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Width an element falls back to when the boundary cannot fit equal
    /// side-by-side halves. Overflow is tolerated rather than failed.
    pub default_element_width: f64,
    /// Minimum acceptable placement score. Placements below this are
    /// reported as infeasible rather than applied.
    pub min_placement_score: f64,
    /// How often the substrate monitor polls ground truth, in milliseconds.
    pub poll_interval_ms: u64,
    /// Scheme prefixed to URL content that arrives without one.
    pub default_url_scheme: String,
}

impl EngineConfig {
    /// The poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_element_width: DEFAULT_ELEMENT_WIDTH,
            min_placement_score: -999.0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_url_scheme: "https".to_string(),
        }
    }
}
