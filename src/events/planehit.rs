//! Normalized input events.

use crate::components::props::PropMap;
use serde::{Deserialize, Serialize};

/// One normalized input event from an external adapter (mouse, laser,
/// tracked object). Coordinates are `[0, 1]` over the play plane; the
/// session scales to game pixels. `latency_ms` is measured by the input
/// layer and drives rollback for physical installations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneHitEvent {
    pub x: f64,
    pub y: f64,
    /// Simulation-second the hit actually happened.
    pub timestamp: f64,
    pub confidence: f64,
    /// Input method: `mouse`, `laser`, `object`, ...
    pub method: String,
    pub latency_ms: f64,
    pub metadata: PropMap,
}

impl PlaneHitEvent {
    /// Minimal event for tests and the mouse path.
    pub fn at(x: f64, y: f64, timestamp: f64) -> Self {
        Self {
            x,
            y,
            timestamp,
            confidence: 1.0,
            method: "mouse".to_string(),
            latency_ms: 0.0,
            metadata: PropMap::default(),
        }
    }
}
