//! Lifetime component for automatic destruction.
//!
//! Used by child spawns declaring `lifetime:`; the countdown respects the
//! simulation clock and queues a regular destroy (the `on_destroy`
//! lifecycle still runs) rather than despawning directly.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Seconds left before the entity is destroyed.
#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize)]
pub struct Lifetime {
    pub remaining: f64,
}

impl Lifetime {
    pub fn new(seconds: f64) -> Self {
        Self { remaining: seconds }
    }
}
