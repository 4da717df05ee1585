//! Health component.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Hit points. `max_hits` is remembered for the `damage_ratio` computed
/// property; reaching zero does not destroy by itself; that is up to the
/// game's scripts and transforms.
#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize)]
pub struct Health {
    pub hits: i64,
    pub max_hits: i64,
}

impl Health {
    pub fn new(hits: i64) -> Self {
        Self {
            hits,
            max_hits: hits.max(1),
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.max_hits <= 0 {
            return 0.0;
        }
        self.hits as f64 / self.max_hits as f64
    }
}
