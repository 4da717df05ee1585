//! Simulation clock resource.

use bevy_ecs::prelude::Resource;
use log::warn;
use serde::{Deserialize, Serialize};

/// Fallback delta when a caller supplies a broken `dt`.
pub const DEFAULT_DT: f64 = 1.0 / 60.0;

/// Monotonic simulation time. Seconds, double precision.
#[derive(Debug, Clone, Copy, Resource, Serialize, Deserialize)]
pub struct SimTime {
    /// Seconds since level start.
    pub elapsed: f64,
    /// Delta consumed by the current frame.
    pub delta: f64,
    pub frame: u64,
    /// Upper bound on a single frame's delta; keeps integration stable
    /// across pauses and tab throttling.
    pub dt_cap: f64,
}

impl Default for SimTime {
    fn default() -> Self {
        Self {
            elapsed: 0.0,
            delta: 0.0,
            frame: 0,
            dt_cap: 0.25,
        }
    }
}

impl SimTime {
    /// Advance by `dt`, coercing non-finite or negative values and
    /// clamping to `dt_cap`.
    pub fn advance(&mut self, dt: f64) {
        let dt = if !dt.is_finite() || dt < 0.0 {
            warn!("invalid dt {dt}; using default frame delta");
            DEFAULT_DT
        } else if dt > self.dt_cap {
            warn!("dt {dt:.4}s exceeds cap {:.4}s; clamping", self.dt_cap);
            self.dt_cap
        } else {
            dt
        };
        self.delta = dt;
        self.elapsed += dt;
        self.frame += 1;
    }
}
