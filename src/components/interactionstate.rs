//! Per-entity interaction bookkeeping.

use bevy_ecs::prelude::Component;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Edge-detection memory and interval accumulators for one entity.
///
/// `edges` keeps the last filter truth per (interaction index, partner
/// key) pair, where the partner key is the other entity's ID or the
/// pseudo-entity name. `intervals` accumulates elapsed seconds per
/// on-update transform index.
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct InteractionMemory {
    pub edges: FxHashMap<String, bool>,
    pub intervals: FxHashMap<u32, f64>,
}

impl InteractionMemory {
    /// Key for the edge map. Cheap to build, stable across frames.
    pub fn edge_key(interaction_index: u32, partner: &str) -> String {
        format!("{interaction_index}:{partner}")
    }

    /// Update the stored state and report the previous one.
    pub fn swap_edge(&mut self, key: String, now: bool) -> bool {
        self.edges.insert(key, now).unwrap_or(false)
    }

    /// Advance an interval accumulator; returns how many whole periods
    /// elapsed (usually 0 or 1).
    pub fn tick_interval(&mut self, index: u32, dt: f64, period: f64) -> u32 {
        if period <= 0.0 {
            return 0;
        }
        let acc = self.intervals.entry(index).or_insert(0.0);
        *acc += dt;
        let mut fired = 0;
        while *acc >= period {
            *acc -= period;
            fired += 1;
        }
        fired
    }
}
