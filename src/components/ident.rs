//! Entity identity component.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Stable identity of a gameplay entity.
///
/// `id` is the opaque string handed to scripts and stored in parent/child
/// links; it is unique for the whole session and never reused. `serial`
/// is a monotonically increasing spawn counter used wherever the engine
/// needs stable spawn-order iteration.
#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct Ident {
    pub id: String,
    pub serial: u64,
    /// Simulation time at spawn, in seconds.
    pub spawn_time: f64,
}

impl Ident {
    pub fn new(id: impl Into<String>, serial: u64, spawn_time: f64) -> Self {
        Self {
            id: id.into(),
            serial,
            spawn_time,
        }
    }
}
