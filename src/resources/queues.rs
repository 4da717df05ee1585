//! Deferred-effect queues.
//!
//! Scripts queue effects through the shadow world; engine systems queue
//! through these resources directly. Each queue has a fixed flush point:
//! destroys at the end-of-frame sweep, sounds drained by the audio
//! back-end once per frame, scheduled callbacks at the start of the tick
//! in which they are due.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

/// Engine-side destroy requests (lifetime expiry, lose conditions),
/// merged with script destroys at the sweep.
#[derive(Debug, Default, Resource)]
pub struct DestroyQueue {
    pub ids: Vec<String>,
}

impl DestroyQueue {
    pub fn push(&mut self, id: impl Into<String>) {
        self.ids.push(id.into());
    }
}

/// One named sound event. No positional audio; the back-end mixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundEvent {
    pub name: String,
    /// Simulation time the event was queued.
    pub at: f64,
}

/// The audio queue, drained once per frame in order.
#[derive(Debug, Default, Resource)]
pub struct AudioQueue {
    pub events: Vec<SoundEvent>,
}

impl AudioQueue {
    pub fn drain(&mut self) -> Vec<SoundEvent> {
        std::mem::take(&mut self.events)
    }
}

/// One scheduled script callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCallback {
    pub remaining: f64,
    pub callback: String,
    pub entity_id: String,
    /// Behavior module that resolves `callback`.
    pub behavior: String,
}

/// Pending scheduled callbacks. Entries whose entity is dead at fire
/// time are silently dropped; there is no cancel API.
#[derive(Debug, Default, Resource, Serialize, Deserialize)]
pub struct ScheduledCallbacks {
    pub entries: Vec<ScheduledCallback>,
}

/// Entities spawned engine-side (levels, transform children) whose
/// `on_spawn` hooks still need to run; dispatched at the next scripting
/// point, in spawn order.
#[derive(Debug, Default, Resource)]
pub struct PendingSpawnHooks {
    pub ids: Vec<String>,
}
