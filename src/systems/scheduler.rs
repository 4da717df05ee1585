//! Scheduled-callback dispatch.
//!
//! Entries tick down by `dt` and fire at the start of the tick in which
//! they are due. A dead entity cancels its callbacks implicitly; a
//! per-frame dispatch cap bounds pathological schedules (the overflow
//! fires next frame).

use crate::resources::limits::EngineLimits;
use crate::resources::queues::{ScheduledCallback, ScheduledCallbacks};
use crate::resources::simtime::SimTime;
use crate::script::runtime::ScriptRuntime;
use bevy_ecs::prelude::World;
use log::{debug, warn};

/// Tick all entries and dispatch the due ones, in queue order.
pub fn run_scheduled(world: &mut World, runtime: &ScriptRuntime) {
    let dt = world.resource::<SimTime>().delta;
    let cap = world.resource::<EngineLimits>().callback_cap_per_frame;

    let mut due: Vec<ScheduledCallback> = Vec::new();
    {
        let mut scheduled = world.resource_mut::<ScheduledCallbacks>();
        for entry in scheduled.entries.iter_mut() {
            entry.remaining -= dt;
        }
        let mut remaining = Vec::with_capacity(scheduled.entries.len());
        for entry in scheduled.entries.drain(..) {
            if entry.remaining <= 0.0 && due.len() < cap {
                due.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        if remaining.iter().any(|e| e.remaining <= 0.0) {
            warn!("scheduled callbacks exceeded per-frame cap {cap}; overflow deferred");
        }
        scheduled.entries = remaining;
    }

    for entry in due {
        let alive = runtime.with_shadow(|s| {
            s.get(&entry.entity_id)
                .map(|e| e.alive)
                .unwrap_or(false)
        });
        if !alive {
            // Implicit cancellation: the entity died first.
            continue;
        }
        if !runtime.exports(&entry.behavior, &entry.callback) {
            debug!(
                "scheduled callback '{}' not exported by behavior '{}'; dropped",
                entry.callback, entry.behavior
            );
            continue;
        }
        if let Err(e) = runtime.call(
            &entry.behavior,
            &entry.callback,
            &entry.entity_id,
            (entry.entity_id.clone(),),
        ) {
            warn!("{e}");
        }
    }
}
