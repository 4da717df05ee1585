//! Behavior hook dispatch.
//!
//! Behaviors are Lua modules attached to entity types; the engine calls
//! whichever of `on_spawn`, `on_update`, `on_destroy` they export.
//! Dispatch order is spawn order across entities and declaration order
//! within one entity's behavior list. A hook that throws is logged and
//! swallowed; the frame continues.

use crate::resources::queues::PendingSpawnHooks;
use crate::resources::simtime::SimTime;
use crate::script::runtime::ScriptRuntime;
use bevy_ecs::prelude::World;
use log::warn;

/// Fire `on_spawn` for entities created engine-side (level population,
/// transform children) since the last scripting point.
pub fn dispatch_pending_spawn_hooks(world: &mut World, runtime: &ScriptRuntime) {
    let ids = std::mem::take(&mut world.resource_mut::<PendingSpawnHooks>().ids);
    for id in ids {
        let behaviors =
            runtime.with_shadow(|s| s.get(&id).map(|e| e.behaviors.clone()).unwrap_or_default());
        for (behavior, _) in behaviors {
            if runtime.exports(&behavior, "on_spawn") {
                if let Err(e) = runtime.call(&behavior, "on_spawn", &id, (id.clone(),)) {
                    warn!("{e}");
                }
            }
        }
    }
}

/// Fire `on_update` for every alive entity, in spawn order.
pub fn dispatch_on_update(world: &mut World, runtime: &ScriptRuntime) {
    let dt = world.resource::<SimTime>().delta;
    let targets: Vec<(String, Vec<String>)> = runtime.with_shadow(|s| {
        s.order
            .iter()
            .filter_map(|id| {
                let entity = s.get(id)?;
                if !entity.alive || entity.queued {
                    return None;
                }
                let hooks: Vec<String> = entity
                    .behaviors
                    .iter()
                    .map(|(name, _)| name.clone())
                    .collect();
                Some((id.clone(), hooks))
            })
            .collect()
    });
    for (id, behaviors) in targets {
        for behavior in behaviors {
            if runtime.exports(&behavior, "on_update") {
                if let Err(e) = runtime.call(&behavior, "on_update", &id, (id.clone(), dt)) {
                    warn!("{e}");
                }
            }
        }
    }
}
