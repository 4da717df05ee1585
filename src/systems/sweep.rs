//! End-of-frame destroy sweep.
//!
//! Consumes the destroy queue with a worklist: lifecycle hooks may
//! destroy further entities and those are absorbed into the same sweep;
//! the visited set makes cycles terminate. Per doomed entity, in order:
//! `level` exit interactions, `on_destroy` behavior hooks, the type's
//! `on_destroy` transform, breadth-first orphaning of children (firing
//! each child's `on_parent_destroy`), then index removal and despawn.
//! The interaction engine does not re-run mid-sweep; hooks mutate state
//! only.

use crate::components::behaviors::BehaviorSet;
use crate::components::hierarchy::{ChildIds, ChildOf};
use crate::components::ident::Ident;
use crate::components::kind::Kind;
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::definition::{GameDef, TriggerMode};
use crate::resources::entityindex::EntityIndex;
use crate::resources::queues::DestroyQueue;
use crate::script::runtime::ScriptRuntime;
use crate::systems::commit::commit_shadow;
use crate::systems::transforms::apply_transform;
use crate::systems::interactions::{dispatch_action, FilterEval};
use bevy_ecs::prelude::*;
use log::warn;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Run the sweep until no destroy remains pending.
pub fn destroy_sweep(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    let mut visited: FxHashSet<String> = FxHashSet::default();

    // Hooks queued by the sweep itself (spawns from on_destroy
    // transforms) can re-fill the queue; loop until quiet.
    let mut fuel = 64;
    loop {
        let mut worklist: VecDeque<String> = VecDeque::new();
        for id in std::mem::take(&mut world.resource_mut::<DestroyQueue>().ids) {
            worklist.push_back(id);
        }
        // Entities marked pending without passing through the queue.
        {
            let mut query = world.query_filtered::<&Ident, With<DestroyPending>>();
            let marked: Vec<String> = query.iter(world).map(|i| i.id.clone()).collect();
            for id in marked {
                if !visited.contains(&id) && !worklist.contains(&id) {
                    worklist.push_back(id);
                }
            }
        }
        if worklist.is_empty() {
            break;
        }
        fuel -= 1;
        if fuel == 0 {
            warn!("destroy sweep did not settle; remaining destroys deferred");
            break;
        }

        while let Some(id) = worklist.pop_front() {
            if !visited.insert(id.clone()) {
                continue; // idempotent: double-destroy is a no-op
            }
            let Some(entity) = world.resource::<EntityIndex>().get(&id) else {
                continue;
            };
            runtime.with_shadow(|s| {
                if let Some(e) = s.get_mut(&id) {
                    e.alive = false;
                }
            });

            fire_level_exit(world, runtime, def, &id, entity);

            // on_destroy behavior hooks, declared order.
            let behaviors: Vec<String> = world
                .get::<BehaviorSet>(entity)
                .map(|b| b.list.iter().map(|a| a.name.clone()).collect())
                .unwrap_or_default();
            for behavior in behaviors {
                if runtime.exports(&behavior, "on_destroy") {
                    if let Err(e) = runtime.call(&behavior, "on_destroy", &id, (id.clone(),)) {
                        warn!("{e}");
                    }
                }
            }
            // Absorb destroys the hooks queued.
            let scripted: Vec<String> = runtime.with_shadow(|s| std::mem::take(&mut s.destroys));
            for extra in scripted {
                if !visited.contains(&extra) {
                    if let Some(extra_entity) = world.resource::<EntityIndex>().get(&extra) {
                        world.entity_mut(extra_entity).insert(DestroyPending);
                    }
                    worklist.push_back(extra);
                }
            }

            // The type's on_destroy transform (children and morphs; the
            // destroy flag is moot here).
            let type_name = world.get::<Kind>(entity).map(|k| k.name.clone());
            if let Some(transform) = type_name
                .as_deref()
                .and_then(|t| def.entity_type(t))
                .and_then(|t| t.on_destroy.clone())
            {
                apply_transform(world, runtime, def, &id, &transform);
            }

            orphan_children(world, runtime, def, entity, &mut worklist, &visited);

            // Detach from our own parent's child list.
            let parent_id = world.get::<ChildOf>(entity).map(|c| c.parent.clone());
            if let Some(parent_id) = parent_id {
                if let Some(parent_entity) = world.resource::<EntityIndex>().get(&parent_id) {
                    if let Some(mut children) = world.get_mut::<ChildIds>(parent_entity) {
                        children.remove(&id);
                    }
                }
            }

            world.resource_mut::<EntityIndex>().remove(&id);
            world.despawn(entity);

            // Transforms above may have queued engine-side destroys.
            for extra in std::mem::take(&mut world.resource_mut::<DestroyQueue>().ids) {
                if !visited.contains(&extra) {
                    worklist.push_back(extra);
                }
            }
        }

        // Commit mutations hooks made to surviving entities, plus any
        // spawns they queued (their on_spawn runs now).
        commit_shadow(world, runtime, def);
    }
}

/// `level`-target interactions with `because: exit` fire at destroy.
fn fire_level_exit(
    world: &mut World,
    runtime: &ScriptRuntime,
    def: &GameDef,
    id: &str,
    entity: Entity,
) {
    let Some(type_name) = world.get::<Kind>(entity).map(|k| k.name.clone()) else {
        return;
    };
    let Some(type_def) = def.entity_type(&type_name) else {
        return;
    };
    let pos = world
        .get::<Position>(entity)
        .map(|p| p.pos)
        .unwrap_or_default();
    for interaction in &type_def.interactions {
        if interaction.target == "level" && interaction.trigger == TriggerMode::Exit {
            let eval = FilterEval {
                passes: false,
                distance: 0.0,
                angle: 0.0,
                target_x: pos.x,
                target_y: pos.y,
                target_active: false,
            };
            dispatch_action(runtime, def, id, "level", interaction, eval);
        }
    }
}

/// Orphan every child breadth-first, firing `on_parent_destroy`.
fn orphan_children(
    world: &mut World,
    runtime: &ScriptRuntime,
    def: &GameDef,
    entity: Entity,
    worklist: &mut VecDeque<String>,
    visited: &FxHashSet<String>,
) {
    let children: Vec<String> = world
        .get::<ChildIds>(entity)
        .map(|c| c.ids.clone())
        .unwrap_or_default();
    for child_id in children {
        let Some(child_entity) = world.resource::<EntityIndex>().get(&child_id) else {
            continue;
        };
        world.entity_mut(child_entity).remove::<ChildOf>();

        let child_type = world.get::<Kind>(child_entity).map(|k| k.name.clone());
        if let Some(transform) = child_type
            .as_deref()
            .and_then(|t| def.entity_type(t))
            .and_then(|t| t.on_parent_destroy.clone())
        {
            apply_transform(world, runtime, def, &child_id, &transform);
        }
        // A transform may have marked the child for destruction.
        if world.get::<DestroyPending>(child_entity).is_some() && !visited.contains(&child_id) {
            worklist.push_back(child_id);
        }
    }
}
