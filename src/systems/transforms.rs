//! Transform engine: declarative destroy / morph / spawn-children.
//!
//! Transforms are the declarative side effects of lifecycle and
//! interaction events. A morph replaces the entity's type while keeping
//! its identity: same ID, same links, same position; velocity carries
//! over, custom properties are preserved by default. Child spawns read
//! the parent's state at fire time.

use crate::components::behaviors::{BehaviorAttachment, BehaviorSet};
use crate::components::boxsize::BoxSize;
use crate::components::health::Health;
use crate::components::ident::Ident;
use crate::components::interactionstate::InteractionMemory;
use crate::components::kind::{Kind, Tags};
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::components::props::{PropMap, PropValue, Props};
use crate::components::velocity::Velocity;
use crate::components::visual::Visual;
use crate::definition::{ChildPropSpec, ChildSpawnDef, GameDef, OffsetSpec, TransformDef};
use crate::resources::entityindex::EntityIndex;
use crate::resources::queues::DestroyQueue;
use crate::resources::simtime::SimTime;
use crate::script::convert::lua_to_prop;
use crate::script::runtime::ScriptRuntime;
use crate::systems::spawn::{spawn_entity, SpawnParams};
use bevy_ecs::prelude::*;
use log::warn;

/// Apply one transform to an entity: children first (while the parent's
/// state is intact), then morph, then destroy-marking.
pub fn apply_transform(
    world: &mut World,
    runtime: &ScriptRuntime,
    def: &GameDef,
    entity_id: &str,
    transform: &TransformDef,
) {
    for child in &transform.children {
        spawn_children(world, runtime, def, entity_id, child);
    }
    if let Some(new_type) = &transform.change_type {
        morph_entity(world, def, entity_id, new_type, transform.keep_properties);
    }
    if transform.destroy {
        if let Some(entity) = world.resource::<EntityIndex>().get(entity_id) {
            world.entity_mut(entity).insert(DestroyPending);
        }
        world.resource_mut::<DestroyQueue>().push(entity_id);
    }
}

/// Spawn `count` children from one descriptor.
fn spawn_children(
    world: &mut World,
    runtime: &ScriptRuntime,
    def: &GameDef,
    parent_id: &str,
    child: &ChildSpawnDef,
) {
    let Some(parent_entity) = world.resource::<EntityIndex>().get(parent_id) else {
        return;
    };
    let parent_pos = world
        .get::<Position>(parent_entity)
        .map(|p| p.pos)
        .unwrap_or_default();
    let parent_vel = world
        .get::<Velocity>(parent_entity)
        .map(|v| v.vel)
        .unwrap_or_default();
    let parent_props = world
        .get::<Props>(parent_entity)
        .map(|p| p.map.clone())
        .unwrap_or_default();
    let parent_visual = world.get::<Visual>(parent_entity).cloned();

    for i in 0..child.count {
        let (dx, dy) = match &child.offset {
            OffsetSpec::Literal(dx, dy) => (*dx, *dy),
            OffsetSpec::Script(generator) => {
                generated_offset(runtime, generator, parent_id, i).unwrap_or((0.0, 0.0))
            }
        };

        let mut extra_props = PropMap::default();
        for (key, spec) in &child.properties {
            let value = match spec {
                ChildPropSpec::Literal(v) => v.clone(),
                ChildPropSpec::ParentRef(name) => match name.as_str() {
                    // $color / $sprite read the parent's visual state.
                    "color" => parent_visual
                        .as_ref()
                        .and_then(|v| v.color.clone())
                        .map(PropValue::Str)
                        .unwrap_or(PropValue::Nil),
                    "sprite" => parent_visual
                        .as_ref()
                        .and_then(|v| v.sprite.clone())
                        .map(PropValue::Str)
                        .unwrap_or(PropValue::Nil),
                    _ => parent_props.get(name).cloned().unwrap_or(PropValue::Nil),
                },
                ChildPropSpec::Script(generator) => {
                    match runtime.call(generator, "generate", parent_id, (parent_id.to_string(), i))
                    {
                        Ok(value) => match lua_to_prop(&value) {
                            Ok(prop) => prop,
                            Err(e) => {
                                warn!("child property '{key}': {e}; using nil");
                                PropValue::Nil
                            }
                        },
                        Err(e) => {
                            warn!("{e}");
                            PropValue::Nil
                        }
                    }
                }
            };
            extra_props.insert(key.clone(), value);
        }

        spawn_entity(
            world,
            def,
            SpawnParams {
                type_name: child.type_name.clone(),
                x: parent_pos.x + dx,
                y: parent_pos.y + dy,
                vx: parent_vel.x * child.inherit_velocity,
                vy: parent_vel.y * child.inherit_velocity,
                extra_props,
                lifetime: child.lifetime,
                ..SpawnParams::default()
            },
        );
    }
}

/// Evaluate a generator script for a child offset. The generator returns
/// `{x, y}` or a two-element sequence.
fn generated_offset(
    runtime: &ScriptRuntime,
    generator: &str,
    parent_id: &str,
    index: u32,
) -> Option<(f32, f32)> {
    let value = match runtime.call(generator, "generate", parent_id, (parent_id.to_string(), index))
    {
        Ok(value) => value,
        Err(e) => {
            warn!("{e}");
            return None;
        }
    };
    let prop = match lua_to_prop(&value) {
        Ok(prop) => prop,
        Err(e) => {
            warn!("offset generator '{generator}': {e}");
            return None;
        }
    };
    match prop {
        PropValue::Seq(seq) if seq.len() >= 2 => Some((
            seq[0].as_number().unwrap_or(0.0) as f32,
            seq[1].as_number().unwrap_or(0.0) as f32,
        )),
        PropValue::Map(map) => Some((
            map.get("x").and_then(|v| v.as_number()).unwrap_or(0.0) as f32,
            map.get("y").and_then(|v| v.as_number()).unwrap_or(0.0) as f32,
        )),
        _ => {
            warn!("offset generator '{generator}' returned no coordinates");
            None
        }
    }
}

/// Replace the entity's type in place, preserving identity. Position and
/// links stay; velocity carries over; health resets to the new type's
/// maximum; properties are preserved (merged over the new defaults) or
/// replaced per the transform.
pub fn morph_entity(
    world: &mut World,
    def: &GameDef,
    entity_id: &str,
    new_type: &str,
    keep_properties: bool,
) {
    let Some(entity) = world.resource::<EntityIndex>().get(entity_id) else {
        return;
    };
    let Some(type_def) = def.entity_type(new_type) else {
        warn!("morph of '{entity_id}' to unknown type '{new_type}' ignored");
        return;
    };

    if let Some(mut kind) = world.get_mut::<Kind>(entity) {
        kind.name = type_def.name.clone();
        kind.base_chain = type_def.base_chain.clone();
    }
    if let Some(mut tags) = world.get_mut::<Tags>(entity) {
        tags.set = type_def.tags.iter().cloned().collect();
    }
    if let Some(mut behaviors) = world.get_mut::<BehaviorSet>(entity) {
        behaviors.list = type_def
            .behaviors
            .iter()
            .map(|(name, config)| BehaviorAttachment {
                name: name.clone(),
                config: config.clone(),
            })
            .collect();
    }
    if let Some(mut size) = world.get_mut::<BoxSize>(entity) {
        size.w = type_def.width;
        size.h = type_def.height;
    }
    if let Some(mut visual) = world.get_mut::<Visual>(entity) {
        visual.sprite = type_def.sprite.clone();
        visual.color = type_def.color.clone();
    }
    if let Some(mut health) = world.get_mut::<Health>(entity) {
        health.hits = type_def.max_hits;
        health.max_hits = type_def.max_hits.max(1);
    }
    if let Some(mut props) = world.get_mut::<Props>(entity) {
        let mut merged = type_def.properties.clone();
        if keep_properties {
            merged.extend(props.map.drain());
        }
        props.map = merged;
    }
    // Stale edge memory would mis-trigger the new type's interactions.
    if let Some(mut memory) = world.get_mut::<InteractionMemory>(entity) {
        memory.edges.clear();
        memory.intervals.clear();
    }
}

/// Evaluate type-level on-update transforms for every alive entity.
/// Conditions (age window, property equality, interval) are conjoined.
pub fn run_on_update_transforms(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    let now = world.resource::<SimTime>().elapsed;
    let dt = world.resource::<SimTime>().delta;

    // Collect candidates first; applying transforms mutates the world.
    let mut candidates: Vec<(u64, String, String)> = Vec::new();
    {
        let mut query = world.query_filtered::<(&Ident, &Kind), Without<DestroyPending>>();
        for (ident, kind) in query.iter(world) {
            candidates.push((ident.serial, ident.id.clone(), kind.name.clone()));
        }
    }
    candidates.sort();

    let mut firing: Vec<(String, TransformDef)> = Vec::new();
    for (_, id, type_name) in &candidates {
        let Some(type_def) = def.entity_type(type_name) else {
            continue;
        };
        if type_def.on_update.is_empty() {
            continue;
        }
        let Some(entity) = world.resource::<EntityIndex>().get(id) else {
            continue;
        };
        let age = world
            .get::<Ident>(entity)
            .map(|i| now - i.spawn_time)
            .unwrap_or(0.0);

        for (index, on_update) in type_def.on_update.iter().enumerate() {
            if let Some(min) = on_update.age_min {
                if age < min {
                    continue;
                }
            }
            if let Some(max) = on_update.age_max {
                if age > max {
                    continue;
                }
            }
            if let Some(property) = &on_update.property {
                let holds = world
                    .get::<Props>(entity)
                    .map(|p| {
                        let current = p.map.get(property).cloned().unwrap_or(PropValue::Nil);
                        match &on_update.value {
                            Some(expected) => current == *expected,
                            None => current.truthy(),
                        }
                    })
                    .unwrap_or(false);
                if !holds {
                    continue;
                }
            }
            if let Some(interval) = on_update.interval {
                let fired = world
                    .get_mut::<InteractionMemory>(entity)
                    .map(|mut m| m.tick_interval(index as u32, dt, interval))
                    .unwrap_or(0);
                if fired == 0 {
                    continue;
                }
            }
            firing.push((id.clone(), on_update.transform.clone()));
        }
    }

    for (id, transform) in firing {
        apply_transform(world, runtime, def, &id, &transform);
    }
}
