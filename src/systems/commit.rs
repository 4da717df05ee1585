//! Shadow synchronization and commit.
//!
//! [`sync_shadow`] copies the authoritative ECS state into the shadow
//! before the frame's script phases; [`commit_shadow`] writes dirty
//! shadow state back and drains the effect queues at their flush points.
//! `ams.spawn` requests materialize here, firing `on_spawn` hooks; hooks
//! may spawn again, so the flush loops until quiet (bounded by the
//! per-frame spawn cap).

use crate::components::boxsize::BoxSize;
use crate::components::health::Health;
use crate::components::hierarchy::{ChildIds, ChildOf};
use crate::components::ident::Ident;
use crate::components::kind::{Kind, Tags};
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::components::props::Props;
use crate::components::velocity::Velocity;
use crate::components::visual::Visual;
use crate::components::behaviors::BehaviorSet;
use crate::definition::GameDef;
use crate::resources::entityindex::EntityIndex;
use crate::resources::gamestate::GameStatus;
use crate::resources::limits::EngineLimits;
use crate::resources::pointer::Pointer;
use crate::resources::queues::{
    AudioQueue, DestroyQueue, ScheduledCallback, ScheduledCallbacks, SoundEvent,
};
use crate::resources::screen::Screen;
use crate::resources::simtime::SimTime;
use crate::script::runtime::ScriptRuntime;
use crate::script::shadow::{ShadowEntity, ShadowWorld};
use crate::systems::spawn::materialize_shadow_entity;
use bevy_ecs::prelude::*;
use log::warn;
use rustc_hash::FxHashMap;

/// Rebuild the shadow from the ECS world. Called once per frame before
/// any script dispatch; the shadow's RNG and type defaults persist.
pub fn sync_shadow(world: &mut World, runtime: &ScriptRuntime) {
    let mut entities: FxHashMap<String, ShadowEntity> = FxHashMap::default();
    let mut ordered: Vec<(u64, String)> = Vec::new();

    let mut query = world.query::<(
        &Ident,
        &Kind,
        &Tags,
        &Position,
        &Velocity,
        &BoxSize,
        &Visual,
        &Health,
        &Props,
        &BehaviorSet,
        Option<&ChildOf>,
        Option<&ChildIds>,
        Option<&DestroyPending>,
    )>();
    for (ident, kind, tags, position, velocity, size, visual, health, props, behaviors, child_of, children, pending) in
        query.iter(world)
    {
        let shadow_entity = ShadowEntity {
            id: ident.id.clone(),
            serial: ident.serial,
            type_name: kind.name.clone(),
            base_chain: kind.base_chain.clone(),
            tags: tags.set.iter().cloned().collect(),
            pos: position.pos,
            size: glam::Vec2::new(size.w, size.h),
            vel: velocity.vel,
            sprite: visual.sprite.clone(),
            color: visual.color.clone(),
            visible: visual.visible,
            health: health.hits,
            max_hits: health.max_hits,
            spawn_time: ident.spawn_time,
            alive: pending.is_none(),
            parent: child_of.map(|c| (c.parent.clone(), c.offset.x, c.offset.y)),
            children: children.map(|c| c.ids.clone()).unwrap_or_default(),
            props: props.map.clone(),
            behaviors: behaviors
                .list
                .iter()
                .map(|b| (b.name.clone(), b.config.clone()))
                .collect(),
            queued: false,
            dirty: false,
        };
        ordered.push((ident.serial, ident.id.clone()));
        entities.insert(ident.id.clone(), shadow_entity);
    }
    ordered.sort();

    let status = world.resource::<GameStatus>().clone();
    let time = world.resource::<SimTime>().elapsed;
    let screen = *world.resource::<Screen>();
    let pointer = world.resource::<Pointer>().clone();
    let next_serial = world.resource::<EntityIndex>().next_serial;
    let limits = world.resource::<EngineLimits>().clone();

    runtime.with_shadow(|shadow| {
        shadow.entities = entities;
        shadow.order = ordered.iter().map(|(_, id)| id.clone()).collect();
        shadow.score = status.score;
        shadow.lives = status.lives;
        shadow.state = status.state;
        shadow.time = time;
        shadow.screen_w = screen.w;
        shadow.screen_h = screen.h;
        shadow.pointer.x = pointer.pos.x;
        shadow.pointer.y = pointer.pos.y;
        shadow.pointer.w = pointer.size.x;
        shadow.pointer.h = pointer.size.y;
        shadow.pointer.active = pointer.active;
        shadow.pointer.input_type = pointer.input_type.clone();
        shadow.next_serial = next_serial;
        shadow.entity_cap = limits.entity_cap;
        shadow.spawn_cap_per_frame = limits.spawn_cap_per_frame;
        shadow.spawns.clear();
        shadow.destroys.clear();
        shadow.sounds.clear();
        shadow.schedules.clear();
        shadow.score_delta = 0;
        shadow.begin_frame();
    });
}

/// State taken out of the shadow in one commit round.
struct CommitRound {
    writes: Vec<ShadowEntity>,
    spawn_ids: Vec<String>,
    destroys: Vec<String>,
    sounds: Vec<String>,
    schedules: Vec<crate::script::shadow::ScheduleRequest>,
    score_delta: i64,
    next_serial: u64,
}

fn take_round(shadow: &mut ShadowWorld) -> CommitRound {
    let mut writes = Vec::new();
    for id in &shadow.order {
        if let Some(entity) = shadow.entities.get_mut(id) {
            if entity.dirty && !entity.queued {
                writes.push(entity.clone());
                entity.dirty = false;
            }
        }
    }
    let spawn_ids = shadow.spawns.drain(..).map(|s| s.id).collect();
    CommitRound {
        writes,
        spawn_ids,
        destroys: std::mem::take(&mut shadow.destroys),
        sounds: std::mem::take(&mut shadow.sounds),
        schedules: std::mem::take(&mut shadow.schedules),
        score_delta: std::mem::take(&mut shadow.score_delta),
        next_serial: shadow.next_serial,
    }
}

/// Write shadow state back to the ECS world and flush the queues.
pub fn commit_shadow(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    // Spawn flush loop: on_spawn hooks may queue further work.
    let mut fuel = 64;
    loop {
        let round = runtime.with_shadow(take_round);
        let had_spawns = !round.spawn_ids.is_empty();
        apply_round(world, runtime, def, round);
        if !had_spawns {
            break;
        }
        fuel -= 1;
        if fuel == 0 {
            warn!("spawn flush did not settle; remaining work deferred to next frame");
            break;
        }
    }
}

fn apply_round(world: &mut World, runtime: &ScriptRuntime, def: &GameDef, round: CommitRound) {
    let now = world.resource::<SimTime>().elapsed;

    for shadow_entity in &round.writes {
        let Some(entity) = world.resource::<EntityIndex>().get(&shadow_entity.id) else {
            continue;
        };
        if let Some(mut position) = world.get_mut::<Position>(entity) {
            position.pos = shadow_entity.pos;
        }
        if let Some(mut velocity) = world.get_mut::<Velocity>(entity) {
            velocity.vel = shadow_entity.vel;
        }
        if let Some(mut size) = world.get_mut::<BoxSize>(entity) {
            size.w = shadow_entity.size.x;
            size.h = shadow_entity.size.y;
        }
        if let Some(mut visual) = world.get_mut::<Visual>(entity) {
            visual.sprite = shadow_entity.sprite.clone();
            visual.color = shadow_entity.color.clone();
            visual.visible = shadow_entity.visible;
        }
        if let Some(mut health) = world.get_mut::<Health>(entity) {
            health.hits = shadow_entity.health;
        }
        if let Some(mut props) = world.get_mut::<Props>(entity) {
            props.map = shadow_entity.props.clone();
        }
        sync_parent_link(world, entity, shadow_entity);
    }

    {
        let mut status = world.resource_mut::<GameStatus>();
        status.score += round.score_delta;
    }
    {
        let mut audio = world.resource_mut::<AudioQueue>();
        for name in round.sounds {
            audio.events.push(SoundEvent { name, at: now });
        }
    }
    {
        let mut scheduled = world.resource_mut::<ScheduledCallbacks>();
        for request in round.schedules {
            scheduled.entries.push(ScheduledCallback {
                remaining: request.delay,
                callback: request.callback,
                entity_id: request.entity_id,
                behavior: request.behavior,
            });
        }
    }
    {
        let ids: Vec<Entity> = round
            .destroys
            .iter()
            .filter_map(|id| world.resource::<EntityIndex>().get(id))
            .collect();
        let mut queue = world.resource_mut::<DestroyQueue>();
        for id in &round.destroys {
            queue.push(id.clone());
        }
        for entity in ids {
            world.entity_mut(entity).insert(DestroyPending);
        }
    }
    world.resource_mut::<EntityIndex>().next_serial = round.next_serial;

    // Materialize queued spawns and fire their on_spawn hooks.
    for id in round.spawn_ids {
        let Some(shadow_entity) = runtime.with_shadow(|s| {
            s.entities.get_mut(&id).map(|e| {
                e.queued = false;
                e.dirty = false;
                e.clone()
            })
        }) else {
            continue;
        };
        materialize_shadow_entity(world, def, &shadow_entity);
        for (behavior, _) in &shadow_entity.behaviors {
            if runtime.exports(behavior, "on_spawn") {
                if let Err(e) = runtime.call(behavior, "on_spawn", &id, (id.clone(),)) {
                    warn!("{e}");
                }
            }
        }
    }
}

/// Reconcile a changed parent link, keeping both directions in sync.
fn sync_parent_link(world: &mut World, entity: Entity, shadow_entity: &ShadowEntity) {
    let current = world
        .get::<ChildOf>(entity)
        .map(|c| (c.parent.clone(), c.offset.x, c.offset.y));
    if current == shadow_entity.parent {
        return;
    }
    if let Some((old_parent, _, _)) = &current {
        if let Some(parent_entity) = world.resource::<EntityIndex>().get(old_parent) {
            if let Some(mut children) = world.get_mut::<ChildIds>(parent_entity) {
                children.remove(&shadow_entity.id);
            }
        }
    }
    match &shadow_entity.parent {
        Some((new_parent, ox, oy)) => {
            if let Some(parent_entity) = world.resource::<EntityIndex>().get(new_parent) {
                world
                    .entity_mut(entity)
                    .insert(ChildOf::new(new_parent, *ox, *oy));
                if let Some(mut children) = world.get_mut::<ChildIds>(parent_entity) {
                    children.add(&shadow_entity.id);
                }
            }
        }
        None => {
            world.entity_mut(entity).remove::<ChildOf>();
        }
    }
}

