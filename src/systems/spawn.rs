//! Entity creation: engine-side spawns and level population.

use crate::components::behaviors::{BehaviorAttachment, BehaviorSet};
use crate::components::boxsize::BoxSize;
use crate::components::health::Health;
use crate::components::hierarchy::{ChildIds, ChildOf};
use crate::components::ident::Ident;
use crate::components::interactionstate::InteractionMemory;
use crate::components::kind::{Kind, Tags};
use crate::components::lifetime::Lifetime;
use crate::components::position::Position;
use crate::components::props::{PropMap, Props};
use crate::components::velocity::Velocity;
use crate::components::visual::Visual;
use crate::definition::{GameDef, LevelDef};
use crate::resources::entityindex::EntityIndex;
use crate::resources::limits::EngineLimits;
use crate::resources::queues::PendingSpawnHooks;
use crate::resources::simtime::SimTime;
use crate::script::shadow::ShadowEntity;
use bevy_ecs::prelude::*;
use log::warn;

/// Everything an engine-side spawn can specify. Omitted fields fall back
/// to the type's defaults.
#[derive(Debug, Clone, Default)]
pub struct SpawnParams {
    pub type_name: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: Option<(f32, f32)>,
    pub color: Option<String>,
    pub sprite: Option<String>,
    /// Merged over the type's default properties.
    pub extra_props: PropMap,
    pub lifetime: Option<f64>,
    pub parent: Option<(String, f32, f32)>,
}

/// Spawn an entity from its type definition. Bounded by the live-entity
/// cap: exceeding it drops the spawn with a warning and returns `None`.
/// `on_spawn` hooks are queued, not dispatched here.
pub fn spawn_entity(world: &mut World, def: &GameDef, params: SpawnParams) -> Option<String> {
    let Some(type_def) = def.entity_type(&params.type_name) else {
        warn!("spawn of unknown entity type '{}' dropped", params.type_name);
        return None;
    };
    let cap = world.resource::<EngineLimits>().entity_cap;
    if world.resource::<EntityIndex>().len() >= cap {
        warn!(
            "entity cap {cap} reached; dropping spawn of '{}'",
            params.type_name
        );
        return None;
    }

    let (id, serial) = world.resource_mut::<EntityIndex>().alloc();
    let now = world.resource::<SimTime>().elapsed;

    let mut props = type_def.properties.clone();
    props.extend(params.extra_props);

    let (w, h) = params.size.unwrap_or((type_def.width, type_def.height));
    let behaviors = type_def
        .behaviors
        .iter()
        .map(|(name, config)| BehaviorAttachment {
            name: name.clone(),
            config: config.clone(),
        })
        .collect();

    let entity = world
        .spawn((
            Ident::new(id.clone(), serial, now),
            Kind::new(&type_def.name, type_def.base_chain.clone()),
            Tags::new(type_def.tags.iter().cloned()),
            Position::new(params.x, params.y),
            Velocity::new(params.vx, params.vy),
            BoxSize::new(w, h),
            Visual::new(
                params.sprite.or_else(|| type_def.sprite.clone()),
                params.color.or_else(|| type_def.color.clone()),
            ),
            Health::new(type_def.max_hits),
            Props::new(props),
            BehaviorSet { list: behaviors },
            ChildIds::default(),
            InteractionMemory::default(),
        ))
        .id();

    if let Some(seconds) = params.lifetime {
        world.entity_mut(entity).insert(Lifetime::new(seconds));
    }
    if let Some((parent_id, ox, oy)) = &params.parent {
        attach_to_parent(world, entity, &id, parent_id, *ox, *oy);
    }

    world.resource_mut::<EntityIndex>().insert(id.clone(), entity);
    world
        .resource_mut::<PendingSpawnHooks>()
        .ids
        .push(id.clone());
    Some(id)
}

/// Wire both sides of a parent link. Attaching to a missing parent is a
/// warned no-op.
pub fn attach_to_parent(
    world: &mut World,
    child_entity: Entity,
    child_id: &str,
    parent_id: &str,
    ox: f32,
    oy: f32,
) {
    let Some(parent_entity) = world.resource::<EntityIndex>().get(parent_id) else {
        warn!("attach of '{child_id}' to missing parent '{parent_id}' ignored");
        return;
    };
    world
        .entity_mut(child_entity)
        .insert(ChildOf::new(parent_id, ox, oy));
    if let Some(mut children) = world.get_mut::<ChildIds>(parent_entity) {
        children.add(child_id);
    }
}

/// Create the ECS side of an entity `ams.spawn` already built in the
/// shadow. Identity (id, serial, spawn time) comes from the shadow; the
/// cap was checked when the request was queued.
pub fn materialize_shadow_entity(world: &mut World, def: &GameDef, shadow: &ShadowEntity) {
    let behaviors = shadow
        .behaviors
        .iter()
        .map(|(name, config)| BehaviorAttachment {
            name: name.clone(),
            config: config.clone(),
        })
        .collect();
    let tags = def
        .entity_type(&shadow.type_name)
        .map(|t| Tags::new(t.tags.iter().cloned()))
        .unwrap_or_default();

    let entity = world
        .spawn((
            Ident::new(shadow.id.clone(), shadow.serial, shadow.spawn_time),
            Kind::new(&shadow.type_name, shadow.base_chain.clone()),
            tags,
            Position {
                pos: shadow.pos,
            },
            Velocity { vel: shadow.vel },
            BoxSize::new(shadow.size.x, shadow.size.y),
            Visual {
                sprite: shadow.sprite.clone(),
                color: shadow.color.clone(),
                visible: shadow.visible,
            },
            Health {
                hits: shadow.health,
                max_hits: shadow.max_hits,
            },
            Props::new(shadow.props.clone()),
            BehaviorSet { list: behaviors },
            ChildIds::default(),
            InteractionMemory::default(),
        ))
        .id();
    world
        .resource_mut::<EntityIndex>()
        .insert(shadow.id.clone(), entity);
}

/// Populate the world from a level (ASCII layout plus direct spawns),
/// falling back to the game's root layout.
pub fn spawn_level(world: &mut World, def: &GameDef, level: Option<&LevelDef>) {
    let layout = level.and_then(|l| l.layout.as_ref()).or(def.layout.as_ref());
    if let Some(layout) = layout {
        let (origin_x, origin_y) = layout.origin;
        for (row_index, row) in layout.rows.iter().enumerate() {
            for (col_index, glyph) in row.chars().enumerate() {
                let Some(cell) = layout.key.get(&glyph) else {
                    continue; // unmapped glyphs (spaces) are gaps
                };
                spawn_entity(
                    world,
                    def,
                    SpawnParams {
                        type_name: cell.type_name.clone(),
                        x: origin_x + col_index as f32 * layout.cell_width,
                        y: origin_y + row_index as f32 * layout.cell_height,
                        extra_props: cell.properties.clone(),
                        ..SpawnParams::default()
                    },
                );
            }
        }
    }
    for spawn in level.iter().flat_map(|l| l.spawns.iter()) {
        spawn_entity(
            world,
            def,
            SpawnParams {
                type_name: spawn.type_name.clone(),
                x: spawn.x,
                y: spawn.y,
                vx: spawn.vx,
                vy: spawn.vy,
                ..SpawnParams::default()
            },
        );
    }
}
