//! Velocity integration and parent-following.

use crate::components::hierarchy::ChildOf;
use crate::components::ident::Ident;
use crate::components::position::Position;
use crate::components::velocity::Velocity;
use crate::resources::simtime::SimTime;
use bevy_ecs::prelude::*;
use glam::Vec2;
use rustc_hash::FxHashMap;

/// Integrate velocity into position for every free entity. Entities with
/// a parent link are positioned by [`follow_parents`] instead.
pub fn movement(world: &mut World) {
    let dt = world.resource::<SimTime>().delta as f32;
    let mut query = world.query::<(&mut Position, &Velocity, Option<&ChildOf>)>();
    for (mut position, velocity, child_of) in query.iter_mut(world) {
        if child_of.is_none() {
            position.pos += velocity.vel * dt;
        }
    }
}

/// Pin children to their parent's position plus the attach offset.
/// Resolved in spawn order so grandchildren see their parent's already
/// updated position.
pub fn follow_parents(world: &mut World) {
    let mut positions: FxHashMap<String, Vec2> = FxHashMap::default();
    {
        let mut query = world.query::<(&Ident, &Position)>();
        for (ident, position) in query.iter(world) {
            positions.insert(ident.id.clone(), position.pos);
        }
    }

    let mut followers: Vec<(u64, Entity, String, String, Vec2)> = Vec::new();
    {
        let mut query = world.query::<(Entity, &Ident, &ChildOf)>();
        for (entity, ident, child_of) in query.iter(world) {
            followers.push((
                ident.serial,
                entity,
                ident.id.clone(),
                child_of.parent.clone(),
                child_of.offset,
            ));
        }
    }
    followers.sort_by_key(|(serial, ..)| *serial);

    for (_, entity, id, parent_id, offset) in followers {
        let Some(parent_pos) = positions.get(&parent_id).copied() else {
            continue; // stale link; the sweep re-checks on destroy
        };
        let new_pos = parent_pos + offset;
        if let Some(mut position) = world.get_mut::<Position>(entity) {
            position.pos = new_pos;
        }
        positions.insert(id, new_pos);
    }
}
