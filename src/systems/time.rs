//! Simulation clock advancement.

use crate::resources::simtime::SimTime;
use bevy_ecs::prelude::World;

/// Advance simulation time by `dt` (validated and clamped by
/// [`SimTime::advance`]).
pub fn advance_time(world: &mut World, dt: f64) {
    world.resource_mut::<SimTime>().advance(dt);
}
