//! Lifetime countdown.

use crate::components::ident::Ident;
use crate::components::lifetime::Lifetime;
use crate::components::pending::DestroyPending;
use crate::resources::queues::DestroyQueue;
use crate::resources::simtime::SimTime;
use bevy_ecs::prelude::*;

/// Tick every [`Lifetime`] and queue a destroy when it runs out. Goes
/// through the regular destroy path so `on_destroy` lifecycle still
/// fires.
pub fn tick_lifetimes(world: &mut World) {
    let dt = world.resource::<SimTime>().delta;
    let mut expired: Vec<String> = Vec::new();
    let mut query = world.query_filtered::<(&Ident, &mut Lifetime), Without<DestroyPending>>();
    for (ident, mut lifetime) in query.iter_mut(world) {
        lifetime.remaining -= dt;
        if lifetime.remaining <= 0.0 {
            expired.push(ident.id.clone());
        }
    }
    let mut queue = world.resource_mut::<DestroyQueue>();
    for id in expired {
        queue.push(id);
    }
}
