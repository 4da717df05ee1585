//! Destroy-pending marker.

use bevy_ecs::prelude::Component;

/// Set by `destroy`; the entity stays queryable until the end-of-frame
/// sweep consumes it. Clearing health or writing attributes afterwards
/// does not resurrect it.
#[derive(Debug, Clone, Copy, Default, Component)]
pub struct DestroyPending;
