//! String-ID to entity index.

use bevy_ecs::prelude::{Entity, Resource};
use rustc_hash::FxHashMap;

/// Maps the opaque string IDs scripts hold to ECS entities, and owns the
/// serial counter behind ID allocation. IDs are never reused: the counter
/// only moves forward, even across rollback restores.
#[derive(Debug, Default, Resource)]
pub struct EntityIndex {
    by_id: FxHashMap<String, Entity>,
    pub next_serial: u64,
}

impl EntityIndex {
    /// Allocate the next `(id, serial)` pair.
    pub fn alloc(&mut self) -> (String, u64) {
        let serial = self.next_serial;
        self.next_serial += 1;
        (format!("e{serial}"), serial)
    }

    pub fn insert(&mut self, id: impl Into<String>, entity: Entity) {
        self.by_id.insert(id.into(), entity);
    }

    pub fn remove(&mut self, id: &str) {
        self.by_id.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}
