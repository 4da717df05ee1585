//! Parent/child link components.
//!
//! Links are string IDs, not `Entity` values; neither side owns the
//! other, so no ownership cycle can form. Both directions are maintained
//! together by the entity store operations and re-checked on destroy.

use bevy_ecs::prelude::Component;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Link to a parent entity. The child follows the parent at `offset` in
/// parent space while the link holds.
#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct ChildOf {
    pub parent: String,
    pub offset: Vec2,
}

impl ChildOf {
    pub fn new(parent: impl Into<String>, ox: f32, oy: f32) -> Self {
        Self {
            parent: parent.into(),
            offset: Vec2::new(ox, oy),
        }
    }
}

/// IDs of this entity's children, in attach order.
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct ChildIds {
    pub ids: Vec<String>,
}

impl ChildIds {
    pub fn add(&mut self, id: &str) {
        if !self.ids.iter().any(|c| c == id) {
            self.ids.push(id.to_string());
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.ids.retain(|c| c != id);
    }
}
