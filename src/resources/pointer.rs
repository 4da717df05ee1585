//! Pointer pseudo-entity resource.

use bevy_ecs::prelude::Resource;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Current/last input position in game pixels. `active` is true only
/// during the frame a discrete hit applies; the interaction engine's
/// `b.active` filter reads it.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct Pointer {
    pub pos: Vec2,
    /// Small, input-method-dependent extent used for AABB overlap.
    pub size: Vec2,
    pub active: bool,
    pub input_type: String,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            size: Vec2::new(2.0, 2.0),
            active: false,
            input_type: "mouse".to_string(),
        }
    }
}
