//! Velocity component.

use bevy_ecs::prelude::Component;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Linear velocity in game pixels per second.
#[derive(Debug, Clone, Copy, Default, Component, Serialize, Deserialize)]
pub struct Velocity {
    pub vel: Vec2,
}

impl Velocity {
    pub fn new(vx: f32, vy: f32) -> Self {
        Self {
            vel: Vec2::new(vx, vy),
        }
    }
}
