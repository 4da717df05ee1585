//! Position component.

use bevy_ecs::prelude::Component;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Entity position in game pixels. Origin top-left, y grows downward.
#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize)]
pub struct Position {
    pub pos: Vec2,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            pos: Vec2::new(x, y),
        }
    }
}
