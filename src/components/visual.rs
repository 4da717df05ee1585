//! Visual state component.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Per-entity visual state feeding the draw-list emitter.
///
/// `sprite` and `color` are names resolved against the game definition's
/// asset tables at draw time; the render command list itself lives on the
/// entity's type.
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct Visual {
    pub sprite: Option<String>,
    pub color: Option<String>,
    pub visible: bool,
}

impl Visual {
    pub fn new(sprite: Option<String>, color: Option<String>) -> Self {
        Self {
            sprite,
            color,
            visible: true,
        }
    }
}
