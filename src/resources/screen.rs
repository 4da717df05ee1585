//! Play-area resource.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::components::boxsize::Rect;

/// The game's declared screen rectangle, in game pixels.
#[derive(Debug, Clone, Copy, Resource, Serialize, Deserialize)]
pub struct Screen {
    pub w: f32,
    pub h: f32,
}

impl Screen {
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.w, self.h)
    }
}
