//! Per-frame draw list: the renderer contract.
//!
//! The engine does not draw. Each frame it fills this resource with an
//! ordered sequence of typed commands; the rendering back-end consumes
//! it and is free to batch or atlas as long as ordering semantics hold.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

/// Resolved RGB color.
pub type Rgb = (u8, u8, u8);

/// Shape/content of one draw command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawKind {
    Rectangle,
    Circle,
    Triangle,
    Polygon { points: Vec<(f32, f32)> },
    Line,
    Sprite { name: String },
    Text { text: String, font_size: f32 },
}

/// One command of the frame's draw list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawCommand {
    pub kind: DrawKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Rgb,
    pub alpha: u8,
    pub fill: bool,
    pub line_width: f32,
    /// Owning entity, for back-end bookkeeping.
    pub entity_id: String,
    /// Position of this command within the entity's render list.
    pub layer_index: u32,
}

/// The draw list resource, rebuilt every frame.
#[derive(Debug, Default, Resource)]
pub struct DrawList {
    pub background: Option<Rgb>,
    pub commands: Vec<DrawCommand>,
    /// Template slots and properties already warned about, so a missing
    /// reference logs once per session.
    pub warned: rustc_hash::FxHashSet<String>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
