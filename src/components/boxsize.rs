//! Axis-aligned box size component and rectangle math.

use bevy_ecs::prelude::Component;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Entity extent in game pixels. Together with [`Position`] it forms the
/// entity's AABB; position is the box's top-left corner.
///
/// [`Position`]: crate::components::position::Position
#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize)]
pub struct BoxSize {
    pub w: f32,
    pub h: f32,
}

impl BoxSize {
    pub fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }

    pub fn rect_at(&self, pos: Vec2) -> Rect {
        Rect {
            x: pos.x,
            y: pos.y,
            w: self.w,
            h: self.h,
        }
    }
}

/// Axis-aligned rectangle in game pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    /// Signed separation between two AABBs: the largest per-axis gap.
    /// Zero means the boxes touch exactly; negative means they overlap.
    pub fn separation(&self, other: &Rect) -> f32 {
        let gap_x = (self.x - other.right()).max(other.x - self.right());
        let gap_y = (self.y - other.bottom()).max(other.y - self.bottom());
        gap_x.max(gap_y)
    }

    /// Overlap-or-touch test; `separation <= 0`.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.separation(other) <= 0.0
    }

    /// Closest point inside this rectangle to `p`.
    pub fn clamp_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.x, self.right()),
            p.y.clamp(self.y, self.bottom()),
        )
    }

    /// True if this rectangle lies entirely inside `outer`.
    pub fn inside(&self, outer: &Rect) -> bool {
        self.x >= outer.x
            && self.y >= outer.y
            && self.right() <= outer.right()
            && self.bottom() <= outer.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_zero_on_exact_touch() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(a.separation(&b), 0.0);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn separation_negative_on_overlap_positive_on_gap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(a.separation(&b) < 0.0);
        let c = Rect::new(15.0, 0.0, 10.0, 10.0);
        assert_eq!(a.separation(&c), 5.0);
        assert!(!a.overlaps(&c));
    }
}
