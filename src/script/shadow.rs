//! Per-frame mutable shadow of the simulation.
//!
//! Scripts never touch the ECS world directly. Before the frame's script
//! phases the engine copies every alive entity (plus score, lives,
//! pointer, clock) into this shadow; `ams.*` reads and writes go against
//! it, so a mutation made by one action is visible to the next filter or
//! action in the same frame. At the commit point the engine writes dirty
//! state back and drains the effect queues (spawns, destroys, sounds,
//! scheduled callbacks) at their fixed flush points.
//!
//! The shadow lives in the Lua interpreter's app data, the same place the
//! engine keeps all state shared with API closures.

use crate::components::props::{PropMap, PropValue};
use crate::resources::gamestate::PlayState;
use glam::Vec2;
use rustc_hash::FxHashMap;

/// Immutable per-type defaults the shadow needs to create entities for
/// `ams.spawn` without reaching back into the definition.
#[derive(Debug, Clone, Default)]
pub struct TypeDefaults {
    pub width: f32,
    pub height: f32,
    pub color: Option<String>,
    pub sprite: Option<String>,
    pub max_hits: i64,
    pub props: PropMap,
    pub tags: Vec<String>,
    pub base_chain: Vec<String>,
    /// (behavior name, config) in declared order.
    pub behaviors: Vec<(String, PropMap)>,
}

/// Shadow copy of one entity.
#[derive(Debug, Clone)]
pub struct ShadowEntity {
    pub id: String,
    pub serial: u64,
    pub type_name: String,
    pub base_chain: Vec<String>,
    pub tags: Vec<String>,
    pub pos: Vec2,
    pub size: Vec2,
    pub vel: Vec2,
    pub sprite: Option<String>,
    pub color: Option<String>,
    pub visible: bool,
    pub health: i64,
    pub max_hits: i64,
    pub spawn_time: f64,
    /// False once a destroy is queued; reads still work until the sweep.
    pub alive: bool,
    pub parent: Option<(String, f32, f32)>,
    pub children: Vec<String>,
    pub props: PropMap,
    pub behaviors: Vec<(String, PropMap)>,
    /// Spawned via `ams.spawn` this frame; not yet in the ECS world.
    pub queued: bool,
    /// Any field was written this frame.
    pub dirty: bool,
}

impl ShadowEntity {
    /// Computed read-only properties, resolved on demand.
    pub fn computed(&self, key: &str, now: f64) -> Option<PropValue> {
        match key {
            "age" => Some(PropValue::Number(now - self.spawn_time)),
            // 0 deg = north (screen up), clockwise positive.
            "heading" => {
                let heading = (self.vel.x as f64).atan2(-self.vel.y as f64).to_degrees();
                Some(PropValue::Number(heading.rem_euclid(360.0)))
            }
            "facing" => Some(PropValue::Str(
                if self.vel.x < 0.0 { "left" } else { "right" }.to_string(),
            )),
            "health_ratio" => {
                let ratio = if self.max_hits > 0 {
                    self.health as f64 / self.max_hits as f64
                } else {
                    0.0
                };
                Some(PropValue::Number(ratio))
            }
            "damage_ratio" => {
                let ratio = if self.max_hits > 0 {
                    1.0 - self.health as f64 / self.max_hits as f64
                } else {
                    0.0
                };
                Some(PropValue::Number(ratio))
            }
            _ => None,
        }
    }

    /// Property lookup: computed first, then the custom bag.
    pub fn prop(&self, key: &str, now: f64) -> PropValue {
        if let Some(v) = self.computed(key, now) {
            return v;
        }
        self.props.get(key).cloned().unwrap_or(PropValue::Nil)
    }
}

/// Pointer pseudo-entity state mirrored into the shadow.
#[derive(Debug, Clone, Default)]
pub struct PointerShadow {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// True during the frame a discrete hit applies.
    pub active: bool,
    pub input_type: String,
}

/// A spawn queued by `ams.spawn`, flushed at end-of-frame.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub id: String,
}

/// A callback queued by `ams.schedule`.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub delay: f64,
    pub callback: String,
    pub entity_id: String,
    /// Behavior whose module resolves the callback name.
    pub behavior: String,
}

/// The full shadow, plus the queues scripts write into.
#[derive(Debug, Default)]
pub struct ShadowWorld {
    pub entities: FxHashMap<String, ShadowEntity>,
    /// IDs in spawn order; queries iterate this for determinism.
    pub order: Vec<String>,
    pub score: i64,
    pub lives: i64,
    pub state: PlayState,
    /// Seconds since level start (the simulation clock scripts see).
    pub time: f64,
    pub screen_w: f32,
    pub screen_h: f32,
    pub pointer: PointerShadow,
    /// The session RNG; the only entropy scripts can reach.
    pub rng: fastrand::Rng,
    pub next_serial: u64,
    pub type_defaults: FxHashMap<String, TypeDefaults>,
    /// Game-specific launcher flags, readable as `game` properties.
    pub game_args: PropMap,

    // Effect queues, drained by the commit system.
    pub spawns: Vec<SpawnRequest>,
    pub destroys: Vec<String>,
    pub sounds: Vec<String>,
    pub schedules: Vec<ScheduleRequest>,
    pub score_delta: i64,

    /// Script currently executing, for logs and `schedule` context.
    pub current_script: Option<String>,

    // Configurable ceilings (copied from EngineLimits at session start).
    pub entity_cap: usize,
    pub spawn_cap_per_frame: usize,
    pub spawns_this_frame: usize,
    /// Set when a cap rejection already warned this frame.
    pub cap_warned_this_frame: bool,
}

impl ShadowWorld {
    /// Alive entities including spawns queued this frame.
    pub fn live_count(&self) -> usize {
        self.entities.values().filter(|e| e.alive).count()
    }

    pub fn get(&self, id: &str) -> Option<&ShadowEntity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ShadowEntity> {
        self.entities.get_mut(id)
    }

    /// Mutable access that respects write semantics: dead entities are
    /// silent no-ops, and the dirty flag is raised for the commit.
    pub fn write(&mut self, id: &str, f: impl FnOnce(&mut ShadowEntity)) {
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.alive {
                f(entity);
                entity.dirty = true;
            }
        }
    }

    /// Allocate the next entity ID. Also used by the engine-side spawn
    /// path so both share one serial sequence.
    pub fn alloc_id(&mut self) -> (String, u64) {
        let serial = self.next_serial;
        self.next_serial += 1;
        (format!("e{serial}"), serial)
    }

    /// Create a shadow entity for `ams.spawn` and queue its commit.
    /// Returns `None` when a cap rejects the spawn.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_spawn(
        &mut self,
        type_name: &str,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        w: Option<f32>,
        h: Option<f32>,
        color: Option<String>,
        sprite: Option<String>,
    ) -> Option<String> {
        let defaults = self.type_defaults.get(type_name)?.clone();
        if self.live_count() >= self.entity_cap || self.spawns_this_frame >= self.spawn_cap_per_frame
        {
            if !self.cap_warned_this_frame {
                log::warn!(
                    "entity cap reached ({} live, cap {}); dropping spawn of '{type_name}'",
                    self.live_count(),
                    self.entity_cap
                );
                self.cap_warned_this_frame = true;
            }
            return None;
        }
        self.spawns_this_frame += 1;
        let (id, serial) = self.alloc_id();
        let entity = ShadowEntity {
            id: id.clone(),
            serial,
            type_name: type_name.to_string(),
            base_chain: defaults.base_chain.clone(),
            tags: defaults.tags.clone(),
            pos: Vec2::new(sanitize_f32(x), sanitize_f32(y)),
            size: Vec2::new(
                w.map(sanitize_f32).unwrap_or(defaults.width),
                h.map(sanitize_f32).unwrap_or(defaults.height),
            ),
            vel: Vec2::new(sanitize_f32(vx), sanitize_f32(vy)),
            sprite: sprite.or_else(|| defaults.sprite.clone()),
            color: color.or_else(|| defaults.color.clone()),
            visible: true,
            health: defaults.max_hits,
            max_hits: defaults.max_hits,
            spawn_time: self.time,
            alive: true,
            parent: None,
            children: Vec::new(),
            props: defaults.props.clone(),
            behaviors: defaults.behaviors.clone(),
            queued: true,
            dirty: true,
        };
        self.entities.insert(id.clone(), entity);
        self.order.push(id.clone());
        self.spawns.push(SpawnRequest { id: id.clone() });
        Some(id)
    }

    /// Queue a destroy; reads keep working until the sweep.
    pub fn queue_destroy(&mut self, id: &str) {
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.alive {
                entity.alive = false;
                self.destroys.push(id.to_string());
            }
        }
    }

    /// Reset per-frame counters before a new frame's script phases.
    pub fn begin_frame(&mut self) {
        self.spawns_this_frame = 0;
        self.cap_warned_this_frame = false;
    }
}

/// Coerce non-finite floats to 0, warning; attribute setters share this.
pub fn sanitize_f32(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        log::warn!("non-finite value coerced to 0");
        0.0
    }
}
