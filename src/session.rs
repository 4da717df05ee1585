//! Session: owns the world, the sandbox, the queues, and the frame loop.
//!
//! There is no process-wide state in the engine; everything a running
//! game needs lives in this value. The session ingests normalized
//! [`PlaneHitEvent`]s, runs the fixed per-frame pipeline, evaluates
//! win/lose, and exposes the draw list and audio queue to the host.
//!
//! # Rollback
//!
//! Physical inputs arrive late by their measured pipeline latency. When
//! rollback is enabled, an event whose `timestamp` lies in the past
//! restores the newest snapshot at or before that time, then re-simulates
//! forward with the recorded `dt` schedule and the full event stream.
//! Determinism of the pipeline makes the replay exact.

use crate::components::behaviors::{BehaviorAttachment, BehaviorSet};
use crate::components::boxsize::BoxSize;
use crate::components::health::Health;
use crate::components::hierarchy::{ChildIds, ChildOf};
use crate::components::ident::Ident;
use crate::components::interactionstate::InteractionMemory;
use crate::components::kind::{Kind, Tags};
use crate::components::lifetime::Lifetime;
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::components::props::{PropValue, Props};
use crate::components::velocity::Velocity;
use crate::components::visual::Visual;
use crate::content::ContentFs;
use crate::definition::{GameDef, LevelDef};
use crate::events::planehit::PlaneHitEvent;
use crate::events::terminal::TerminalEvent;
use crate::resources::drawlist::DrawList;
use crate::resources::entityindex::EntityIndex;
use crate::resources::gamestate::{GameStatus, PlayState};
use crate::resources::limits::EngineLimits;
use crate::resources::pointer::Pointer;
use crate::resources::queues::{
    AudioQueue, DestroyQueue, PendingSpawnHooks, ScheduledCallbacks, SoundEvent,
};
use crate::resources::screen::Screen;
use crate::resources::simtime::SimTime;
use crate::resources::snapshots::{EntitySnapshot, Snapshot, SnapshotRing};
use crate::script::convert::prop_to_lua;
use crate::script::runtime::ScriptRuntime;
use crate::script::shadow::TypeDefaults;
use crate::systems;
use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, info, warn};
use std::io::Write as _;

/// Per-session switches.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// RNG seed; the same seed and input stream replay identically.
    pub seed: u64,
    /// Enable snapshot capture and late-input rollback.
    pub rollback: bool,
    /// Write snapshots as JSON lines to this path (under the user layer).
    pub replay_log: Option<std::path::PathBuf>,
    /// Game-specific launcher flags, readable by scripts as `game`
    /// properties.
    pub game_args: crate::components::props::PropMap,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            rollback: true,
            replay_log: None,
            game_args: crate::components::props::PropMap::default(),
        }
    }
}

/// A running game.
pub struct Session {
    pub world: World,
    runtime: ScriptRuntime,
    def: GameDef,
    #[allow(dead_code)]
    fs: ContentFs,
    config: SessionConfig,
    /// Events ingested but not yet applied to a frame.
    pending_events: Vec<PlaneHitEvent>,
    /// Events already applied, kept for replay.
    applied_events: Vec<PlaneHitEvent>,
    /// dt of every frame so far; the replay schedule.
    dt_history: Vec<f64>,
    terminal_events: Vec<TerminalEvent>,
    terminal_emitted: bool,
    replay_log: Option<std::io::BufWriter<std::fs::File>>,
}

impl Session {
    /// Build a session around an already-loaded definition. The runtime
    /// must be the one the definition's scripts were compiled into.
    pub fn new(
        fs: ContentFs,
        runtime: ScriptRuntime,
        def: GameDef,
        level: Option<LevelDef>,
        limits: EngineLimits,
        config: SessionConfig,
    ) -> Self {
        let mut world = World::new();
        world.insert_resource(SimTime {
            dt_cap: limits.dt_cap,
            ..SimTime::default()
        });
        world.insert_resource(GameStatus::new(def.defaults.lives));
        world.insert_resource(Screen {
            w: def.screen_width,
            h: def.screen_height,
        });
        world.insert_resource(Pointer::default());
        world.insert_resource(EntityIndex::default());
        world.insert_resource(DestroyQueue::default());
        world.insert_resource(AudioQueue::default());
        world.insert_resource(ScheduledCallbacks::default());
        world.insert_resource(PendingSpawnHooks::default());
        world.insert_resource(DrawList::default());
        world.insert_resource(SnapshotRing::new(limits.snapshot_ring_capacity));
        world.insert_resource(limits.clone());

        // Seed the shadow once: RNG, caps, and per-type spawn defaults.
        runtime.with_shadow(|shadow| {
            shadow.rng = fastrand::Rng::with_seed(config.seed);
            shadow.entity_cap = limits.entity_cap;
            shadow.spawn_cap_per_frame = limits.spawn_cap_per_frame;
            shadow.game_args = config.game_args.clone();
            for (name, type_def) in &def.entity_types {
                shadow.type_defaults.insert(
                    name.clone(),
                    TypeDefaults {
                        width: type_def.width,
                        height: type_def.height,
                        color: type_def.color.clone(),
                        sprite: type_def.sprite.clone(),
                        max_hits: type_def.max_hits,
                        props: type_def.properties.clone(),
                        tags: type_def.tags.clone(),
                        base_chain: type_def.base_chain.clone(),
                        behaviors: type_def.behaviors.clone(),
                    },
                );
            }
        });

        let replay_log = config.replay_log.as_ref().and_then(|path| {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::File::create(path) {
                Ok(file) => Some(std::io::BufWriter::new(file)),
                Err(e) => {
                    warn!("cannot open replay log {}: {e}", path.display());
                    None
                }
            }
        });

        let mut session = Self {
            world,
            runtime,
            def,
            fs,
            config,
            pending_events: Vec::new(),
            applied_events: Vec::new(),
            dt_history: Vec::new(),
            terminal_events: Vec::new(),
            terminal_emitted: false,
            replay_log,
        };
        systems::spawn::spawn_level(&mut session.world, &session.def, level.as_ref());

        // Frame-zero snapshot: rollback can always reach level start.
        let snapshot = session.capture_snapshot();
        session.log_snapshot(&snapshot);
        session.world.resource_mut::<SnapshotRing>().push(snapshot);
        session
    }

    pub fn def(&self) -> &GameDef {
        &self.def
    }

    pub fn runtime(&self) -> &ScriptRuntime {
        &self.runtime
    }

    pub fn state(&self) -> PlayState {
        self.world.resource::<GameStatus>().state
    }

    pub fn score(&self) -> i64 {
        self.world.resource::<GameStatus>().score
    }

    pub fn lives(&self) -> i64 {
        self.world.resource::<GameStatus>().lives
    }

    pub fn time(&self) -> f64 {
        self.world.resource::<SimTime>().elapsed
    }

    /// Spawn an entity outside the scripted paths (shells, tests).
    /// Same cap rules as every other spawn; `on_spawn` hooks run at the
    /// next frame's scripting point.
    pub fn spawn(&mut self, params: systems::spawn::SpawnParams) -> Option<String> {
        systems::spawn::spawn_entity(&mut self.world, &self.def, params)
    }

    /// Capture a snapshot right now and push it onto the rollback ring.
    /// Hosts call this after out-of-band setup so rollback never
    /// restores past it.
    pub fn checkpoint(&mut self) {
        let snapshot = self.capture_snapshot();
        self.log_snapshot(&snapshot);
        self.world.resource_mut::<SnapshotRing>().push(snapshot);
    }

    /// Alive entity IDs of a type (or base type, or tag), spawn order.
    pub fn entities_of_type(&mut self, type_name: &str) -> Vec<String> {
        let mut out: Vec<(u64, String)> = Vec::new();
        let mut query =
            self.world
                .query_filtered::<(&Ident, &Kind, &Tags), Without<DestroyPending>>();
        for (ident, kind, tags) in query.iter(&self.world) {
            if kind.is_a(type_name) || tags.has(type_name) {
                out.push((ident.serial, ident.id.clone()));
            }
        }
        out.sort();
        out.into_iter().map(|(_, id)| id).collect()
    }

    /// Ingest a batch of input events. Arrival order does not matter;
    /// application is re-ordered by timestamp.
    pub fn ingest(&mut self, events: &[PlaneHitEvent]) {
        for event in events {
            let mut event = event.clone();
            if !event.timestamp.is_finite() {
                warn!("input event with non-finite timestamp dropped");
                continue;
            }
            event.x = event.x.clamp(0.0, 1.0);
            event.y = event.y.clamp(0.0, 1.0);
            self.pending_events.push(event);
        }
        self.pending_events
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    /// Advance the simulation one frame.
    pub fn step(&mut self, dt: f64) {
        if self.state().is_over() {
            return;
        }
        if self.config.rollback {
            let now = self.time();
            let earliest_late = self
                .pending_events
                .iter()
                .map(|e| e.timestamp)
                .filter(|t| *t <= now)
                .fold(f64::INFINITY, f64::min);
            if earliest_late.is_finite() {
                self.rollback_and_replay(earliest_late);
            }
        }
        self.run_frame(dt);

        // Periodic snapshot capture.
        let interval = self.world.resource::<EngineLimits>().snapshot_interval_frames;
        if self.config.rollback && interval > 0 {
            let frame = self.world.resource::<SimTime>().frame;
            if frame % interval == 0 {
                let snapshot = self.capture_snapshot();
                self.log_snapshot(&snapshot);
                self.world.resource_mut::<SnapshotRing>().push(snapshot);
            }
        }

        if !self.terminal_emitted {
            match self.state() {
                PlayState::Won => {
                    self.terminal_events.push(TerminalEvent::Won);
                    self.terminal_emitted = true;
                }
                PlayState::Lost => {
                    self.terminal_events.push(TerminalEvent::Lost);
                    self.terminal_emitted = true;
                }
                _ => {}
            }
        }
    }

    /// Terminal events emitted since the last call.
    pub fn take_terminal_events(&mut self) -> Vec<TerminalEvent> {
        std::mem::take(&mut self.terminal_events)
    }

    /// Drain the frame's audio queue for the back-end.
    pub fn drain_audio(&mut self) -> Vec<SoundEvent> {
        self.world.resource_mut::<AudioQueue>().drain()
    }

    pub fn draw_list(&self) -> &DrawList {
        self.world.resource::<DrawList>()
    }

    /// The fixed per-frame pipeline. Order is the determinism contract;
    /// do not reorder.
    fn run_frame(&mut self, dt: f64) {
        systems::time::advance_time(&mut self.world, dt);
        let now = self.time();

        // Events due this frame, in timestamp order.
        let mut frame_events = Vec::new();
        self.pending_events.retain(|event| {
            if event.timestamp <= now {
                frame_events.push(event.clone());
                false
            } else {
                true
            }
        });

        self.apply_pointer(&frame_events);

        systems::movement::movement(&mut self.world);
        systems::movement::follow_parents(&mut self.world);
        systems::lifetime::tick_lifetimes(&mut self.world);

        systems::commit::sync_shadow(&mut self.world, &self.runtime);
        systems::behaviors::dispatch_pending_spawn_hooks(&mut self.world, &self.runtime);
        systems::scheduler::run_scheduled(&mut self.world, &self.runtime);
        self.dispatch_global_input(&frame_events);
        systems::behaviors::dispatch_on_update(&mut self.world, &self.runtime);
        systems::interactions::run_interactions(&mut self.world, &self.runtime, &self.def);
        systems::commit::commit_shadow(&mut self.world, &self.runtime, &self.def);

        systems::transforms::run_on_update_transforms(&mut self.world, &self.runtime, &self.def);
        systems::winlose::check_lose_conditions(&mut self.world, &self.def);
        systems::sweep::destroy_sweep(&mut self.world, &self.runtime, &self.def);

        // Post-sweep scripting point: children spawned during the sweep
        // get their on_spawn, and the win script sees fresh state.
        systems::commit::sync_shadow(&mut self.world, &self.runtime);
        systems::behaviors::dispatch_pending_spawn_hooks(&mut self.world, &self.runtime);
        systems::commit::commit_shadow(&mut self.world, &self.runtime, &self.def);

        systems::winlose::check_win(&mut self.world, &self.runtime, &self.def);
        systems::render::build_draw_list(&mut self.world, &self.runtime, &self.def);

        self.applied_events.extend(frame_events);
        self.dt_history.push(self.world.resource::<SimTime>().delta);
    }

    /// Update the pointer pseudo-entity from this frame's events.
    /// Input `[0, 1]` is closed at both ends: 1.0 maps to the far pixel.
    fn apply_pointer(&mut self, frame_events: &[PlaneHitEvent]) {
        let screen = *self.world.resource::<Screen>();
        let mut pointer = self.world.resource_mut::<Pointer>();
        pointer.active = !frame_events.is_empty();
        if let Some(event) = frame_events.last() {
            pointer.pos = Vec2::new(
                (event.x as f32) * screen.w,
                (event.y as f32) * screen.h,
            );
            pointer.input_type = event.method.clone();
        }
    }

    /// Fire the game's global input action once per event, regardless of
    /// entities hit.
    fn dispatch_global_input(&mut self, frame_events: &[PlaneHitEvent]) {
        let Some(action) = self.def.global_input_action.clone() else {
            return;
        };
        let screen = *self.world.resource::<Screen>();
        for event in frame_events {
            let x = (event.x as f32) * screen.w;
            let y = (event.y as f32) * screen.h;
            let args = prop_to_lua(
                self.runtime.lua(),
                &PropValue::Map(event.metadata.clone()),
            )
            .unwrap_or(mlua::Value::Nil);
            if let Err(e) = self.runtime.call(&action, "execute", "", (x, y, args)) {
                warn!("{e}");
            }
        }
    }

    /// Capture the full value-typed simulation state.
    pub fn capture_snapshot(&mut self) -> Snapshot {
        let mut entities: Vec<EntitySnapshot> = Vec::new();
        {
            let mut query = self.world.query::<(
                &Ident,
                &Kind,
                &Position,
                &Velocity,
                &BoxSize,
                &Visual,
                &Health,
                &Props,
                &InteractionMemory,
                Option<&ChildOf>,
                Option<&ChildIds>,
                Option<&Lifetime>,
                Option<&DestroyPending>,
            )>();
            for (
                ident,
                kind,
                position,
                velocity,
                size,
                visual,
                health,
                props,
                memory,
                child_of,
                children,
                lifetime,
                pending,
            ) in query.iter(&self.world)
            {
                entities.push(EntitySnapshot {
                    id: ident.id.clone(),
                    serial: ident.serial,
                    type_name: kind.name.clone(),
                    spawn_time: ident.spawn_time,
                    x: position.pos.x,
                    y: position.pos.y,
                    w: size.w,
                    h: size.h,
                    vx: velocity.vel.x,
                    vy: velocity.vel.y,
                    sprite: visual.sprite.clone(),
                    color: visual.color.clone(),
                    visible: visual.visible,
                    health: health.hits,
                    max_hits: health.max_hits,
                    props: props.map.clone(),
                    parent: child_of.map(|c| (c.parent.clone(), c.offset.x, c.offset.y)),
                    children: children.map(|c| c.ids.clone()).unwrap_or_default(),
                    lifetime: lifetime.map(|l| l.remaining),
                    destroy_pending: pending.is_some(),
                    interaction_edges: memory.edges.clone(),
                    interaction_intervals: memory.intervals.clone(),
                });
            }
        }
        entities.sort_by_key(|e| e.serial);

        let time = *self.world.resource::<SimTime>();
        let status = self.world.resource::<GameStatus>().clone();
        let pointer = self.world.resource::<Pointer>().clone();
        let scheduled = self.world.resource::<ScheduledCallbacks>().entries.clone();
        let next_serial = self.world.resource::<EntityIndex>().next_serial;
        let rng_seed = self.runtime.with_shadow(|s| s.rng.get_seed());

        Snapshot {
            frame: time.frame,
            time: time.elapsed,
            rng_seed,
            score: status.score,
            lives: status.lives,
            state: status.state,
            next_serial,
            pointer,
            entities,
            scheduled,
        }
    }

    /// Restore a snapshot exactly: despawn everything, rebuild from the
    /// value-typed state, reset the clock, RNG, and queues.
    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) {
        debug!(
            "restoring snapshot frame {} (t={:.3})",
            snapshot.frame, snapshot.time
        );
        let existing: Vec<Entity> = {
            let mut query = self.world.query_filtered::<Entity, With<Ident>>();
            query.iter(&self.world).collect()
        };
        for entity in existing {
            self.world.despawn(entity);
        }
        self.world.resource_mut::<EntityIndex>().clear();

        for snap in &snapshot.entities {
            let type_def = self.def.entity_type(&snap.type_name);
            let base_chain = type_def.map(|t| t.base_chain.clone()).unwrap_or_default();
            let tags = type_def
                .map(|t| Tags::new(t.tags.iter().cloned()))
                .unwrap_or_default();
            let behaviors = type_def
                .map(|t| {
                    t.behaviors
                        .iter()
                        .map(|(name, config)| BehaviorAttachment {
                            name: name.clone(),
                            config: config.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            let entity = self
                .world
                .spawn((
                    Ident::new(snap.id.clone(), snap.serial, snap.spawn_time),
                    Kind::new(&snap.type_name, base_chain),
                    tags,
                    Position::new(snap.x, snap.y),
                    Velocity::new(snap.vx, snap.vy),
                    BoxSize::new(snap.w, snap.h),
                    Visual {
                        sprite: snap.sprite.clone(),
                        color: snap.color.clone(),
                        visible: snap.visible,
                    },
                    Health {
                        hits: snap.health,
                        max_hits: snap.max_hits,
                    },
                    Props::new(snap.props.clone()),
                    BehaviorSet { list: behaviors },
                    ChildIds {
                        ids: snap.children.clone(),
                    },
                    InteractionMemory {
                        edges: snap.interaction_edges.clone(),
                        intervals: snap.interaction_intervals.clone(),
                    },
                ))
                .id();
            if let Some((parent, ox, oy)) = &snap.parent {
                self.world
                    .entity_mut(entity)
                    .insert(ChildOf::new(parent, *ox, *oy));
            }
            if let Some(remaining) = snap.lifetime {
                self.world.entity_mut(entity).insert(Lifetime { remaining });
            }
            if snap.destroy_pending {
                self.world.entity_mut(entity).insert(DestroyPending);
            }
            self.world
                .resource_mut::<EntityIndex>()
                .insert(snap.id.clone(), entity);
        }

        {
            let mut time = self.world.resource_mut::<SimTime>();
            time.elapsed = snapshot.time;
            time.frame = snapshot.frame;
            time.delta = 0.0;
        }
        {
            let mut status = self.world.resource_mut::<GameStatus>();
            status.score = snapshot.score;
            status.lives = snapshot.lives;
            status.state = snapshot.state;
        }
        *self.world.resource_mut::<Pointer>() = snapshot.pointer.clone();
        self.world.resource_mut::<ScheduledCallbacks>().entries = snapshot.scheduled.clone();
        self.world.resource_mut::<EntityIndex>().next_serial = snapshot.next_serial;
        self.world.resource_mut::<DestroyQueue>().ids.clear();
        self.world.resource_mut::<AudioQueue>().events.clear();
        self.world.resource_mut::<PendingSpawnHooks>().ids.clear();
        self.runtime
            .with_shadow(|s| s.rng = fastrand::Rng::with_seed(snapshot.rng_seed));
    }

    /// Restore to before `t_event` and replay forward deterministically.
    fn rollback_and_replay(&mut self, t_event: f64) {
        let snapshot = match self
            .world
            .resource::<SnapshotRing>()
            .at_or_before(t_event)
            .cloned()
        {
            Some(snapshot) => snapshot,
            None => {
                warn!(
                    "no snapshot at or before t={t_event:.3}; late input applied at current time"
                );
                return;
            }
        };
        info!(
            "rollback: late input at t={t_event:.3}, restoring frame {} (t={:.3})",
            snapshot.frame, snapshot.time
        );
        self.world
            .resource_mut::<SnapshotRing>()
            .truncate_after(snapshot.time);
        self.restore_snapshot(&snapshot);

        // Move applied events newer than the snapshot back into pending;
        // they re-apply at their original timestamps during replay.
        let mut replayable: Vec<PlaneHitEvent> = Vec::new();
        self.applied_events.retain(|event| {
            if event.timestamp > snapshot.time {
                replayable.push(event.clone());
                false
            } else {
                true
            }
        });
        self.pending_events.extend(replayable);
        self.pending_events
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        // Re-run the recorded dt schedule.
        let schedule: Vec<f64> = self.dt_history.split_off(snapshot.frame as usize);
        for dt in schedule {
            self.run_frame(dt);
        }
    }

    fn log_snapshot(&mut self, snapshot: &Snapshot) {
        if let Some(log) = self.replay_log.as_mut() {
            match serde_json::to_string(snapshot) {
                Ok(line) => {
                    if let Err(e) = writeln!(log, "{line}") {
                        warn!("replay log write failed: {e}");
                        self.replay_log = None;
                    }
                }
                Err(e) => warn!("snapshot serialization failed: {e}"),
            }
        }
    }
}
