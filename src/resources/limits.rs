//! Configurable engine ceilings.
//!
//! Every limit degrades gracefully when hit: warn and drop, never crash.
//! Values load from an INI file (`[limits]` section) with safe defaults
//! for startup.
//!
//! ```ini
//! [limits]
//! entity_cap = 1024
//! spawn_cap_per_frame = 256
//! callback_cap_per_frame = 256
//! script_instruction_budget = 200000
//! dt_cap = 0.25
//! snapshot_interval_frames = 10
//! snapshot_ring_capacity = 120
//! ```

use bevy_ecs::prelude::Resource;
use configparser::ini::Ini;
use log::info;
use std::path::Path;

const DEFAULT_ENTITY_CAP: usize = 1024;
const DEFAULT_SPAWN_CAP: usize = 256;
const DEFAULT_CALLBACK_CAP: usize = 256;
const DEFAULT_INSTRUCTION_BUDGET: u64 = 200_000;
const DEFAULT_DT_CAP: f64 = 0.25;
const DEFAULT_SNAPSHOT_INTERVAL: u64 = 10;
const DEFAULT_SNAPSHOT_RING: usize = 120;

/// Resource ceilings for one session.
#[derive(Debug, Clone, Resource)]
pub struct EngineLimits {
    /// Live entities per session; spawns beyond it are dropped.
    pub entity_cap: usize,
    /// Spawn requests honored per frame.
    pub spawn_cap_per_frame: usize,
    /// Scheduled-callback dispatches per frame.
    pub callback_cap_per_frame: usize,
    /// VM instructions per script invocation.
    pub script_instruction_budget: u64,
    /// Largest delta a single frame may consume, seconds.
    pub dt_cap: f64,
    /// Capture a snapshot every N frames (0 disables periodic capture).
    pub snapshot_interval_frames: u64,
    /// Snapshots retained in the rollback ring.
    pub snapshot_ring_capacity: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            entity_cap: DEFAULT_ENTITY_CAP,
            spawn_cap_per_frame: DEFAULT_SPAWN_CAP,
            callback_cap_per_frame: DEFAULT_CALLBACK_CAP,
            script_instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
            dt_cap: DEFAULT_DT_CAP,
            snapshot_interval_frames: DEFAULT_SNAPSHOT_INTERVAL,
            snapshot_ring_capacity: DEFAULT_SNAPSHOT_RING,
        }
    }
}

impl EngineLimits {
    /// Load overrides from an INI file. Missing file or missing keys keep
    /// the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Self {
        let mut limits = Self::default();
        let mut config = Ini::new();
        if config.load(path.as_ref()).is_err() {
            return limits;
        }
        if let Some(v) = config.getuint("limits", "entity_cap").ok().flatten() {
            limits.entity_cap = v as usize;
        }
        if let Some(v) = config.getuint("limits", "spawn_cap_per_frame").ok().flatten() {
            limits.spawn_cap_per_frame = v as usize;
        }
        if let Some(v) = config
            .getuint("limits", "callback_cap_per_frame")
            .ok()
            .flatten()
        {
            limits.callback_cap_per_frame = v as usize;
        }
        if let Some(v) = config
            .getuint("limits", "script_instruction_budget")
            .ok()
            .flatten()
        {
            limits.script_instruction_budget = v;
        }
        if let Some(v) = config.getfloat("limits", "dt_cap").ok().flatten() {
            if v.is_finite() && v > 0.0 {
                limits.dt_cap = v;
            }
        }
        if let Some(v) = config
            .getuint("limits", "snapshot_interval_frames")
            .ok()
            .flatten()
        {
            limits.snapshot_interval_frames = v;
        }
        if let Some(v) = config
            .getuint("limits", "snapshot_ring_capacity")
            .ok()
            .flatten()
        {
            limits.snapshot_ring_capacity = (v as usize).max(1);
        }
        info!("engine limits loaded from {}", path.as_ref().display());
        limits
    }
}
