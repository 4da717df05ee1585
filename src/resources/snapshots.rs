//! Rollback snapshots of the authoritative simulation state.
//!
//! A snapshot is a value-typed capture sufficient to reconstruct the
//! simulation exactly, given the subsequent ordered input stream: late
//! physical inputs restore the newest snapshot at or before their event
//! time and re-simulate forward deterministically. Snapshots also
//! serialize to JSON lines for offline debugging.

use crate::components::props::PropMap;
use crate::resources::gamestate::PlayState;
use crate::resources::pointer::Pointer;
use crate::resources::queues::ScheduledCallback;
use bevy_ecs::prelude::Resource;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Full value-typed state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub serial: u64,
    pub type_name: String,
    pub spawn_time: f64,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub vx: f32,
    pub vy: f32,
    pub sprite: Option<String>,
    pub color: Option<String>,
    pub visible: bool,
    pub health: i64,
    pub max_hits: i64,
    pub props: PropMap,
    pub parent: Option<(String, f32, f32)>,
    pub children: Vec<String>,
    pub lifetime: Option<f64>,
    pub destroy_pending: bool,
    /// Edge-detection memory; replay must see identical transitions.
    pub interaction_edges: FxHashMap<String, bool>,
    pub interaction_intervals: FxHashMap<u32, f64>,
}

/// One captured simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub frame: u64,
    pub time: f64,
    pub rng_seed: u64,
    pub score: i64,
    pub lives: i64,
    pub state: PlayState,
    pub next_serial: u64,
    pub pointer: Pointer,
    /// Sorted by serial; restore preserves spawn order.
    pub entities: Vec<EntitySnapshot>,
    pub scheduled: Vec<ScheduledCallback>,
}

/// Ring of periodic snapshots, single writer (the simulation).
#[derive(Debug, Default, Resource)]
pub struct SnapshotRing {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Newest snapshot with `time <= at`.
    pub fn at_or_before(&self, at: f64) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|s| s.time <= at)
    }

    /// Drop snapshots newer than `at`; they are invalid after a rollback
    /// and will be regenerated during re-simulation.
    pub fn truncate_after(&mut self, at: f64) {
        while self
            .snapshots
            .back()
            .map(|s| s.time > at)
            .unwrap_or(false)
        {
            self.snapshots.pop_back();
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
