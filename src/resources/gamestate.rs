//! Game-wide state resource.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the running game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    #[default]
    Playing,
    Paused,
    Won,
    Lost,
    /// Physical installations pause here while projectiles are fetched.
    Retrieval,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Won => "won",
            PlayState::Lost => "lost",
            PlayState::Retrieval => "retrieval",
        }
    }

    /// Terminal states stop the simulation pipeline.
    pub fn is_over(&self) -> bool {
        matches!(self, PlayState::Won | PlayState::Lost)
    }
}

/// Score, lives, and lifecycle state; the `game` pseudo-entity reads
/// from here.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct GameStatus {
    pub score: i64,
    pub lives: i64,
    pub state: PlayState,
}

impl GameStatus {
    pub fn new(lives: i64) -> Self {
        Self {
            score: 0,
            lives,
            state: PlayState::Playing,
        }
    }
}
