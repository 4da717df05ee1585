//! Entity type and tag components.

use bevy_ecs::prelude::Component;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// The entity's type, as a key into the game definition's `entity_types`.
///
/// `base_chain` is the resolved `extends` chain (nearest parent first),
/// computed once at load; interaction target matching walks it.
#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct Kind {
    pub name: String,
    pub base_chain: Vec<String>,
}

impl Kind {
    pub fn new(name: impl Into<String>, base_chain: Vec<String>) -> Self {
        Self {
            name: name.into(),
            base_chain,
        }
    }

    /// True if this entity's type is `target` or derives from it.
    pub fn is_a(&self, target: &str) -> bool {
        self.name == target || self.base_chain.iter().any(|b| b == target)
    }
}

/// Free-form string tags (`brick`, `enemy`, ...).
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct Tags {
    pub set: FxHashSet<String>,
}

impl Tags {
    pub fn new(tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            set: tags.into_iter().collect(),
        }
    }

    pub fn has(&self, tag: &str) -> bool {
        self.set.contains(tag)
    }
}
