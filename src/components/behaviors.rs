//! Attached behaviors component.

use crate::components::props::PropMap;
use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// One behavior attached to an entity: the script name plus the immutable
/// per-behavior config block from the type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorAttachment {
    pub name: String,
    pub config: PropMap,
}

/// Ordered list of behaviors attached to an entity. Hook dispatch
/// (`on_spawn`, `on_update`, `on_destroy`) follows this order.
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct BehaviorSet {
    pub list: Vec<BehaviorAttachment>,
}

impl BehaviorSet {
    pub fn config_for(&self, behavior: &str) -> Option<&PropMap> {
        self.list
            .iter()
            .find(|b| b.name == behavior)
            .map(|b| &b.config)
    }
}
