//! Raw serde mirror of the on-disk YAML game definition.
//!
//! Parsing happens in two stages: the document is first read into a
//! generic `serde_yaml::Value` (failures are `Parse` errors), then
//! converted into these structs (failures are `Schema` errors). Freeform
//! blocks (`when:`, `properties:`, `modifier:`) stay as `Value` and are
//! interpreted by the loader with path-qualified messages.

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// A reference to a script: a name, an inline `{lua: "..."}` node, or a
/// `{file: "..."}` node. Inline nodes are extracted to synthetic names by
/// the loader, after which the definition is homogeneous.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawScriptRef {
    Name(String),
    Inline { lua: String },
    File { file: String },
}

/// A behavior attached to an entity type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBehaviorEntry {
    Name(String),
    Configured {
        name: String,
        #[serde(default)]
        config: Option<Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInteraction {
    pub target: String,
    #[serde(default)]
    pub when: Option<Value>,
    /// Trigger mode: enter (default) / exit / continuous.
    #[serde(default)]
    pub because: Option<String>,
    pub action: RawScriptRef,
    #[serde(default)]
    pub modifier: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChildSpawn {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub count: Option<u32>,
    /// `[dx, dy]` pair or inline script node.
    #[serde(default)]
    pub offset: Option<Value>,
    #[serde(default)]
    pub inherit_velocity: Option<f32>,
    #[serde(default)]
    pub lifetime: Option<f64>,
    /// Values may be literals, `$prop` refs, or inline script nodes.
    #[serde(default)]
    pub properties: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransform {
    #[serde(default)]
    pub destroy: Option<bool>,
    #[serde(default)]
    pub change_type: Option<String>,
    /// `keep` (default) or `replace`.
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<RawChildSpawn>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOnUpdate {
    #[serde(default)]
    pub age_min: Option<f64>,
    #[serde(default)]
    pub age_max: Option<f64>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub interval: Option<f64>,
    pub transform: RawTransform,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRenderCmd {
    pub shape: String,
    #[serde(default)]
    pub offset: Option<(f32, f32)>,
    #[serde(default)]
    pub size: Option<(f32, f32)>,
    /// Palette name, `[r, g, b]` literal, or `$prop` reference.
    #[serde(default)]
    pub color: Option<Value>,
    #[serde(default)]
    pub alpha: Option<u8>,
    #[serde(default)]
    pub fill: Option<bool>,
    #[serde(default)]
    pub line_width: Option<f32>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub points: Option<Vec<(f32, f32)>>,
    /// Property name, `{property, value}` pair, or inline script node.
    #[serde(default)]
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEntityType {
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub max_hits: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub behaviors: Option<Vec<RawBehaviorEntry>>,
    #[serde(default)]
    pub interactions: Option<Vec<RawInteraction>>,
    #[serde(default)]
    pub render: Option<Vec<RawRenderCmd>>,
    #[serde(default)]
    pub on_destroy: Option<RawTransform>,
    #[serde(default)]
    pub on_parent_destroy: Option<RawTransform>,
    #[serde(default)]
    pub on_update: Option<Vec<RawOnUpdate>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDefaults {
    #[serde(default)]
    pub lives: Option<i64>,
    #[serde(default)]
    pub pacing: Option<String>,
    #[serde(default)]
    pub quiver_size: Option<i64>,
    #[serde(default)]
    pub retrieval_pause: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWinCondition {
    #[serde(default)]
    pub destroy_all: Option<String>,
    #[serde(default)]
    pub reach_score: Option<i64>,
    #[serde(default)]
    pub script: Option<RawScriptRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLoseCondition {
    pub entity_type: String,
    pub event: String,
    #[serde(default)]
    pub edge: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub then: Option<RawThen>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawThen {
    /// Destroy all entities of this type.
    #[serde(default)]
    pub destroy: Option<String>,
    /// `{from: type, to: type}` morph of a whole type.
    #[serde(default)]
    pub morph: Option<RawMorph>,
    #[serde(default)]
    pub clear_property: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMorph {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLayoutCell {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLayout {
    pub rows: Vec<String>,
    pub key: BTreeMap<String, RawLayoutCell>,
    #[serde(default)]
    pub cell_size: Option<(f32, f32)>,
    #[serde(default)]
    pub origin: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLevelSpawn {
    #[serde(rename = "type")]
    pub type_name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: Option<f32>,
    #[serde(default)]
    pub vy: Option<f32>,
}

/// A `levels/*.yaml` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLevel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub layout: Option<RawLayout>,
    #[serde(default)]
    pub spawns: Option<Vec<RawLevelSpawn>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSpriteSheet {
    pub image: String,
    #[serde(default)]
    pub regions: BTreeMap<String, (f32, f32, f32, f32)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSpriteAlias {
    pub target: String,
    #[serde(default)]
    pub flip_x: Option<bool>,
    #[serde(default)]
    pub flip_y: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAssets {
    #[serde(default)]
    pub sheets: BTreeMap<String, RawSpriteSheet>,
    #[serde(default)]
    pub aliases: BTreeMap<String, RawSpriteAlias>,
    #[serde(default)]
    pub sounds: BTreeMap<String, String>,
}

/// Root of `game.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGameDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub screen_width: Option<f32>,
    #[serde(default)]
    pub screen_height: Option<f32>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub palette: BTreeMap<String, (u8, u8, u8)>,
    #[serde(default)]
    pub defaults: RawDefaults,
    #[serde(default)]
    pub entity_types: BTreeMap<String, RawEntityType>,
    #[serde(default)]
    pub behaviors: BTreeMap<String, RawScriptRef>,
    #[serde(default)]
    pub interaction_actions: BTreeMap<String, RawScriptRef>,
    #[serde(default)]
    pub collision_actions: BTreeMap<String, RawScriptRef>,
    #[serde(default)]
    pub input_actions: BTreeMap<String, RawScriptRef>,
    #[serde(default)]
    pub generators: BTreeMap<String, RawScriptRef>,
    #[serde(default)]
    pub global_input: Option<RawScriptRef>,
    #[serde(default)]
    pub win_condition: Option<RawWinCondition>,
    #[serde(default)]
    pub lose_conditions: Vec<RawLoseCondition>,
    #[serde(default)]
    pub layout: Option<RawLayout>,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub assets: RawAssets,
}
