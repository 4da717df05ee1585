//! Game definition: the immutable, fully-resolved model of a game.
//!
//! The [`loader`] turns `game.yaml` (plus level files and scripts) into a
//! [`GameDef`]: `extends` chains resolved, inline `{lua: "..."}` nodes
//! extracted to synthetic names, every reference checked. A `GameDef` is
//! frozen for the duration of a level; all runtime state lives in the ECS
//! world, never here.

pub mod error;
pub mod loader;
mod raw;

use crate::components::props::{PropMap, PropValue};
use rustc_hash::FxHashMap;

/// Name of the implicit base entity type every `extends` chain converges to.
pub const BASE_TYPE: &str = "entity";

/// The five system pseudo-entities addressable as interaction targets.
pub const PSEUDO_ENTITIES: [&str; 5] = ["pointer", "screen", "level", "game", "time"];

/// Which script namespace a name lives in. The four action namespaces are
/// disjoint; behaviors and generators are separate again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptNamespace {
    Behavior,
    /// Canonical `execute(a, b, modifier, context)` actions.
    InteractionAction,
    /// Legacy `execute(a, b, modifier)` collision actions.
    CollisionAction,
    /// Legacy `execute(x, y, args)` input actions.
    InputAction,
    /// Property generators: `generate(entity_id, i)`.
    Generator,
    /// Win-condition / render-predicate expressions: `evaluate(...)`.
    Expression,
}

impl ScriptNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptNamespace::Behavior => "behavior",
            ScriptNamespace::InteractionAction => "interaction_action",
            ScriptNamespace::CollisionAction => "collision_action",
            ScriptNamespace::InputAction => "input_action",
            ScriptNamespace::Generator => "generator",
            ScriptNamespace::Expression => "expression",
        }
    }
}

/// A named script after inline extraction: where it came from and its
/// Lua source, ready for one-time compilation into the sandbox.
#[derive(Debug, Clone)]
pub struct ScriptDef {
    pub name: String,
    pub namespace: ScriptNamespace,
    pub source: String,
    /// Virtual path for file-backed scripts; synthetic locator for inline.
    pub origin: String,
}

/// Game-wide defaults.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub lives: i64,
    pub pacing: Option<String>,
    pub quiver_size: Option<i64>,
    pub retrieval_pause: Option<f64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            lives: 3,
            pacing: None,
            quiver_size: None,
            retrieval_pause: None,
        }
    }
}

/// How a distance filter measures each endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasureMode {
    /// AABB edge (separation; 0 = touch).
    #[default]
    Edge,
    /// Box center.
    Center,
}

/// Comparison applied by scalar and property predicates. `Eq` is the
/// implicit operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(PropValue),
    Lt(f64),
    Gt(f64),
    Lte(f64),
    Gte(f64),
    Between(f64, f64),
    In(Vec<PropValue>),
}

impl Comparison {
    /// Evaluate against a property value.
    pub fn matches(&self, value: &PropValue) -> bool {
        match self {
            Comparison::Eq(expected) => match (expected.as_number(), value.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => expected == value,
            },
            Comparison::Lt(n) => value.as_number().is_some_and(|v| v < *n),
            Comparison::Gt(n) => value.as_number().is_some_and(|v| v > *n),
            Comparison::Lte(n) => value.as_number().is_some_and(|v| v <= *n),
            Comparison::Gte(n) => value.as_number().is_some_and(|v| v >= *n),
            Comparison::Between(lo, hi) => value.as_number().is_some_and(|v| v >= *lo && v <= *hi),
            Comparison::In(set) => set.iter().any(|e| Comparison::Eq(e.clone()).matches(value)),
        }
    }

    /// Evaluate against a plain scalar (distance filters).
    pub fn matches_scalar(&self, v: f64) -> bool {
        self.matches(&PropValue::Number(v))
    }
}

/// One property predicate on `a.<key>` or `b.<key>`.
#[derive(Debug, Clone)]
pub struct PropPredicate {
    pub key: String,
    pub cmp: Comparison,
}

/// Screen edge selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEdge {
    Top,
    Bottom,
    Left,
    Right,
    Any,
}

impl ScreenEdge {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// Conjunction of primitive predicates (`when:` block).
#[derive(Debug, Clone, Default)]
pub struct FilterDef {
    /// Distance comparison; a bare number means `<= n`.
    pub distance: Option<Comparison>,
    pub distance_from: MeasureMode,
    pub distance_to: MeasureMode,
    /// Degrees, wrapping allowed (lo may exceed hi).
    pub angle_between: Option<(f64, f64)>,
    pub props_a: Vec<PropPredicate>,
    pub props_b: Vec<PropPredicate>,
    /// Sugar for `screen` targets.
    pub edges: Vec<ScreenEdge>,
    /// Moves the edge line for `edges:` checks.
    pub margin: f32,
}

/// When an interaction fires relative to its filter's truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    #[default]
    Enter,
    Exit,
    Continuous,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Enter => "enter",
            TriggerMode::Exit => "exit",
            TriggerMode::Continuous => "continuous",
        }
    }
}

/// One `(target, filter, trigger, action)` tuple on an entity type.
#[derive(Debug, Clone)]
pub struct InteractionDef {
    /// Entity type, tag, or pseudo-entity name.
    pub target: String,
    pub filter: FilterDef,
    pub trigger: TriggerMode,
    /// Action name; its namespace decides the calling convention.
    pub action: String,
    /// Opaque table passed to the action as `modifier`.
    pub modifier: PropMap,
}

/// How a child-spawn descriptor positions each child.
#[derive(Debug, Clone)]
pub enum OffsetSpec {
    Literal(f32, f32),
    /// Generator script; `generate(parent_id, i)` returns `{x, y}`.
    Script(String),
}

/// A property value in a child descriptor.
#[derive(Debug, Clone)]
pub enum ChildPropSpec {
    Literal(PropValue),
    /// `$name`: copied from the parent at spawn time.
    ParentRef(String),
    /// Generator script; `generate(parent_id, i)` returns the value.
    Script(String),
}

/// One child spawned by a transform.
#[derive(Debug, Clone)]
pub struct ChildSpawnDef {
    pub type_name: String,
    pub count: u32,
    pub offset: OffsetSpec,
    /// Scale applied to the parent's velocity (0 = none).
    pub inherit_velocity: f32,
    /// Auto-destroy after this many seconds.
    pub lifetime: Option<f64>,
    pub properties: FxHashMap<String, ChildPropSpec>,
}

/// Declarative side effect of a lifecycle/interaction event.
#[derive(Debug, Clone, Default)]
pub struct TransformDef {
    pub destroy: bool,
    /// Morph: replace the entity's type while preserving identity.
    pub change_type: Option<String>,
    /// Keep custom properties across a morph (default true).
    pub keep_properties: bool,
    pub children: Vec<ChildSpawnDef>,
}

/// Type-level conditional transform evaluated every frame.
#[derive(Debug, Clone)]
pub struct OnUpdateTransformDef {
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    pub property: Option<String>,
    pub value: Option<PropValue>,
    /// Repeat every N seconds (per-entity accumulator).
    pub interval: Option<f64>,
    pub transform: TransformDef,
}

/// Color reference in a render command.
#[derive(Debug, Clone)]
pub enum ColorRef {
    Palette(String),
    Literal(u8, u8, u8),
    /// `$prop`: resolved from the entity at draw time.
    Property(String),
}

/// Render predicate (`when:`).
#[derive(Debug, Clone)]
pub enum RenderWhen {
    /// Property equals value (or is truthy when value is nil).
    Property { key: String, value: PropValue },
    /// Expression script; `evaluate(entity_id)` returns a boolean.
    Script(String),
}

/// Shape/content of one render command.
#[derive(Debug, Clone)]
pub enum RenderShape {
    Rectangle,
    Circle,
    Triangle,
    Polygon { points: Vec<(f32, f32)> },
    Line,
    /// Sprite name; may contain `{prop}` template slots.
    Sprite { name: String },
    /// Text; may contain `{prop}` template slots.
    Text { text: String, font_size: f32 },
    /// Halt the command list for this entity.
    Stop,
}

/// One command in an entity type's render list.
#[derive(Debug, Clone)]
pub struct RenderCmdDef {
    pub shape: RenderShape,
    pub offset: (f32, f32),
    /// Defaults to the entity's box size.
    pub size: Option<(f32, f32)>,
    pub color: Option<ColorRef>,
    pub alpha: u8,
    pub fill: bool,
    pub line_width: f32,
    pub when: Option<RenderWhen>,
}

/// Win condition, one of three forms.
#[derive(Debug, Clone)]
pub enum WinCondition {
    DestroyAll { target: String },
    ReachScore { target: i64 },
    /// Expression script; `evaluate()` returns a boolean.
    Script(String),
}

/// Lose-condition event kind.
#[derive(Debug, Clone)]
pub enum LoseEvent {
    ExitedScreen { edge: ScreenEdge },
    PropertyTrue { property: String },
    Destroyed,
}

/// What a firing lose condition does to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoseAction {
    LoseLife,
    EndGame,
    None,
}

/// `then:` block of a lose condition: a transform applied to a target set.
#[derive(Debug, Clone, Default)]
pub struct ThenDef {
    /// Destroy all entities of this type.
    pub destroy_type: Option<String>,
    /// Morph all entities of this type.
    pub morph: Option<(String, String)>,
    /// Clear this property on all entities of the matching type.
    pub clear_property: Option<String>,
}

/// One declarative lose trigger.
#[derive(Debug, Clone)]
pub struct LoseConditionDef {
    pub entity_type: String,
    pub event: LoseEvent,
    pub action: LoseAction,
    pub then: ThenDef,
}

/// One glyph of an ASCII layout key.
#[derive(Debug, Clone)]
pub struct LayoutCellDef {
    pub type_name: String,
    pub properties: PropMap,
}

/// ASCII-grid layout.
#[derive(Debug, Clone)]
pub struct LayoutDef {
    pub rows: Vec<String>,
    pub key: FxHashMap<char, LayoutCellDef>,
    pub cell_width: f32,
    pub cell_height: f32,
    pub origin: (f32, f32),
}

/// A single level: a layout plus direct spawns.
#[derive(Debug, Clone, Default)]
pub struct LevelDef {
    pub name: String,
    pub layout: Option<LayoutDef>,
    pub spawns: Vec<LevelSpawnDef>,
}

/// One explicit spawn in a level file.
#[derive(Debug, Clone)]
pub struct LevelSpawnDef {
    pub type_name: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Sprite sheet: an image with named regions.
#[derive(Debug, Clone)]
pub struct SpriteSheetDef {
    pub image: String,
    /// name → (x, y, w, h) in sheet pixels.
    pub regions: FxHashMap<String, (f32, f32, f32, f32)>,
}

/// Sprite alias with a simple transform.
#[derive(Debug, Clone)]
pub struct SpriteAliasDef {
    pub target: String,
    pub flip_x: bool,
    pub flip_y: bool,
}

/// Asset tables.
#[derive(Debug, Clone, Default)]
pub struct AssetsDef {
    pub sheets: FxHashMap<String, SpriteSheetDef>,
    pub aliases: FxHashMap<String, SpriteAliasDef>,
    /// sound name → file vpath.
    pub sounds: FxHashMap<String, String>,
}

impl AssetsDef {
    /// A sprite name resolves if it is a region, an alias, or a template
    /// (contains `{slot}` markers filled at draw time).
    pub fn sprite_known(&self, name: &str) -> bool {
        if name.contains('{') {
            return true;
        }
        self.aliases.contains_key(name)
            || self
                .sheets
                .values()
                .any(|sheet| sheet.regions.contains_key(name))
    }
}

/// Resolved entity type: geometry, defaults, behaviors, interactions,
/// render list, lifecycle transforms. `extends` is already folded in.
#[derive(Debug, Clone)]
pub struct EntityTypeDef {
    pub name: String,
    /// Nearest parent first, ending at [`BASE_TYPE`].
    pub base_chain: Vec<String>,
    pub width: f32,
    pub height: f32,
    pub color: Option<String>,
    pub sprite: Option<String>,
    pub max_hits: i64,
    pub properties: PropMap,
    pub tags: Vec<String>,
    pub behaviors: Vec<(String, PropMap)>,
    pub interactions: Vec<InteractionDef>,
    pub render: Vec<RenderCmdDef>,
    pub on_destroy: Option<TransformDef>,
    pub on_parent_destroy: Option<TransformDef>,
    pub on_update: Vec<OnUpdateTransformDef>,
}

/// The loaded, immutable game definition.
#[derive(Debug, Clone)]
pub struct GameDef {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub screen_width: f32,
    pub screen_height: f32,
    pub background_color: Option<String>,
    pub palette: FxHashMap<String, (u8, u8, u8)>,
    pub defaults: Defaults,
    pub entity_types: FxHashMap<String, EntityTypeDef>,
    pub scripts: FxHashMap<String, ScriptDef>,
    /// Fired on every input event regardless of entities hit.
    pub global_input_action: Option<String>,
    pub win_condition: Option<WinCondition>,
    pub lose_conditions: Vec<LoseConditionDef>,
    /// Level file vpaths relative to the game directory, in play order.
    pub levels: Vec<String>,
    /// The root-level layout, used when no level file is given.
    pub layout: Option<LayoutDef>,
    pub assets: AssetsDef,
}

impl GameDef {
    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_types.get(name)
    }

    pub fn script(&self, name: &str) -> Option<&ScriptDef> {
        self.scripts.get(name)
    }

    /// Namespace of a named action, if it exists in any action namespace.
    pub fn action_namespace(&self, name: &str) -> Option<ScriptNamespace> {
        self.scripts.get(name).map(|s| s.namespace).filter(|ns| {
            matches!(
                ns,
                ScriptNamespace::InteractionAction
                    | ScriptNamespace::CollisionAction
                    | ScriptNamespace::InputAction
            )
        })
    }
}
