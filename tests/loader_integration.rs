//! Integration tests for the game-definition loader: schema validation,
//! extends resolution, inline-script extraction, reference closure.

use amsengine::content::ContentFs;
use amsengine::definition::error::LoadErrorKind;
use amsengine::definition::loader::{load_game, load_level, LoadOptions};
use amsengine::definition::{ScriptNamespace, TriggerMode, WinCondition};
use amsengine::script::runtime::ScriptRuntime;

fn fs_with_game(yaml: &str) -> (tempfile::TempDir, ContentFs) {
    let dir = tempfile::tempdir().unwrap();
    let game_dir = dir.path().join("games/test");
    std::fs::create_dir_all(&game_dir).unwrap();
    std::fs::write(game_dir.join("game.yaml"), yaml).unwrap();
    let mut content = ContentFs::new();
    content.add_layer("test", dir.path(), 100);
    (dir, content)
}

fn load(yaml: &str) -> Result<amsengine::definition::GameDef, amsengine::definition::error::LoadError>
{
    let (_dir, content) = fs_with_game(yaml);
    let mut runtime = ScriptRuntime::new(200_000).unwrap();
    let result = load_game(&content, &mut runtime, "test", &LoadOptions::default());
    result
}

const MINIMAL: &str = r#"
name: Minimal
screen_width: 800
screen_height: 600
entity_types:
  thing:
    width: 10
    height: 10
win_condition:
  destroy_all: thing
"#;

#[test]
fn minimal_game_loads() {
    let def = load(MINIMAL).unwrap();
    assert_eq!(def.name, "Minimal");
    assert_eq!(def.screen_width, 800.0);
    let thing = def.entity_type("thing").unwrap();
    assert_eq!(thing.base_chain, vec!["entity".to_string()]);
    assert!(matches!(
        def.win_condition,
        Some(WinCondition::DestroyAll { .. })
    ));
}

#[test]
fn missing_required_fields_are_schema_errors() {
    let err = load("name: NoScreen\nentity_types: {a: {}}\nwin_condition: {reach_score: 1}\n")
        .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::Schema);
    assert!(err.path.contains("screen_width"), "path was {}", err.path);

    let err = load("name: X\nscreen_width: 10\nscreen_height: 10\nentity_types: {a: {}}\n")
        .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::Schema);
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = load("name: [unclosed\n").unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::Parse);
}

#[test]
fn extends_merges_with_child_override() {
    let def = load(
        r#"
name: Extends
screen_width: 100
screen_height: 100
entity_types:
  block:
    width: 50
    height: 20
    color: red
    tags: [solid]
    properties: {points: 1, hardness: 2}
  brick:
    extends: block
    color: blue
    properties: {points: 5}
win_condition:
  destroy_all: block
"#,
    )
    .unwrap();
    let brick = def.entity_type("brick").unwrap();
    // Child overrides scalar fields and individual property keys.
    assert_eq!(brick.color.as_deref(), Some("blue"));
    assert_eq!(brick.width, 50.0);
    assert_eq!(brick.tags, vec!["solid".to_string()]);
    assert_eq!(
        brick.properties.get("points").and_then(|v| v.as_number()),
        Some(5.0)
    );
    assert_eq!(
        brick.properties.get("hardness").and_then(|v| v.as_number()),
        Some(2.0)
    );
    assert_eq!(
        brick.base_chain,
        vec!["block".to_string(), "entity".to_string()]
    );
}

#[test]
fn extend_cycles_are_fatal() {
    let err = load(
        r#"
name: Cycle
screen_width: 100
screen_height: 100
entity_types:
  a: {extends: b}
  b: {extends: a}
win_condition: {reach_score: 1}
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::ExtendCycle);
}

#[test]
fn unknown_base_type_is_a_missing_reference() {
    let err = load(
        r#"
name: Dangling
screen_width: 100
screen_height: 100
entity_types:
  a: {extends: ghost}
win_condition: {reach_score: 1}
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::MissingReference);
}

#[test]
fn inline_scripts_are_extracted_and_compiled() {
    let def = load(
        r#"
name: Inline
screen_width: 100
screen_height: 100
entity_types:
  duck:
    width: 50
    height: 50
    interactions:
      - target: pointer
        when: {distance: 0, b.active: true}
        because: enter
        action: {lua: "ams.destroy(entity_id)"}
win_condition:
  destroy_all: duck
"#,
    )
    .unwrap();
    let duck = def.entity_type("duck").unwrap();
    assert_eq!(duck.interactions.len(), 1);
    let interaction = &duck.interactions[0];
    assert_eq!(interaction.trigger, TriggerMode::Enter);
    // The inline node was replaced by a synthetic name that resolves.
    let script = def.script(&interaction.action).unwrap();
    assert_eq!(script.namespace, ScriptNamespace::InteractionAction);
    assert!(script.source.contains("ams.destroy"));
}

#[test]
fn broken_inline_script_is_a_compile_error() {
    let err = load(
        r#"
name: Broken
screen_width: 100
screen_height: 100
entity_types:
  duck:
    interactions:
      - target: pointer
        action: {lua: "this is not lua ("}
win_condition:
  destroy_all: duck
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::ScriptCompile);
}

#[test]
fn unknown_action_reference_fails_closure_check() {
    let err = load(
        r#"
name: Missing
screen_width: 100
screen_height: 100
entity_types:
  duck:
    interactions:
      - target: pointer
        action: never_defined
win_condition:
  destroy_all: duck
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::MissingReference);
}

#[test]
fn unknown_trigger_mode_is_a_schema_error() {
    let err = load(
        r#"
name: BadTrigger
screen_width: 100
screen_height: 100
entity_types:
  duck:
    interactions:
      - target: pointer
        because: sometimes
        action: {lua: "return"}
win_condition:
  destroy_all: duck
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::Schema);
}

#[test]
fn behavior_modules_report_their_entry_points() {
    let (_dir, content) = fs_with_game(
        r#"
name: Hooks
screen_width: 100
screen_height: 100
behaviors:
  fuse:
    lua: |
      local M = {}
      function M.on_spawn(id)
        ams.schedule(2.0, "expire", id)
      end
      function M.expire(id)
        ams.destroy(id)
      end
      return M
entity_types:
  bomb:
    behaviors: [fuse]
win_condition:
  destroy_all: bomb
"#,
    );
    let mut runtime = ScriptRuntime::new(200_000).unwrap();
    let def = load_game(&content, &mut runtime, "test", &LoadOptions::default()).unwrap();
    assert!(runtime.exports("fuse", "on_spawn"));
    assert!(runtime.exports("fuse", "expire"));
    assert!(!runtime.exports("fuse", "on_update"));
    assert!(def.entity_type("bomb").is_some());
}

#[test]
fn shipped_breakout_sample_loads() {
    let mut content = ContentFs::new();
    content.add_layer(
        "engine",
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("content"),
        5,
    );
    let mut runtime = ScriptRuntime::new(200_000).unwrap();
    let def = load_game(&content, &mut runtime, "breakout", &LoadOptions::default()).unwrap();

    assert_eq!(def.name, "Breakout");
    // File-backed behaviors compiled as modules with their hooks.
    assert!(runtime.exports("follow_pointer", "on_update"));
    assert!(runtime.exports("bounce", "on_spawn"));
    // hard_brick inherits the brick tag through its base chain.
    let hard = def.entity_type("hard_brick").unwrap();
    assert!(hard.base_chain.contains(&"block".to_string()));
    assert!(hard.tags.contains(&"brick".to_string()));
    assert_eq!(hard.max_hits, 2);

    let level = load_level(&content, "breakout", "levels/one.yaml", &def).unwrap();
    assert_eq!(level.spawns.len(), 2);
    assert!(level.layout.is_some());
}

#[test]
fn level_files_load_through_the_content_fs() {
    let (dir, content) = fs_with_game(
        r#"
name: Levels
screen_width: 100
screen_height: 100
entity_types:
  brick: {width: 10, height: 5}
levels: [levels/one.yaml]
win_condition:
  destroy_all: brick
"#,
    );
    std::fs::create_dir_all(dir.path().join("games/test/levels")).unwrap();
    std::fs::write(
        dir.path().join("games/test/levels/one.yaml"),
        r#"
name: One
layout:
  origin: [10, 20]
  cell_size: [12, 6]
  key:
    "B": {type: brick}
  rows:
    - "BB"
    - " B"
spawns:
  - {type: brick, x: 50, y: 50, vx: 1}
"#,
    )
    .unwrap();
    let mut runtime = ScriptRuntime::new(200_000).unwrap();
    let def = load_game(&content, &mut runtime, "test", &LoadOptions::default()).unwrap();
    let level = load_level(&content, "test", "levels/one.yaml", &def).unwrap();
    let layout = level.layout.as_ref().unwrap();
    assert_eq!(layout.rows.len(), 2);
    assert_eq!(layout.cell_width, 12.0);
    assert_eq!(level.spawns.len(), 1);
    assert_eq!(level.spawns[0].vx, 1.0);

    // A level referencing an unknown type is a missing reference.
    std::fs::write(
        dir.path().join("games/test/levels/bad.yaml"),
        "spawns:\n  - {type: ghost, x: 0, y: 0}\n",
    )
    .unwrap();
    let err = load_level(&content, "test", "levels/bad.yaml", &def).unwrap_err();
    assert_eq!(err.kind, LoadErrorKind::MissingReference);
}
