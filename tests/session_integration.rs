//! End-to-end session tests: full games defined in YAML, driven frame
//! by frame through the public session API.

use amsengine::components::position::Position;
use amsengine::components::props::Props;
use amsengine::content::ContentFs;
use amsengine::definition::loader::{load_game, LoadOptions};
use amsengine::events::planehit::PlaneHitEvent;
use amsengine::events::terminal::TerminalEvent;
use amsengine::resources::gamestate::PlayState;
use amsengine::resources::limits::EngineLimits;
use amsengine::resources::queues::DestroyQueue;
use amsengine::resources::snapshots::Snapshot;
use amsengine::script::runtime::ScriptRuntime;
use amsengine::session::{Session, SessionConfig};
use amsengine::systems::spawn::SpawnParams;

const DT: f64 = 1.0 / 60.0;

fn build_session_with(yaml: &str, seed: u64, limits: EngineLimits) -> (tempfile::TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let game_dir = dir.path().join("games/test");
    std::fs::create_dir_all(&game_dir).unwrap();
    std::fs::write(game_dir.join("game.yaml"), yaml).unwrap();
    let mut content = ContentFs::new();
    content.add_layer("test", dir.path(), 100);

    let mut runtime = ScriptRuntime::new(limits.script_instruction_budget).unwrap();
    let def = load_game(&content, &mut runtime, "test", &LoadOptions::default()).unwrap();
    let session = Session::new(
        content,
        runtime,
        def,
        None,
        limits,
        SessionConfig {
            seed,
            rollback: true,
            replay_log: None,
            game_args: Default::default(),
        },
    );
    (dir, session)
}

fn build_session(yaml: &str, seed: u64) -> (tempfile::TempDir, Session) {
    build_session_with(yaml, seed, EngineLimits::default())
}

fn spawn(session: &mut Session, type_name: &str, x: f32, y: f32, vx: f32, vy: f32) -> String {
    session
        .spawn(SpawnParams {
            type_name: type_name.to_string(),
            x,
            y,
            vx,
            vy,
            ..SpawnParams::default()
        })
        .unwrap()
}

fn prop_number(session: &mut Session, id: &str, key: &str) -> f64 {
    let entity = session
        .world
        .resource::<amsengine::resources::entityindex::EntityIndex>()
        .get(id)
        .unwrap();
    session
        .world
        .get::<Props>(entity)
        .and_then(|p| p.map.get(key).and_then(|v| v.as_number()))
        .unwrap_or(f64::NAN)
}

const BRICKFALL: &str = r#"
name: Brickfall
screen_width: 800
screen_height: 600
entity_types:
  brick:
    width: 50
    height: 20
    max_hits: 1
    tags: [brick]
    properties: {points: 1}
    interactions:
      - target: ball
        when: {distance: 0}
        because: enter
        action: take_damage
        modifier: {damage: 1}
  ball:
    width: 10
    height: 10
interaction_actions:
  take_damage:
    lua: |
      local hp = ams.get_health(entity_id) - modifier.damage
      ams.set_health(entity_id, hp)
      if hp <= 0 then
        ams.add_score(ams.get_prop(entity_id, "points"))
        ams.destroy(entity_id)
      end
win_condition:
  destroy_all: brick
"#;

#[test]
fn bricks_cleared_wins_with_score() {
    let (_dir, mut session) = build_session(BRICKFALL, 1);
    spawn(&mut session, "brick", 200.0, 100.0, 0.0, 0.0);
    spawn(&mut session, "brick", 200.0, 160.0, 0.0, 0.0);
    spawn(&mut session, "brick", 200.0, 220.0, 0.0, 0.0);
    spawn(&mut session, "ball", 200.0, 300.0, 0.0, -400.0);

    for _ in 0..60 {
        session.step(DT);
        if session.state() == PlayState::Won {
            break;
        }
    }
    assert_eq!(session.state(), PlayState::Won);
    assert_eq!(session.score(), 3);
    assert!(session.entities_of_type("brick").is_empty());
    assert_eq!(session.take_terminal_events(), vec![TerminalEvent::Won]);
}

const DUCKPOINT: &str = r#"
name: Duckpoint
screen_width: 800
screen_height: 600
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
"#;

#[test]
fn pointer_hit_destroys_exactly_one_duck() {
    let (_dir, mut session) = build_session(DUCKPOINT, 2);
    spawn(&mut session, "duck", 400.0, 300.0, 0.0, 0.0);
    spawn(&mut session, "duck", 100.0, 100.0, 0.0, 0.0);
    session.checkpoint();

    session.ingest(&[PlaneHitEvent::at(0.5, 0.5, 1.0)]);
    for _ in 0..70 {
        session.step(DT);
    }
    // The duck under the pointer died; the far one did not.
    let ducks = session.entities_of_type("duck");
    assert_eq!(ducks.len(), 1);
    assert_eq!(session.state(), PlayState::Playing);
}

const BALLPIT: &str = r#"
name: Ballpit
screen_width: 800
screen_height: 600
entity_types:
  ball:
    width: 10
    height: 10
lose_conditions:
  - entity_type: ball
    event: exited_screen
    edge: bottom
    action: lose_life
    then: {destroy: ball}
"#;

#[test]
fn ball_past_bottom_edge_costs_a_life() {
    let (_dir, mut session) = build_session(BALLPIT, 3);
    assert_eq!(session.lives(), 3);
    spawn(&mut session, "ball", 400.0, 590.0, 0.0, 400.0);

    for _ in 0..5 {
        session.step(DT);
    }
    assert_eq!(session.lives(), 2);
    assert!(session.entities_of_type("ball").is_empty());
    assert_eq!(session.state(), PlayState::Playing);
}

#[test]
fn losing_every_life_ends_the_game() {
    let (_dir, mut session) = build_session(BALLPIT, 3);
    for round in 0..3 {
        spawn(&mut session, "ball", 400.0, 590.0, 0.0, 400.0);
        for _ in 0..5 {
            session.step(DT);
        }
        assert_eq!(session.lives(), 2 - round);
    }
    assert_eq!(session.state(), PlayState::Lost);
    assert_eq!(session.take_terminal_events(), vec![TerminalEvent::Lost]);
}

const FUSE: &str = r#"
name: Fuse
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
    width: 10
    height: 10
    behaviors: [fuse]
lose_conditions:
  - entity_type: bomb
    event: destroyed
"#;

#[test]
fn scheduled_callback_destroys_on_time() {
    let (_dir, mut session) = build_session(FUSE, 4);
    spawn(&mut session, "bomb", 10.0, 10.0, 0.0, 0.0);

    // 19 frames of 0.1 s: t = 1.9, the fuse has not burned down.
    for _ in 0..19 {
        session.step(0.1);
    }
    assert_eq!(session.entities_of_type("bomb").len(), 1);
    // A few more frames pass t = 2 plus the one-frame commit latency.
    for _ in 0..3 {
        session.step(0.1);
    }
    assert!(session.entities_of_type("bomb").is_empty());
}

#[test]
fn dead_entities_cancel_their_callbacks_silently() {
    let (_dir, mut session) = build_session(FUSE, 4);
    let bomb = spawn(&mut session, "bomb", 10.0, 10.0, 0.0, 0.0);
    session.step(0.1);
    // Kill the bomb long before the fuse fires.
    session.world.resource_mut::<DestroyQueue>().push(bomb);
    for _ in 0..30 {
        session.step(0.1);
    }
    assert!(session.entities_of_type("bomb").is_empty());
}

#[test]
fn rollback_applies_late_input_at_event_time() {
    let (_dir, mut session) = build_session(DUCKPOINT, 5);
    // Duck flying right at 200 px/s. At t = 0.1 it straddles the
    // pointer position (400, 300); by t = 0.5 it has flown past.
    spawn(&mut session, "duck", 360.0, 275.0, 200.0, 0.0);
    session.checkpoint();

    for _ in 0..30 {
        session.step(DT);
    }
    assert_eq!(session.entities_of_type("duck").len(), 1);

    // The physical hit happened at t = 0.1 but arrives only now.
    session.ingest(&[PlaneHitEvent {
        latency_ms: 400.0,
        method: "laser".to_string(),
        ..PlaneHitEvent::at(0.5, 0.5, 0.1)
    }]);
    session.step(DT);

    // The outcome matches the state at the event timestamp, not the
    // state at arrival time.
    assert!(session.entities_of_type("duck").is_empty());
}

#[test]
fn identical_runs_produce_identical_snapshots() {
    fn run(seed: u64) -> Snapshot {
        let (_dir, mut session) = build_session(BRICKFALL, seed);
        spawn(&mut session, "brick", 200.0, 100.0, 0.0, 0.0);
        spawn(&mut session, "brick", 200.0, 220.0, 0.0, 0.0);
        spawn(&mut session, "ball", 200.0, 300.0, 0.0, -400.0);
        session.checkpoint();
        session.ingest(&[PlaneHitEvent::at(0.25, 0.25, 0.2)]);
        for _ in 0..40 {
            session.step(DT);
        }
        session.capture_snapshot()
    }
    let a = run(42);
    let b = run(42);

    assert_eq!(a.frame, b.frame);
    assert_eq!(a.time, b.time);
    assert_eq!(a.rng_seed, b.rng_seed);
    assert_eq!(a.score, b.score);
    assert_eq!(a.entities.len(), b.entities.len());
    for (ea, eb) in a.entities.iter().zip(&b.entities) {
        assert_eq!(ea.id, eb.id);
        assert_eq!(ea.serial, eb.serial);
        assert_eq!(ea.x, eb.x);
        assert_eq!(ea.y, eb.y);
        assert_eq!(ea.vx, eb.vx);
        assert_eq!(ea.vy, eb.vy);
        assert_eq!(ea.health, eb.health);
        assert_eq!(ea.props, eb.props);
    }
}

#[test]
fn snapshot_restore_roundtrips() {
    let (_dir, mut session) = build_session(BRICKFALL, 6);
    spawn(&mut session, "brick", 200.0, 100.0, 0.0, 0.0);
    spawn(&mut session, "ball", 200.0, 300.0, 0.0, -400.0);
    for _ in 0..10 {
        session.step(DT);
    }
    let first = session.capture_snapshot();
    session.restore_snapshot(&first);
    let second = session.capture_snapshot();

    assert_eq!(first.frame, second.frame);
    assert_eq!(first.time, second.time);
    assert_eq!(first.rng_seed, second.rng_seed);
    assert_eq!(first.score, second.score);
    assert_eq!(first.entities.len(), second.entities.len());
    for (ea, eb) in first.entities.iter().zip(&second.entities) {
        assert_eq!(ea.id, eb.id);
        assert_eq!((ea.x, ea.y, ea.vx, ea.vy), (eb.x, eb.y, eb.vx, eb.vy));
        assert_eq!(ea.props, eb.props);
        assert_eq!(ea.interaction_edges, eb.interaction_edges);
    }

    // The restored world keeps simulating normally.
    for _ in 0..5 {
        session.step(DT);
    }
}

#[test]
fn entity_cap_rejects_spawns_without_crashing() {
    let limits = EngineLimits {
        entity_cap: 3,
        ..EngineLimits::default()
    };
    let (_dir, mut session) = build_session_with(BRICKFALL, 7, limits);
    assert!(session
        .spawn(SpawnParams {
            type_name: "brick".into(),
            ..SpawnParams::default()
        })
        .is_some());
    assert!(session
        .spawn(SpawnParams {
            type_name: "brick".into(),
            ..SpawnParams::default()
        })
        .is_some());
    assert!(session
        .spawn(SpawnParams {
            type_name: "brick".into(),
            ..SpawnParams::default()
        })
        .is_some());
    // Cap reached: the spawn is dropped, nothing else is affected.
    assert!(session
        .spawn(SpawnParams {
            type_name: "brick".into(),
            ..SpawnParams::default()
        })
        .is_none());
    assert_eq!(session.entities_of_type("brick").len(), 3);
    session.step(DT);
}

const EDGEWATCH: &str = r#"
name: Edgewatch
screen_width: 800
screen_height: 600
entity_types:
  watcher:
    width: 10
    height: 10
    properties: {enters: 0, frames: 0, exits: 0}
    interactions:
      - target: rock
        when: {distance: 0}
        because: enter
        action: {lua: "ams.set_prop(entity_id, 'enters', ams.get_prop(entity_id, 'enters') + 1)"}
      - target: rock
        when: {distance: 0}
        because: continuous
        action: {lua: "ams.set_prop(entity_id, 'frames', ams.get_prop(entity_id, 'frames') + 1)"}
      - target: rock
        when: {distance: 0}
        because: exit
        action: {lua: "ams.set_prop(entity_id, 'exits', ams.get_prop(entity_id, 'exits') + 1)"}
  rock:
    width: 10
    height: 10
win_condition:
  reach_score: 1000
"#;

#[test]
fn trigger_modes_fire_per_their_contracts() {
    let (_dir, mut session) = build_session(EDGEWATCH, 8);
    let watcher = spawn(&mut session, "watcher", 0.0, 0.0, 0.0, 0.0);
    let rock = spawn(&mut session, "rock", 5.0, 0.0, 0.0, 0.0);

    for _ in 0..5 {
        session.step(DT);
    }
    assert_eq!(prop_number(&mut session, &watcher, "enters"), 1.0);
    assert_eq!(prop_number(&mut session, &watcher, "frames"), 5.0);
    assert_eq!(prop_number(&mut session, &watcher, "exits"), 0.0);

    // Move the rock away: the window closes, exit fires once.
    let rock_entity = session
        .world
        .resource::<amsengine::resources::entityindex::EntityIndex>()
        .get(&rock)
        .unwrap();
    session.world.get_mut::<Position>(rock_entity).unwrap().pos = glam::Vec2::new(500.0, 500.0);
    for _ in 0..3 {
        session.step(DT);
    }
    assert_eq!(prop_number(&mut session, &watcher, "enters"), 1.0);
    assert_eq!(prop_number(&mut session, &watcher, "frames"), 5.0);
    assert_eq!(prop_number(&mut session, &watcher, "exits"), 1.0);

    // And a second contiguous window fires enter again.
    session.world.get_mut::<Position>(rock_entity).unwrap().pos = glam::Vec2::new(5.0, 0.0);
    session.step(DT);
    assert_eq!(prop_number(&mut session, &watcher, "enters"), 2.0);
}

const SYMMETRIC: &str = r#"
name: Symmetric
screen_width: 100
screen_height: 100
entity_types:
  red:
    width: 10
    height: 10
    properties: {hits: 0}
    interactions:
      - target: blue
        when: {distance: 0}
        because: continuous
        action: bump
  blue:
    width: 10
    height: 10
    properties: {hits: 0}
    interactions:
      - target: red
        when: {distance: 0}
        because: continuous
        action: bump
interaction_actions:
  bump:
    lua: |
      ams.set_prop(entity_id, "hits", ams.get_prop(entity_id, "hits") + 1)
win_condition:
  reach_score: 1000
"#;

#[test]
fn symmetric_interactions_fire_in_the_same_frame() {
    let (_dir, mut session) = build_session(SYMMETRIC, 9);
    let red = spawn(&mut session, "red", 0.0, 0.0, 0.0, 0.0);
    let blue = spawn(&mut session, "blue", 5.0, 5.0, 0.0, 0.0);
    session.step(DT);
    assert_eq!(prop_number(&mut session, &red, "hits"), 1.0);
    assert_eq!(prop_number(&mut session, &blue, "hits"), 1.0);
}

const CASCADE: &str = r#"
name: Cascade
screen_width: 100
screen_height: 100
behaviors:
  vengeful:
    lua: |
      local M = {}
      function M.on_destroy(id)
        -- Destroying ourselves again must be a no-op; taking a
        -- sibling with us must be absorbed into the same sweep.
        ams.destroy(id)
        local others = ams.get_entities_of_type("mine")
        for i, other in ipairs(others) do
          ams.destroy(other)
        end
      end
      return M
entity_types:
  mine:
    width: 10
    height: 10
    behaviors: [vengeful]
lose_conditions:
  - entity_type: mine
    event: destroyed
"#;

#[test]
fn destroy_cascades_terminate() {
    let (_dir, mut session) = build_session(CASCADE, 10);
    let first = spawn(&mut session, "mine", 0.0, 0.0, 0.0, 0.0);
    spawn(&mut session, "mine", 20.0, 0.0, 0.0, 0.0);
    spawn(&mut session, "mine", 40.0, 0.0, 0.0, 0.0);
    session.step(DT);

    session.world.resource_mut::<DestroyQueue>().push(first);
    session.step(DT);
    assert!(session.entities_of_type("mine").is_empty());
}

const NURSERY: &str = r#"
name: Nursery
screen_width: 100
screen_height: 100
entity_types:
  carrier:
    width: 20
    height: 20
    on_destroy:
      children:
        - type: shard
          count: 3
          offset: [0, 0]
          inherit_velocity: 0.5
          lifetime: 0.5
  shard:
    width: 4
    height: 4
  pod:
    width: 6
    height: 6
    on_parent_destroy:
      destroy: true
lose_conditions:
  - entity_type: carrier
    event: destroyed
"#;

#[test]
fn on_destroy_spawns_children_and_orphans_cascade() {
    let (_dir, mut session) = build_session(NURSERY, 11);
    let carrier = spawn(&mut session, "carrier", 50.0, 50.0, 10.0, 0.0);
    let pod = session
        .spawn(SpawnParams {
            type_name: "pod".into(),
            x: 50.0,
            y: 50.0,
            parent: Some((carrier.clone(), 3.0, 4.0)),
            ..SpawnParams::default()
        })
        .unwrap();
    session.step(DT);

    // The pod follows its parent.
    let pod_entity = session
        .world
        .resource::<amsengine::resources::entityindex::EntityIndex>()
        .get(&pod)
        .unwrap();
    let pod_pos = session.world.get::<Position>(pod_entity).unwrap().pos;
    let carrier_entity = session
        .world
        .resource::<amsengine::resources::entityindex::EntityIndex>()
        .get(&carrier)
        .unwrap();
    let carrier_pos = session.world.get::<Position>(carrier_entity).unwrap().pos;
    assert!((pod_pos.x - (carrier_pos.x + 3.0)).abs() < 1e-4);
    assert!((pod_pos.y - (carrier_pos.y + 4.0)).abs() < 1e-4);

    session.world.resource_mut::<DestroyQueue>().push(carrier);
    session.step(DT);

    // Carrier and pod are gone; three shards flew out with half the
    // carrier's velocity.
    assert!(session.entities_of_type("carrier").is_empty());
    assert!(session.entities_of_type("pod").is_empty());
    let shards = session.entities_of_type("shard");
    assert_eq!(shards.len(), 3);

    // Shards expire through their lifetime.
    for _ in 0..40 {
        session.step(DT);
    }
    assert!(session.entities_of_type("shard").is_empty());
}

#[test]
fn shipped_breakout_sample_plays() {
    let mut content = ContentFs::new();
    content.add_layer(
        "engine",
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("content"),
        5,
    );
    let limits = EngineLimits::default();
    let mut runtime = ScriptRuntime::new(limits.script_instruction_budget).unwrap();
    let def = load_game(&content, &mut runtime, "breakout", &LoadOptions::default()).unwrap();
    let level = amsengine::definition::loader::load_level(
        &content,
        "breakout",
        "levels/one.yaml",
        &def,
    )
    .unwrap();
    let mut session = Session::new(
        content,
        runtime,
        def,
        Some(level),
        limits,
        SessionConfig {
            seed: 99,
            rollback: true,
            replay_log: None,
            game_args: Default::default(),
        },
    );

    // The wall is up: 30 bricks, a paddle, a ball.
    assert_eq!(session.entities_of_type("brick").len(), 30);
    assert_eq!(session.entities_of_type("paddle").len(), 1);
    assert_eq!(session.entities_of_type("ball").len(), 1);

    // Park the pointer mid-screen and let the ball fly for a while.
    session.ingest(&[PlaneHitEvent::at(0.5, 0.9, 0.01)]);
    for _ in 0..240 {
        session.step(DT);
    }

    // The ball broke at least one brick on the way up.
    assert!(session.score() > 0);
    assert!(session.entities_of_type("brick").len() < 30);
    // And the frame emits draw commands for the survivors.
    assert!(!session.draw_list().commands.is_empty());
}

const CHRYSALIS: &str = r#"
name: Chrysalis
screen_width: 100
screen_height: 100
entity_types:
  caterpillar:
    width: 8
    height: 8
    properties: {legs: 16}
    on_update:
      - age_min: 0.05
        transform:
          change_type: butterfly
  butterfly:
    width: 12
    height: 12
    properties: {wings: 2}
win_condition:
  reach_score: 1000
"#;

#[test]
fn morph_preserves_identity_and_merges_properties() {
    let (_dir, mut session) = build_session(CHRYSALIS, 12);
    let id = spawn(&mut session, "caterpillar", 30.0, 40.0, 5.0, 0.0);
    for _ in 0..6 {
        session.step(DT);
    }
    assert!(session.entities_of_type("caterpillar").is_empty());
    let butterflies = session.entities_of_type("butterfly");
    assert_eq!(butterflies, vec![id.clone()]);

    // Old custom properties survive the morph; new defaults appear.
    assert_eq!(prop_number(&mut session, &id, "legs"), 16.0);
    assert_eq!(prop_number(&mut session, &id, "wings"), 2.0);
}
