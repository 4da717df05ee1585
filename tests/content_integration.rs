//! Integration tests for the layered content filesystem and the game
//! registry.

use amsengine::content::registry::{GameKind, GameRegistry};
use amsengine::content::{ContentFs, FsError};
use std::fs;

/// Two-layer fixture: a "user" layer shadowing an "engine" layer.
fn two_layer_fs() -> (tempfile::TempDir, tempfile::TempDir, ContentFs) {
    let user = tempfile::tempdir().unwrap();
    let engine = tempfile::tempdir().unwrap();

    fs::create_dir_all(user.path().join("games/breakout")).unwrap();
    fs::write(
        user.path().join("games/breakout/game.yaml"),
        "name: Breakout (user)\nversion: '2.0'\n",
    )
    .unwrap();

    fs::create_dir_all(engine.path().join("games/breakout")).unwrap();
    fs::write(
        engine.path().join("games/breakout/game.yaml"),
        "name: Breakout (engine)\nversion: '1.0'\n",
    )
    .unwrap();
    fs::create_dir_all(engine.path().join("games/duckhunt")).unwrap();
    fs::write(
        engine.path().join("games/duckhunt/game.yaml"),
        "name: Duck Hunt\nauthor: core\n",
    )
    .unwrap();
    fs::create_dir_all(engine.path().join("lua/behaviors")).unwrap();
    fs::write(
        engine.path().join("lua/behaviors/gravity.lua"),
        "return {}",
    )
    .unwrap();

    let mut content = ContentFs::new();
    content.add_layer("user", user.path(), 100);
    content.add_layer("engine", engine.path(), 5);
    (user, engine, content)
}

#[test]
fn higher_priority_layer_shadows_lower() {
    let (_user, _engine, content) = two_layer_fs();
    let text = content.read_text("games/breakout/game.yaml").unwrap();
    assert!(text.contains("(user)"));
    assert_eq!(content.winning_layer("games/breakout/game.yaml"), Some("user"));
    // duckhunt only exists in the engine layer.
    assert_eq!(content.winning_layer("games/duckhunt/game.yaml"), Some("engine"));
}

#[test]
fn list_unions_layer_contents() {
    let (_user, _engine, content) = two_layer_fs();
    let names = content.list("games").unwrap();
    assert_eq!(names, vec!["breakout".to_string(), "duckhunt".to_string()]);
}

#[test]
fn escape_attempts_are_rejected_per_layer() {
    let (_user, _engine, content) = two_layer_fs();
    for bad in [
        "../outside",
        "games/../../etc/passwd",
        "/etc/passwd",
        "games\\breakout\\game.yaml",
        "games/./breakout",
    ] {
        assert!(
            matches!(content.read_bytes(bad), Err(FsError::IllegalPath { .. })),
            "expected IllegalPath for {bad:?}"
        );
        assert!(
            matches!(content.real_path(bad), Err(FsError::IllegalPath { .. })),
            "expected IllegalPath for {bad:?}"
        );
        assert!(!content.exists(bad));
    }
}

#[test]
fn missing_paths_report_not_found() {
    let (_user, _engine, content) = two_layer_fs();
    assert!(matches!(
        content.read_text("games/nothere/game.yaml"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn registry_discovers_yaml_games_with_metadata() {
    let (_user, _engine, content) = two_layer_fs();
    let mut registry = GameRegistry::new();
    registry.discover(&content);

    assert_eq!(registry.len(), 2);
    let breakout = registry.get("breakout").unwrap();
    assert_eq!(breakout.kind, GameKind::Yaml);
    // The user layer's metadata wins.
    assert_eq!(breakout.meta.name, "Breakout (user)");
    assert_eq!(breakout.meta.version, "2.0");
    let duckhunt = registry.get("duckhunt").unwrap();
    assert_eq!(duckhunt.meta.author, "core");
}

#[test]
fn registry_skips_reserved_and_hidden_directories() {
    let (user, _engine, content) = two_layer_fs();
    for dir in ["base", "common", "_wip", ".hidden", "empty"] {
        fs::create_dir_all(user.path().join("games").join(dir)).unwrap();
        fs::write(
            user.path().join("games").join(dir).join("game.yaml"),
            "name: hidden\n",
        )
        .unwrap();
    }
    // "empty" has a game.yaml so it is discovered; the others are not.
    let mut registry = GameRegistry::new();
    registry.discover(&content);
    assert!(registry.get("base").is_none());
    assert!(registry.get("common").is_none());
    assert!(registry.get("_wip").is_none());
    assert!(registry.get(".hidden").is_none());
    assert!(registry.get("empty").is_some());
}

#[test]
fn native_marker_in_content_layer_is_ignored() {
    let (user, _engine, content) = two_layer_fs();
    fs::create_dir_all(user.path().join("games/hack")).unwrap();
    fs::write(user.path().join("games/hack/native.yaml"), "entry: evil\n").unwrap();

    let mut registry = GameRegistry::new();
    registry.discover(&content);
    // No game.yaml, native marker ignored: not registered at all.
    assert!(registry.get("hack").is_none());
}

#[test]
fn native_registration_wins_over_discovered_yaml() {
    let (_user, _engine, content) = two_layer_fs();
    let mut registry = GameRegistry::new();
    registry.register_native("breakout", Default::default());
    registry.discover(&content);
    assert_eq!(registry.get("breakout").unwrap().kind, GameKind::Native);
}
