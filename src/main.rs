//! AMS Engine launcher.
//!
//! A declarative 2D arcade game engine:
//! - **YAML** game definitions with embedded or file-backed Lua scripts
//! - **bevy_ecs** for the entity store and engine state
//! - **mlua + LuaJIT** for the sandboxed scripting layer
//!
//! The binary discovers games through the layered content filesystem,
//! loads one, and runs the simulation. Rendering, windowing, and audio
//! playback are external: the engine emits a draw list and an audio
//! queue per frame, which shells consume. Run without a shell, the
//! launcher drives the simulation headless, which is also how the
//! end-to-end tests exercise it.
//!
//! # Running
//!
//! ```sh
//! amsengine --list-games
//! amsengine --game breakout
//! amsengine --game duckhunt --level levels/two.yaml --backend laser
//! ```

mod components;
mod content;
mod definition;
mod events;
mod resources;
mod script;
mod session;
mod systems;

use crate::components::props::{PropMap, PropValue};
use crate::content::registry::GameRegistry;
use crate::content::ContentFs;
use crate::definition::loader::{load_game, load_level, LoadOptions};
use crate::resources::limits::EngineLimits;
use crate::script::runtime::ScriptRuntime;
use crate::session::{Session, SessionConfig};
use clap::Parser;
use log::{error, info};

/// AMS Engine 2D
#[derive(Parser)]
#[command(version, about = "Declarative 2D arcade game engine")]
struct Cli {
    /// Print discovered games (slug, name, version, author) and exit.
    #[arg(long)]
    list_games: bool,

    /// Launch the game by slug.
    #[arg(long, value_name = "SLUG")]
    game: Option<String>,

    /// Load a specific level file, relative to the game directory.
    #[arg(long, value_name = "PATH")]
    level: Option<String>,

    /// Input adapter hint (mouse|laser|object). Adapters are external;
    /// the value is forwarded to the shell.
    #[arg(long, default_value = "mouse")]
    backend: String,

    /// Windowing-shell hint.
    #[arg(long)]
    fullscreen: bool,

    /// Windowing-shell hint: display index.
    #[arg(long, value_name = "N")]
    display: Option<u32>,

    /// Windowing-shell hint: WxH.
    #[arg(long, value_name = "WxH")]
    resolution: Option<String>,

    /// Deterministic RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Disable snapshot capture and late-input rollback.
    #[arg(long)]
    no_rollback: bool,

    /// Stop after this many frames (0 = run until win/lose).
    #[arg(long, default_value_t = 0)]
    max_frames: u64,

    /// Game-specific flags (`key=value`), merged into the game's config
    /// map as declared by its definition.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    game_args: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or("LOG_LEVEL", "info")
            .write_style("LOG_STYLE"),
    )
    .init();

    let cli = Cli::parse();
    let fs = ContentFs::from_env();

    let mut registry = GameRegistry::new();
    registry.discover(&fs);

    if cli.list_games {
        for entry in registry.iter() {
            println!(
                "{:<20} {:<30} {:<10} {}",
                entry.slug, entry.meta.name, entry.meta.version, entry.meta.author
            );
        }
        return;
    }

    let Some(slug) = cli.game.as_deref() else {
        eprintln!("no game selected; use --game <slug> or --list-games");
        std::process::exit(1);
    };
    if registry.get(slug).is_none() {
        eprintln!("unknown game '{slug}'; use --list-games to see what is available");
        std::process::exit(1);
    }

    let limits = EngineLimits::load_from_file("./config.ini");
    let mut runtime = match ScriptRuntime::new(limits.script_instruction_budget) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("scripting layer refused to initialize: {e}");
            std::process::exit(2);
        }
    };

    let opts = LoadOptions::from_env();
    let def = match load_game(&fs, &mut runtime, slug, &opts) {
        Ok(def) => def,
        Err(e) => {
            error!("failed to load '{slug}': {e}");
            std::process::exit(1);
        }
    };

    let level_path = cli.level.clone().or_else(|| def.levels.first().cloned());
    let level = match level_path {
        None => None,
        Some(path) => match load_level(&fs, slug, &path, &def) {
            Ok(level) => Some(level),
            Err(e) => {
                error!("failed to load level '{path}': {e}");
                std::process::exit(1);
            }
        },
    };

    let replay_log = std::env::var_os("LOG_DIR").map(|dir| {
        std::path::PathBuf::from(dir).join(format!("{slug}-replay.jsonl"))
    });
    let config = SessionConfig {
        seed: cli.seed.unwrap_or(0x5eed),
        rollback: !cli.no_rollback,
        replay_log,
        game_args: parse_game_args(&cli.game_args),
    };

    info!(
        "launching '{}' ({}x{}, backend hint: {})",
        def.name, def.screen_width, def.screen_height, cli.backend
    );
    if cli.fullscreen || cli.display.is_some() || cli.resolution.is_some() {
        info!("window hints are forwarded to the shell; headless run ignores them");
    }

    let mut session = Session::new(fs, runtime, def, level, limits, config);

    // Headless drive at a fixed 60 Hz. A shell embedding the engine runs
    // the same loop with its own clock and input adapter.
    let dt = 1.0 / 60.0;
    let mut frames = 0u64;
    loop {
        session.step(dt);
        session.drain_audio();
        frames += 1;

        let terminal = session.take_terminal_events();
        if let Some(event) = terminal.first() {
            info!(
                "game over after {frames} frames: {event:?} (score {})",
                session.score()
            );
            break;
        }
        if cli.max_frames > 0 && frames >= cli.max_frames {
            info!("frame limit reached (score {})", session.score());
            break;
        }
    }
}

/// Parse trailing `key=value` flags into the game's config map.
fn parse_game_args(args: &[String]) -> PropMap {
    let mut map = PropMap::default();
    for arg in args {
        let arg = arg.trim_start_matches("--");
        match arg.split_once('=') {
            Some((key, value)) => {
                let prop = value
                    .parse::<f64>()
                    .map(PropValue::Number)
                    .unwrap_or_else(|_| match value {
                        "true" => PropValue::Bool(true),
                        "false" => PropValue::Bool(false),
                        other => PropValue::Str(other.to_string()),
                    });
                map.insert(key.to_string(), prop);
            }
            None => {
                map.insert(arg.to_string(), PropValue::Bool(true));
            }
        }
    }
    map
}
