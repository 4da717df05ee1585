//! Game registry: discovery and trust-asymmetric loading.
//!
//! YAML-only games (`games/<slug>/game.yaml`) are discovered from every
//! content layer; their logic lives entirely in sandboxed scripts, so any
//! layer may supply them. Native-code games are arbitrary host code and
//! are therefore only accepted from the compiled-in core table; a
//! `native` marker found in a user or overlay layer is ignored with a
//! warning.

use crate::content::ContentFs;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Directory names skipped during discovery.
const SKIPPED_DIRS: [&str; 2] = ["base", "common"];

/// Marker file that would declare a native-code game inside a layer.
const NATIVE_MARKER: &str = "native.yaml";

/// How a discovered game is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    /// Declarative game: `game.yaml` plus scripts, fully sandbox-bound.
    Yaml,
    /// Compiled-in game registered by host code at startup.
    Native,
}

/// One flag a game declares for the launcher to merge into its config map.
#[derive(Debug, Clone, Deserialize)]
pub struct GameArgSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// Metadata extracted from a game's declaration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    /// Game-specific CLI flags (spec'd by the game, merged by the launcher).
    #[serde(default)]
    pub args: Vec<GameArgSpec>,
}

/// A discovered, instantiable game.
#[derive(Debug, Clone)]
pub struct GameEntry {
    pub slug: String,
    pub kind: GameKind,
    pub meta: GameMeta,
    /// Which layer served `game.yaml` (YAML games only).
    pub layer: Option<String>,
}

/// Registry of available games, cached by slug.
#[derive(Debug, Default)]
pub struct GameRegistry {
    entries: FxHashMap<String, GameEntry>,
    /// Stable listing order: natives first (registration order), then
    /// discovered YAML games alphabetically.
    order: Vec<String>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled-in native game. Only callable from host code,
    /// which is exactly the trust boundary: native code never arrives
    /// through a content layer.
    pub fn register_native(&mut self, slug: impl Into<String>, meta: GameMeta) {
        let slug = slug.into();
        if self.entries.contains_key(&slug) {
            warn!("native game '{slug}' registered twice; keeping first registration");
            return;
        }
        self.order.push(slug.clone());
        self.entries.insert(
            slug.clone(),
            GameEntry {
                slug,
                kind: GameKind::Native,
                meta,
                layer: None,
            },
        );
    }

    /// Scan all layers under `games/` and cache discovered YAML games.
    ///
    /// Directories named `base` or `common`, or starting with `_` or `.`,
    /// are skipped, as is anything without a `game.yaml`. A YAML game never
    /// shadows an already-registered native slug.
    pub fn discover(&mut self, fs: &ContentFs) {
        let names = match fs.list("games") {
            Ok(names) => names,
            Err(e) => {
                warn!("game discovery failed: {e}");
                return;
            }
        };

        let mut discovered: Vec<String> = Vec::new();
        for slug in names {
            if SKIPPED_DIRS.contains(&slug.as_str())
                || slug.starts_with('_')
                || slug.starts_with('.')
            {
                continue;
            }
            let marker_path = format!("games/{slug}/{NATIVE_MARKER}");
            let yaml_path = format!("games/{slug}/game.yaml");

            if fs.exists(&marker_path) {
                // Native code cannot cross the sandbox; only the compiled-in
                // table may provide it.
                warn!(
                    "ignoring native game marker for '{slug}' found in layer {:?}",
                    fs.winning_layer(&marker_path)
                );
            }
            if !fs.exists(&yaml_path) {
                continue;
            }
            if let Some(existing) = self.entries.get(&slug) {
                if existing.kind == GameKind::Native {
                    warn!("YAML game '{slug}' shadowed by native registration; skipping");
                    continue;
                }
            }

            let meta = read_meta(fs, &yaml_path).unwrap_or_else(|e| {
                warn!("could not read metadata for '{slug}': {e}");
                GameMeta::default()
            });
            let layer = fs.winning_layer(&yaml_path).map(str::to_string);
            debug!("discovered game '{slug}' from layer {layer:?}");
            self.entries.insert(
                slug.clone(),
                GameEntry {
                    slug: slug.clone(),
                    kind: GameKind::Yaml,
                    meta,
                    layer,
                },
            );
            discovered.push(slug);
        }

        discovered.sort();
        for slug in discovered {
            if !self.order.contains(&slug) {
                self.order.push(slug);
            }
        }
    }

    pub fn get(&self, slug: &str) -> Option<&GameEntry> {
        self.entries.get(slug)
    }

    /// All games in stable listing order.
    pub fn iter(&self) -> impl Iterator<Item = &GameEntry> {
        self.order.iter().filter_map(|slug| self.entries.get(slug))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pull the metadata fields out of a game.yaml without fully loading it.
fn read_meta(fs: &ContentFs, yaml_path: &str) -> anyhow::Result<GameMeta> {
    let text = fs.read_text(yaml_path)?;
    let meta: GameMeta = serde_yaml::from_str(&text)?;
    Ok(meta)
}
