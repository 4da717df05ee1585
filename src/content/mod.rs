//! Layered, sandbox-enforced content filesystem.
//!
//! All non-binary game content (game definitions, level files, Lua
//! behaviors, sprite sheets) is resolved through a virtual path like
//! `games/<slug>/game.yaml` or `lua/behavior/gravity.lua`. Lookup walks a
//! fixed stack of layers from highest to lowest priority; the first layer
//! containing the path wins, so user content shadows overlay content which
//! shadows the engine's built-ins.
//!
//! # Layers
//!
//! 1. **User layer** – platform user-data directory, override with `DATA_DIR`
//! 2. **Overlay layers** – roots from `OVERLAY_DIRS`, priority ≥ 10
//! 3. **Engine layer** – `content/` next to the executable, priority 5
//!
//! Every lookup is sanitized *per layer*: `..` components, absolute
//! prefixes, and backslashes are rejected with [`FsError::IllegalPath`]
//! before any OS path is formed. The repository root is never a layer.

pub mod registry;

use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Priority of the engine (built-in) layer.
pub const ENGINE_LAYER_PRIORITY: i32 = 5;
/// Lowest priority an overlay layer may carry.
pub const OVERLAY_LAYER_PRIORITY: i32 = 10;
/// Priority of the user layer; always wins.
pub const USER_LAYER_PRIORITY: i32 = 100;

/// Errors raised by content filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The virtual path tried to escape a layer root.
    #[error("illegal content path '{path}': {reason}")]
    IllegalPath { path: String, reason: &'static str },
    /// The path is legal but no layer contains it.
    #[error("content path '{path}' not found in any layer")]
    NotFound { path: String },
    /// Underlying OS error while reading an existing file.
    #[error("i/o error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single content root with a priority.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Human-readable name used in logs ("user", "overlay:teamdir", "engine").
    pub name: String,
    /// Absolute root directory. Lookups never leave it.
    pub root: PathBuf,
    /// Higher priority shadows lower.
    pub priority: i32,
}

/// Layered virtual filesystem over a fixed set of root directories.
///
/// The layer set is finalized at session start; the filesystem is
/// read-only during simulation.
#[derive(Debug, Default)]
pub struct ContentFs {
    /// Sorted high priority first.
    layers: Vec<Layer>,
}

impl ContentFs {
    /// Create an empty filesystem with no layers.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Build the standard layer stack from the environment:
    /// user layer (`DATA_DIR` override), overlays (`OVERLAY_DIRS`),
    /// engine layer (`ENGINE_CONTENT_DIR` override, else `content/` next
    /// to the executable).
    pub fn from_env() -> Self {
        let mut fs = Self::new();

        if let Some(user_root) = user_data_dir() {
            fs.add_layer("user", user_root, USER_LAYER_PRIORITY);
        }

        if let Ok(overlays) = std::env::var("OVERLAY_DIRS") {
            for (i, dir) in std::env::split_paths(&overlays).enumerate() {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                fs.add_layer(
                    format!("overlay:{}", dir.display()),
                    dir,
                    OVERLAY_LAYER_PRIORITY + i as i32,
                );
            }
        }

        if let Some(engine_root) = engine_content_dir() {
            fs.add_layer("engine", engine_root, ENGINE_LAYER_PRIORITY);
        }

        fs
    }

    /// Add a layer. Keeps the stack sorted high priority first.
    pub fn add_layer(&mut self, name: impl Into<String>, root: impl Into<PathBuf>, priority: i32) {
        let layer = Layer {
            name: name.into(),
            root: root.into(),
            priority,
        };
        debug!(
            "content layer '{}' at {} (priority {})",
            layer.name,
            layer.root.display(),
            layer.priority
        );
        self.layers.push(layer);
        self.layers.sort_by_key(|l| std::cmp::Reverse(l.priority));
    }

    /// All layers, highest priority first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The layer holding the engine's built-in content, if configured.
    pub fn engine_layer(&self) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.priority == ENGINE_LAYER_PRIORITY)
    }

    /// True if any layer contains `vpath`. Illegal paths are reported as
    /// absent (and logged), matching the read operations' refusal.
    pub fn exists(&self, vpath: &str) -> bool {
        match sanitize(vpath) {
            Ok(rel) => self.find(&rel).is_some(),
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    /// Union of directory entry names across all layers holding `vpath`.
    pub fn list(&self, vpath: &str) -> Result<Vec<String>, FsError> {
        let rel = sanitize(vpath)?;
        let mut names: Vec<String> = Vec::new();
        for layer in &self.layers {
            let dir = layer.root.join(&rel);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a file as raw bytes from the highest-priority layer holding it.
    pub fn read_bytes(&self, vpath: &str) -> Result<Vec<u8>, FsError> {
        let rel = sanitize(vpath)?;
        let path = self.find(&rel).ok_or_else(|| FsError::NotFound {
            path: vpath.to_string(),
        })?;
        std::fs::read(&path).map_err(|source| FsError::Io {
            path: vpath.to_string(),
            source,
        })
    }

    /// Read a file as UTF-8 text from the highest-priority layer holding it.
    pub fn read_text(&self, vpath: &str) -> Result<String, FsError> {
        let rel = sanitize(vpath)?;
        let path = self.find(&rel).ok_or_else(|| FsError::NotFound {
            path: vpath.to_string(),
        })?;
        std::fs::read_to_string(&path).map_err(|source| FsError::Io {
            path: vpath.to_string(),
            source,
        })
    }

    /// Resolve a virtual path to the OS path of the winning layer.
    /// Only trusted host code may use the result; scripts never see it.
    pub fn real_path(&self, vpath: &str) -> Result<PathBuf, FsError> {
        let rel = sanitize(vpath)?;
        self.find(&rel).ok_or_else(|| FsError::NotFound {
            path: vpath.to_string(),
        })
    }

    /// Which layer (by name) would serve `vpath`, if any.
    pub fn winning_layer(&self, vpath: &str) -> Option<&str> {
        let rel = sanitize(vpath).ok()?;
        for layer in &self.layers {
            if layer.root.join(&rel).exists() {
                return Some(&layer.name);
            }
        }
        None
    }

    /// First existing OS path for an already-sanitized relative path.
    fn find(&self, rel: &Path) -> Option<PathBuf> {
        for layer in &self.layers {
            let candidate = layer.root.join(rel);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Validate a virtual path and convert it to a relative OS path.
///
/// Rejects absolute prefixes, drive letters, backslashes, `.` and `..`
/// components, and empty paths. Enforced before any layer root is joined,
/// so no composed path can escape its root.
fn sanitize(vpath: &str) -> Result<PathBuf, FsError> {
    let illegal = |reason| FsError::IllegalPath {
        path: vpath.to_string(),
        reason,
    };

    if vpath.is_empty() {
        return Err(illegal("empty path"));
    }
    if vpath.contains('\\') {
        return Err(illegal("backslash separators are not allowed"));
    }
    if vpath.starts_with('/') {
        return Err(illegal("absolute paths are not allowed"));
    }
    if vpath.contains(':') {
        return Err(illegal("drive or scheme prefixes are not allowed"));
    }

    let mut rel = PathBuf::new();
    for component in vpath.split('/') {
        match component {
            "" => return Err(illegal("empty path component")),
            "." | ".." => return Err(illegal("relative path components are not allowed")),
            c => rel.push(c),
        }
    }
    Ok(rel)
}

/// Platform user-data directory for the engine, honoring `DATA_DIR`.
fn user_data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DATA_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|base| PathBuf::from(base).join("amsengine"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join("Library/Application Support/amsengine"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return Some(PathBuf::from(xdg).join("amsengine"));
            }
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share/amsengine"))
    }
}

/// Engine built-in content root: `ENGINE_CONTENT_DIR` override, else the
/// `content/` directory next to the executable. The repository root is
/// deliberately never exposed.
fn engine_content_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("ENGINE_CONTENT_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("content")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_escapes() {
        for bad in [
            "../secret",
            "games/../../etc/passwd",
            "/etc/passwd",
            "games\\thing",
            "c:/windows",
            "games//double",
            "games/./here",
            "",
        ] {
            assert!(
                matches!(sanitize(bad), Err(FsError::IllegalPath { .. })),
                "expected IllegalPath for {bad:?}"
            );
        }
    }

    #[test]
    fn sanitize_accepts_plain_paths() {
        assert!(sanitize("games/breakout/game.yaml").is_ok());
        assert!(sanitize("lua/behavior/gravity.lua").is_ok());
    }
}
