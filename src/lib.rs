//! AMS Engine library.
//!
//! A declarative 2D arcade game engine: games are YAML definitions plus
//! sandboxed Lua scripts, and the engine turns them into a running,
//! deterministic, rollback-capable simulation. This crate exposes the
//! content filesystem, definition loader, ECS components/resources/
//! systems, the scripting layer, and the session for use by front-ends
//! and integration tests.

pub mod components;
pub mod content;
pub mod definition;
pub mod events;
pub mod resources;
pub mod script;
pub mod session;
pub mod systems;
