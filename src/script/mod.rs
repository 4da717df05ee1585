//! Sandboxed Lua scripting layer.
//!
//! The only channel through which game scripts affect the simulation.
//! Built on mlua like the rest of the engine's scripting stack:
//!
//! - [`runtime`] – interpreter ownership, script compilation, dispatch,
//!   per-invocation execution budget
//! - [`sandbox`] – nuclear global clear + forbidden-name validation
//! - [`api`] – the `ams.*` host API table
//! - [`shadow`] – per-frame mutable shadow of the simulation plus the
//!   effect queues scripts write into
//! - [`convert`] – whitelist coercion between [`PropValue`] and Lua values
//!
//! Scripts address entities exclusively by opaque string IDs; no host
//! reference ever crosses the boundary.
//!
//! [`PropValue`]: crate::components::props::PropValue

pub mod api;
pub mod convert;
pub mod runtime;
pub mod sandbox;
pub mod shadow;

/// Error raised while compiling or running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script '{name}' failed to compile: {message}")]
    Compile { name: String, message: String },
    #[error("script '{script}' has no entry point '{entry}'")]
    MissingEntry { script: String, entry: String },
    #[error("script '{script}' entry '{entry}' (entity {entity}): {message}")]
    Runtime {
        script: String,
        entry: String,
        entity: String,
        message: String,
    },
}

/// Startup check of the forbidden-name list failed; the scripting layer
/// refuses to initialize.
#[derive(Debug, thiserror::Error)]
#[error("sandbox validation failed: '{name}' is reachable from scripts")]
pub struct SandboxValidationError {
    pub name: String,
}

/// A host-API call produced or received a value outside the primitive
/// whitelist.
#[derive(Debug, thiserror::Error)]
#[error("cannot convert {what} across the script boundary")]
pub struct TypeConversionError {
    pub what: String,
}
