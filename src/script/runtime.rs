//! Script runtime: interpreter ownership, compilation, dispatch.
//!
//! Owns the single Lua state for a session. Scripts are compiled once at
//! load into module tables held in the Lua registry; dispatch looks up
//! the entry point and calls it under a per-invocation execution budget.
//! Script exceptions are caught here, logged with path-qualified context,
//! and never escape into the frame.

use crate::definition::{ScriptDef, ScriptNamespace};
use crate::script::api::register_ams;
use crate::script::sandbox::{apply_sandbox, validate_sandbox};
use crate::script::shadow::ShadowWorld;
use crate::script::{SandboxValidationError, ScriptError};
use log::debug;
use mlua::prelude::*;
use mlua::{HookTriggers, VmState};
use rustc_hash::{FxHashMap, FxHashSet};

/// Instructions between budget checks.
const BUDGET_CHECK_INTERVAL: u32 = 1024;

/// The scripting layer failed to initialize.
#[derive(Debug, thiserror::Error)]
pub enum SandboxInitError {
    #[error("lua initialization failed: {0}")]
    Lua(#[from] mlua::Error),
    #[error(transparent)]
    Validation(#[from] SandboxValidationError),
}

/// One compiled script: its module table plus the entry points it exports.
struct CompiledScript {
    key: LuaRegistryKey,
    namespace: ScriptNamespace,
    exports: FxHashSet<String>,
}

/// Owns the sandboxed interpreter and every compiled script.
///
/// Not `Send`: lives on the simulation thread, the sole mutator of game
/// state.
pub struct ScriptRuntime {
    lua: Lua,
    scripts: FxHashMap<String, CompiledScript>,
    /// VM instructions allowed per invocation.
    instruction_budget: u64,
}

impl ScriptRuntime {
    /// Create the interpreter, register `ams.*`, harden, and validate.
    /// Validation failure is fatal: the engine must not run user scripts.
    pub fn new(instruction_budget: u64) -> Result<Self, SandboxInitError> {
        let lua = Lua::new();
        // Trace compilation would skip instruction hooks, so the budget
        // (and replay determinism) require the interpreter.
        lua.load("if jit then jit.off() end").exec()?;
        register_ams(&lua)?;
        apply_sandbox(&lua)?;
        validate_sandbox(&lua)?;
        lua.set_app_data(ShadowWorld::default());
        Ok(Self {
            lua,
            scripts: FxHashMap::default(),
            instruction_budget,
        })
    }

    /// Compile a script into its module table. Inline sources are wrapped
    /// into the single entry point their namespace requires; file-backed
    /// sources are module chunks returning a table of functions.
    pub fn compile(&mut self, def: &ScriptDef) -> Result<(), ScriptError> {
        let inline = !def.origin.ends_with(".lua");
        let chunk = wrap_source(def, inline);
        let table: LuaTable = self
            .lua
            .load(&chunk)
            .set_name(def.name.as_str())
            .eval()
            .map_err(|e| ScriptError::Compile {
                name: def.name.clone(),
                message: e.to_string(),
            })?;

        let mut exports = FxHashSet::default();
        for pair in table.clone().pairs::<LuaValue, LuaValue>() {
            let (k, v) = pair.map_err(|e| ScriptError::Compile {
                name: def.name.clone(),
                message: e.to_string(),
            })?;
            if let (LuaValue::String(name), LuaValue::Function(_)) = (&k, &v) {
                exports.insert(name.to_string_lossy().to_string());
            }
        }

        let key = self
            .lua
            .create_registry_value(table)
            .map_err(|e| ScriptError::Compile {
                name: def.name.clone(),
                message: e.to_string(),
            })?;
        debug!(
            "compiled {} '{}' (exports: {:?})",
            def.namespace.as_str(),
            def.name,
            exports
        );
        self.scripts.insert(
            def.name.clone(),
            CompiledScript {
                key,
                namespace: def.namespace,
                exports,
            },
        );
        Ok(())
    }

    /// True if `script` exists and exports `entry`.
    pub fn exports(&self, script: &str, entry: &str) -> bool {
        self.scripts
            .get(script)
            .map(|c| c.exports.contains(entry))
            .unwrap_or(false)
    }

    pub fn namespace(&self, script: &str) -> Option<ScriptNamespace> {
        self.scripts.get(script).map(|c| c.namespace)
    }

    /// Call an entry point under the execution budget. `entity` is only
    /// for error context. Errors are returned, not panicked; the caller
    /// logs and the frame continues.
    pub fn call<A: IntoLuaMulti>(
        &self,
        script: &str,
        entry: &str,
        entity: &str,
        args: A,
    ) -> Result<LuaValue, ScriptError> {
        let compiled = self.scripts.get(script).ok_or_else(|| ScriptError::MissingEntry {
            script: script.to_string(),
            entry: entry.to_string(),
        })?;
        if !compiled.exports.contains(entry) {
            return Err(ScriptError::MissingEntry {
                script: script.to_string(),
                entry: entry.to_string(),
            });
        }
        let func: LuaFunction = self
            .lua
            .registry_value::<LuaTable>(&compiled.key)
            .and_then(|t| t.get(entry))
            .map_err(|e| ScriptError::Runtime {
                script: script.to_string(),
                entry: entry.to_string(),
                entity: entity.to_string(),
                message: e.to_string(),
            })?;

        self.with_shadow(|s| s.current_script = Some(script.to_string()));
        self.arm_budget();
        let result = func.call::<LuaValue>(args);
        self.lua.remove_hook();
        self.with_shadow(|s| s.current_script = None);

        result.map_err(|e| ScriptError::Runtime {
            script: script.to_string(),
            entry: entry.to_string(),
            entity: entity.to_string(),
            message: e.to_string(),
        })
    }

    /// Borrow the shadow world. Must not be held across a script call;
    /// API closures take their own borrow.
    pub fn with_shadow<R>(&self, f: impl FnOnce(&mut ShadowWorld) -> R) -> R {
        let mut shadow = self
            .lua
            .app_data_mut::<ShadowWorld>()
            .expect("shadow world is installed at runtime creation");
        f(&mut shadow)
    }

    /// Evaluate an expression inside the sandbox. Test and diagnostic
    /// entry point; game code goes through compiled scripts.
    pub fn eval(&self, code: &str) -> LuaResult<LuaValue> {
        self.lua.load(code).set_name("eval").eval()
    }

    /// Lua handle for conversions done by engine systems (building
    /// context tables, converting returns).
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn arm_budget(&self) {
        let budget = self.instruction_budget;
        let used = std::cell::Cell::new(0u64);
        let _ = self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(BUDGET_CHECK_INTERVAL),
            move |_lua, _debug| {
                used.set(used.get() + BUDGET_CHECK_INTERVAL as u64);
                if used.get() > budget {
                    Err(mlua::Error::RuntimeError(
                        "script execution budget exceeded".to_string(),
                    ))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );
    }
}

/// Produce the chunk to compile for a script definition.
fn wrap_source(def: &ScriptDef, inline: bool) -> String {
    if !inline || def.namespace == ScriptNamespace::Behavior {
        return def.source.clone();
    }
    match def.namespace {
        ScriptNamespace::InteractionAction => format!(
            "return {{ execute = function(entity_id, other_id, modifier, context)\n{}\nend }}",
            def.source
        ),
        ScriptNamespace::CollisionAction => format!(
            "return {{ execute = function(entity_id, other_id, modifier)\n{}\nend }}",
            def.source
        ),
        ScriptNamespace::InputAction => format!(
            "return {{ execute = function(x, y, args)\n{}\nend }}",
            def.source
        ),
        ScriptNamespace::Generator => format!(
            "return {{ generate = function(entity_id, i)\n{}\nend }}",
            def.source
        ),
        ScriptNamespace::Expression => {
            let body = def.source.trim();
            if body.starts_with("return") || body.contains('\n') {
                format!("return {{ evaluate = function(entity_id)\n{body}\nend }}")
            } else {
                format!("return {{ evaluate = function(entity_id) return ({body}) end }}")
            }
        }
        ScriptNamespace::Behavior => def.source.clone(),
    }
}
