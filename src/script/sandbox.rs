//! Sandbox hardening: the nuclear global clear and its validation.
//!
//! Defense in depth; the layers here assume any one of the others may
//! fail. After [`apply_sandbox`] the global namespace retains only the
//! whitelist (iteration, type query, stringification, numeric parsing,
//! protected call, error raise, vararg selection, pure math, and `ams`).
//! [`validate_sandbox`] then asserts every forbidden name evaluates to
//! nil; any failure aborts engine start before user code runs.

use crate::script::SandboxValidationError;
use mlua::prelude::*;

/// Globals that survive the clear.
pub const WHITELIST: [&str; 11] = [
    "pairs", "ipairs", "next", "type", "tostring", "tonumber", "pcall", "error", "select", "math",
    "ams",
];

/// Names that must be nil after setup. Checked one by one at every
/// sandbox initialization.
pub const FORBIDDEN_NAMES: [&str; 40] = [
    "io",
    "os",
    "require",
    "debug",
    "loadstring",
    "load",
    "dofile",
    "loadfile",
    "getfenv",
    "setfenv",
    "getmetatable",
    "setmetatable",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "coroutine",
    "package",
    "module",
    "collectgarbage",
    "newproxy",
    "jit",
    "ffi",
    "_G",
    "_VERSION",
    "gcinfo",
    "print",
    "arg",
    "assert",
    "unpack",
    "xpcall",
    "string",
    "table",
    "bit",
    "bit32",
    "utf8",
    "python",
    "_python",
    "string.dump",
    "string.rep",
];

/// Members of `math` stripped because they reach entropy or the OS
/// clock. Scripts use the seeded `ams.random*` instead.
const MATH_DENYLIST: [&str; 3] = ["random", "randomseed", "seedall"];

/// Remove everything outside the whitelist from the global namespace,
/// then scrub the survivors.
pub fn apply_sandbox(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    let mut doomed: Vec<String> = Vec::new();
    for pair in globals.clone().pairs::<LuaValue, LuaValue>() {
        let (key, _) = pair?;
        if let LuaValue::String(name) = key {
            let name = name.to_string_lossy().to_string();
            if !WHITELIST.contains(&name.as_str()) {
                doomed.push(name);
            }
        }
    }
    for name in doomed {
        globals.set(name.as_str(), LuaValue::Nil)?;
    }

    if let Ok(math) = globals.get::<LuaTable>("math") {
        for name in MATH_DENYLIST {
            math.set(name, LuaValue::Nil)?;
        }
    }

    Ok(())
}

/// Assert every forbidden name is unreachable. Runs on every sandbox
/// initialization, before any user script compiles.
pub fn validate_sandbox(lua: &Lua) -> Result<(), SandboxValidationError> {
    for name in FORBIDDEN_NAMES {
        // Dotted names whose base is already nil would error on index;
        // a protected probe treats that as nil too.
        let probe = format!(
            "local ok, v = pcall(function() return {name} end)\nif ok then return v end\nreturn nil"
        );
        let result: LuaResult<LuaValue> = lua.load(&probe).set_name("sandbox_probe").eval();
        match result {
            Ok(LuaValue::Nil) => {}
            Ok(_) | Err(_) => {
                return Err(SandboxValidationError {
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}
