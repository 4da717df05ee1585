//! Whitelist conversion between [`PropValue`] and Lua values.
//!
//! Every API call that returns a structured value converts host data to
//! sandbox-native tables through [`prop_to_lua`]; everything a script
//! hands back crosses through [`lua_to_prop`]. Unknown types (userdata,
//! functions, threads) are rejected with a typed error, never silently
//! converted.

use crate::components::props::{PropMap, PropValue};
use crate::script::TypeConversionError;
use mlua::prelude::*;

/// Maximum nesting depth accepted from scripts. Deep enough for any sane
/// property tree, shallow enough to stop reference cycles.
const MAX_DEPTH: usize = 16;

/// Convert a host property value into a Lua value. Sequences become
/// 1-indexed tables.
pub fn prop_to_lua(lua: &Lua, value: &PropValue) -> LuaResult<LuaValue> {
    match value {
        PropValue::Nil => Ok(LuaValue::Nil),
        PropValue::Bool(b) => Ok(LuaValue::Boolean(*b)),
        PropValue::Number(n) => Ok(LuaValue::Number(*n)),
        PropValue::Str(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        PropValue::Seq(seq) => {
            let table = lua.create_table_with_capacity(seq.len(), 0)?;
            for (i, item) in seq.iter().enumerate() {
                table.set(i + 1, prop_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        PropValue::Map(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (k, v) in map {
                table.set(k.as_str(), prop_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Convert a Lua value into a host property value, refusing anything
/// outside the primitive whitelist.
pub fn lua_to_prop(value: &LuaValue) -> Result<PropValue, TypeConversionError> {
    lua_to_prop_depth(value, 0)
}

fn lua_to_prop_depth(value: &LuaValue, depth: usize) -> Result<PropValue, TypeConversionError> {
    if depth > MAX_DEPTH {
        return Err(TypeConversionError {
            what: "a table nested deeper than the conversion limit".to_string(),
        });
    }
    match value {
        LuaValue::Nil => Ok(PropValue::Nil),
        LuaValue::Boolean(b) => Ok(PropValue::Bool(*b)),
        LuaValue::Integer(i) => Ok(PropValue::Number(*i as f64)),
        LuaValue::Number(n) => Ok(PropValue::Number(*n)),
        LuaValue::String(s) => Ok(PropValue::Str(s.to_string_lossy().to_string())),
        LuaValue::Table(table) => table_to_prop(table, depth),
        other => Err(TypeConversionError {
            what: format!("a value of type {}", other.type_name()),
        }),
    }
}

/// A table with contiguous integer keys 1..n becomes a sequence;
/// otherwise string/integer keys become a mapping. Any other key type is
/// refused.
fn table_to_prop(table: &LuaTable, depth: usize) -> Result<PropValue, TypeConversionError> {
    let len = table.raw_len();
    if len > 0 {
        let mut total = 0usize;
        for pair in table.clone().pairs::<LuaValue, LuaValue>() {
            let _ = pair.map_err(|_| TypeConversionError {
                what: "an unreadable table entry".to_string(),
            })?;
            total += 1;
        }
        if total == len {
            let mut seq = Vec::with_capacity(len);
            for i in 1..=len {
                let item: LuaValue = table.raw_get(i).map_err(|_| TypeConversionError {
                    what: "an unreadable table entry".to_string(),
                })?;
                seq.push(lua_to_prop_depth(&item, depth + 1)?);
            }
            return Ok(PropValue::Seq(seq));
        }
    }
    let mut map = PropMap::default();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (k, v) = pair.map_err(|_| TypeConversionError {
            what: "an unreadable table entry".to_string(),
        })?;
        let key = match &k {
            LuaValue::String(s) => s.to_string_lossy().to_string(),
            LuaValue::Integer(i) => i.to_string(),
            LuaValue::Number(n) => n.to_string(),
            other => {
                return Err(TypeConversionError {
                    what: format!("a table key of type {}", other.type_name()),
                });
            }
        };
        map.insert(key, lua_to_prop_depth(&v, depth + 1)?);
    }
    Ok(PropValue::Map(map))
}
