//! The `ams.*` host API table.
//!
//! A fixed whitelist of functions, registered before the sandbox clear
//! (the `ams` global survives it). Every function goes through the
//! shadow world in the interpreter's app data:
//!
//! - reads on invalid IDs return safe defaults and log at debug level
//! - writes on invalid or dead IDs are silent no-ops
//! - structured values cross through the conversion whitelist
//!
//! The pseudo-entities `pointer` and `screen` answer position/size reads;
//! everything else about them is the interaction engine's business.

use crate::components::props::PropValue;
use crate::script::convert::{lua_to_prop, prop_to_lua};
use crate::script::shadow::{sanitize_f32, ScheduleRequest, ShadowWorld};
use log::{debug, info, warn};
use mlua::prelude::*;

/// Build and install the `ams` table.
pub fn register_ams(lua: &Lua) -> LuaResult<()> {
    let ams = lua.create_table()?;
    register_motion_api(lua, &ams)?;
    register_state_api(lua, &ams)?;
    register_prop_api(lua, &ams)?;
    register_query_api(lua, &ams)?;
    register_game_api(lua, &ams)?;
    register_hierarchy_api(lua, &ams)?;
    register_math_api(lua, &ams)?;
    lua.globals().set("ams", ams)?;
    Ok(())
}

/// Read a scalar attribute with pseudo-entity fallbacks.
fn read_attr(shadow: &ShadowWorld, id: &str, attr: &str) -> f32 {
    match id {
        "pointer" => {
            return match attr {
                "x" => shadow.pointer.x,
                "y" => shadow.pointer.y,
                "w" => shadow.pointer.w,
                "h" => shadow.pointer.h,
                _ => 0.0,
            };
        }
        "screen" => {
            return match attr {
                "w" => shadow.screen_w,
                "h" => shadow.screen_h,
                _ => 0.0,
            };
        }
        _ => {}
    }
    let Some(entity) = shadow.get(id) else {
        debug!("ams: read of unknown entity '{id}'");
        return 0.0;
    };
    match attr {
        "x" => entity.pos.x,
        "y" => entity.pos.y,
        "vx" => entity.vel.x,
        "vy" => entity.vel.y,
        "w" => entity.size.x,
        "h" => entity.size.y,
        _ => 0.0,
    }
}

fn register_motion_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    macro_rules! getter {
        ($name:literal, $attr:literal) => {
            ams.set(
                $name,
                lua.create_function(|lua, id: String| {
                    let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                        return Ok(0.0);
                    };
                    Ok(read_attr(&shadow, &id, $attr))
                })?,
            )?;
        };
    }
    macro_rules! setter {
        ($name:literal, $write:expr) => {
            ams.set(
                $name,
                lua.create_function(|lua, (id, v): (String, f32)| {
                    if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                        let write: fn(&mut crate::script::shadow::ShadowEntity, f32) = $write;
                        shadow.write(&id, |e| write(e, sanitize_f32(v)));
                    }
                    Ok(())
                })?,
            )?;
        };
    }

    getter!("get_x", "x");
    getter!("get_y", "y");
    getter!("get_vx", "vx");
    getter!("get_vy", "vy");
    getter!("get_width", "w");
    getter!("get_height", "h");
    setter!("set_x", |e, v| e.pos.x = v);
    setter!("set_y", |e, v| e.pos.y = v);
    setter!("set_vx", |e, v| e.vel.x = v);
    setter!("set_vy", |e, v| e.vel.y = v);
    Ok(())
}

fn register_state_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    ams.set(
        "get_sprite",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(String::new());
            };
            Ok(shadow
                .get(&id)
                .and_then(|e| e.sprite.clone())
                .unwrap_or_default())
        })?,
    )?;
    ams.set(
        "set_sprite",
        lua.create_function(|lua, (id, sprite): (String, String)| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.write(&id, |e| e.sprite = Some(sprite));
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "get_color",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(String::new());
            };
            Ok(shadow
                .get(&id)
                .and_then(|e| e.color.clone())
                .unwrap_or_default())
        })?,
    )?;
    ams.set(
        "set_color",
        lua.create_function(|lua, (id, color): (String, String)| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.write(&id, |e| e.color = Some(color));
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "set_visible",
        lua.create_function(|lua, (id, visible): (String, bool)| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.write(&id, |e| e.visible = visible);
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "get_health",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(0i64);
            };
            Ok(shadow.get(&id).map(|e| e.health).unwrap_or(0))
        })?,
    )?;
    ams.set(
        "set_health",
        lua.create_function(|lua, (id, health): (String, i64)| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.write(&id, |e| e.health = health);
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "is_alive",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(false);
            };
            Ok(shadow.get(&id).map(|e| e.alive).unwrap_or(false))
        })?,
    )?;
    ams.set(
        "destroy",
        lua.create_function(|lua, id: String| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.queue_destroy(&id);
            }
            Ok(())
        })?,
    )?;
    Ok(())
}

fn register_prop_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    ams.set(
        "get_prop",
        lua.create_function(|lua, (id, key): (String, String)| {
            let value = {
                let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                    return Ok(LuaValue::Nil);
                };
                match id.as_str() {
                    "game" => match key.as_str() {
                        "lives" => PropValue::Number(shadow.lives as f64),
                        "score" => PropValue::Number(shadow.score as f64),
                        "state" => {
                            PropValue::Str(shadow.state.as_str().into())
                        }
                        _ => shadow.game_args.get(&key).cloned().unwrap_or(PropValue::Nil),
                    },
                    _ => match shadow.get(&id) {
                        Some(entity) => entity.prop(&key, shadow.time),
                        None => {
                            debug!("ams.get_prop: unknown entity '{id}'");
                            PropValue::Nil
                        }
                    },
                }
            };
            prop_to_lua(lua, &value)
        })?,
    )?;
    ams.set(
        "set_prop",
        lua.create_function(|lua, (id, key, value): (String, String, LuaValue)| {
            let prop = match lua_to_prop(&value) {
                Ok(prop) => prop,
                Err(e) => {
                    warn!("ams.set_prop('{id}', '{key}'): {e}; ignored");
                    return Ok(());
                }
            };
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.write(&id, |e| {
                    e.props.insert(key, prop);
                });
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "get_config",
        lua.create_function(
            |lua, (id, behavior, key, default): (String, String, String, LuaValue)| {
                let value = {
                    let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                        return Ok(LuaValue::Nil);
                    };
                    shadow.get(&id).and_then(|e| {
                        e.behaviors
                            .iter()
                            .find(|(name, _)| *name == behavior)
                            .and_then(|(_, config)| config.get(&key).cloned())
                    })
                };
                match value {
                    Some(prop) => prop_to_lua(lua, &prop),
                    None => Ok(default),
                }
            },
        )?,
    )?;
    Ok(())
}

fn register_query_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    /// Collect alive IDs in spawn order through a per-entity filter.
    fn collect(
        lua: &Lua,
        filter: impl Fn(&crate::script::shadow::ShadowEntity) -> bool,
    ) -> LuaResult<LuaTable> {
        let table = lua.create_table()?;
        let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
            return Ok(table);
        };
        let mut index = 1;
        for id in &shadow.order {
            if let Some(entity) = shadow.get(id) {
                if entity.alive && filter(entity) {
                    table.set(index, entity.id.as_str())?;
                    index += 1;
                }
            }
        }
        Ok(table)
    }

    ams.set(
        "get_entities_of_type",
        lua.create_function(|lua, type_name: String| {
            collect(lua, |e| {
                e.type_name == type_name || e.base_chain.iter().any(|b| *b == type_name)
            })
        })?,
    )?;
    ams.set(
        "get_entities_by_tag",
        lua.create_function(|lua, tag: String| collect(lua, |e| e.tags.iter().any(|t| *t == tag)))?,
    )?;
    ams.set(
        "count_entities_by_tag",
        lua.create_function(|lua, tag: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(0usize);
            };
            Ok(shadow
                .entities
                .values()
                .filter(|e| e.alive && e.tags.iter().any(|t| *t == tag))
                .count())
        })?,
    )?;
    ams.set(
        "get_all_entity_ids",
        lua.create_function(|lua, ()| collect(lua, |_| true))?,
    )?;
    Ok(())
}

fn register_game_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    ams.set(
        "get_screen_width",
        lua.create_function(|lua, ()| {
            Ok(lua
                .app_data_ref::<ShadowWorld>()
                .map(|s| s.screen_w)
                .unwrap_or(0.0))
        })?,
    )?;
    ams.set(
        "get_screen_height",
        lua.create_function(|lua, ()| {
            Ok(lua
                .app_data_ref::<ShadowWorld>()
                .map(|s| s.screen_h)
                .unwrap_or(0.0))
        })?,
    )?;
    ams.set(
        "get_score",
        lua.create_function(|lua, ()| {
            Ok(lua
                .app_data_ref::<ShadowWorld>()
                .map(|s| s.score + s.score_delta)
                .unwrap_or(0))
        })?,
    )?;
    ams.set(
        "add_score",
        lua.create_function(|lua, points: i64| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.score_delta += points;
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "get_time",
        lua.create_function(|lua, ()| {
            Ok(lua
                .app_data_ref::<ShadowWorld>()
                .map(|s| s.time)
                .unwrap_or(0.0))
        })?,
    )?;
    ams.set(
        "play_sound",
        lua.create_function(|lua, name: String| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                shadow.sounds.push(name);
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "schedule",
        lua.create_function(|lua, (delay, callback, id): (f64, String, String)| {
            if let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() {
                let behavior = shadow.current_script.clone().unwrap_or_default();
                shadow.schedules.push(ScheduleRequest {
                    delay: delay.max(0.0),
                    callback,
                    entity_id: id,
                    behavior,
                });
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "spawn",
        lua.create_function(
            |lua,
             (type_name, x, y, vx, vy, w, h, color, sprite): (
                String,
                f32,
                f32,
                Option<f32>,
                Option<f32>,
                Option<f32>,
                Option<f32>,
                Option<String>,
                Option<String>,
            )| {
                let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() else {
                    return Ok(LuaValue::Nil);
                };
                if !shadow.type_defaults.contains_key(&type_name) {
                    debug!("ams.spawn: unknown entity type '{type_name}'");
                    return Ok(LuaValue::Nil);
                }
                match shadow.queue_spawn(
                    &type_name,
                    x,
                    y,
                    vx.unwrap_or(0.0),
                    vy.unwrap_or(0.0),
                    w,
                    h,
                    color,
                    sprite,
                ) {
                    Some(id) => Ok(LuaValue::String(lua.create_string(&id)?)),
                    None => Ok(LuaValue::Nil),
                }
            },
        )?,
    )?;
    ams.set(
        "log",
        lua.create_function(|lua, message: String| {
            let context = lua
                .app_data_ref::<ShadowWorld>()
                .and_then(|s| s.current_script.clone())
                .unwrap_or_else(|| "script".to_string());
            info!(target: "ams", "[{context}] {message}");
            Ok(())
        })?,
    )?;
    Ok(())
}

fn register_hierarchy_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    ams.set(
        "set_parent",
        lua.create_function(
            |lua, (child, parent, ox, oy): (String, String, Option<f32>, Option<f32>)| {
                let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() else {
                    return Ok(());
                };
                let parent_alive = shadow.get(&parent).map(|e| e.alive).unwrap_or(false);
                let child_alive = shadow.get(&child).map(|e| e.alive).unwrap_or(false);
                if !parent_alive || !child_alive || child == parent {
                    warn!("ams.set_parent('{child}', '{parent}'): ignored");
                    return Ok(());
                }
                // Drop any previous link first; both sides stay in sync.
                let old_parent = shadow.get(&child).and_then(|e| e.parent.clone());
                if let Some((old, _, _)) = old_parent {
                    shadow.write(&old, |e| e.children.retain(|c| *c != child));
                }
                let (ox, oy) = (ox.unwrap_or(0.0), oy.unwrap_or(0.0));
                shadow.write(&child, |e| e.parent = Some((parent.clone(), ox, oy)));
                shadow.write(&parent, |e| {
                    if !e.children.iter().any(|c| *c == child) {
                        e.children.push(child.clone());
                    }
                });
                Ok(())
            },
        )?,
    )?;
    ams.set(
        "detach_from_parent",
        lua.create_function(|lua, id: String| {
            let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() else {
                return Ok(());
            };
            let parent = shadow.get(&id).and_then(|e| e.parent.clone());
            if let Some((parent_id, _, _)) = parent {
                shadow.write(&parent_id, |e| e.children.retain(|c| *c != id));
                shadow.write(&id, |e| e.parent = None);
            }
            Ok(())
        })?,
    )?;
    ams.set(
        "has_parent",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(false);
            };
            Ok(shadow.get(&id).map(|e| e.parent.is_some()).unwrap_or(false))
        })?,
    )?;
    ams.set(
        "get_parent_id",
        lua.create_function(|lua, id: String| {
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(LuaValue::Nil);
            };
            match shadow.get(&id).and_then(|e| e.parent.as_ref()) {
                Some((parent, _, _)) => Ok(LuaValue::String(lua.create_string(parent)?)),
                None => Ok(LuaValue::Nil),
            }
        })?,
    )?;
    ams.set(
        "get_children",
        lua.create_function(|lua, id: String| {
            let table = lua.create_table()?;
            let Some(shadow) = lua.app_data_ref::<ShadowWorld>() else {
                return Ok(table);
            };
            if let Some(entity) = shadow.get(&id) {
                for (i, child) in entity.children.iter().enumerate() {
                    table.set(i + 1, child.as_str())?;
                }
            }
            Ok(table)
        })?,
    )?;
    Ok(())
}

/// Duplicates the pure parts of the standard math library so scripts are
/// shielded from the global clear, plus the seeded RNG entry points.
fn register_math_api(lua: &Lua, ams: &LuaTable) -> LuaResult<()> {
    ams.set("sin", lua.create_function(|_, x: f64| Ok(x.sin()))?)?;
    ams.set("cos", lua.create_function(|_, x: f64| Ok(x.cos()))?)?;
    ams.set("sqrt", lua.create_function(|_, x: f64| Ok(x.sqrt()))?)?;
    ams.set(
        "atan2",
        lua.create_function(|_, (y, x): (f64, f64)| Ok(y.atan2(x)))?,
    )?;
    ams.set("abs", lua.create_function(|_, x: f64| Ok(x.abs()))?)?;
    ams.set(
        "min",
        lua.create_function(|_, (a, b): (f64, f64)| Ok(a.min(b)))?,
    )?;
    ams.set(
        "max",
        lua.create_function(|_, (a, b): (f64, f64)| Ok(a.max(b)))?,
    )?;
    ams.set("floor", lua.create_function(|_, x: f64| Ok(x.floor()))?)?;
    ams.set("ceil", lua.create_function(|_, x: f64| Ok(x.ceil()))?)?;
    ams.set(
        "clamp",
        lua.create_function(|_, (x, lo, hi): (f64, f64, f64)| Ok(x.clamp(lo, hi)))?,
    )?;
    ams.set(
        "random",
        lua.create_function(|lua, (m, n): (Option<i64>, Option<i64>)| {
            let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() else {
                return Ok(LuaValue::Nil);
            };
            let value = match (m, n) {
                (None, _) => LuaValue::Number(shadow.rng.f64()),
                (Some(m), None) => LuaValue::Integer(shadow.rng.i64(1..=m.max(1))),
                (Some(m), Some(n)) => {
                    let (lo, hi) = if m <= n { (m, n) } else { (n, m) };
                    LuaValue::Integer(shadow.rng.i64(lo..=hi))
                }
            };
            Ok(value)
        })?,
    )?;
    ams.set(
        "random_range",
        lua.create_function(|lua, (lo, hi): (f64, f64)| {
            let Some(mut shadow) = lua.app_data_mut::<ShadowWorld>() else {
                return Ok(0.0);
            };
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            Ok(lo + shadow.rng.f64() * (hi - lo))
        })?,
    )?;
    Ok(())
}
