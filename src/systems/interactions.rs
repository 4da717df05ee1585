//! Unified interaction engine.
//!
//! Every frame, for each alive entity A in spawn order, each of its
//! declared `(target, filter, trigger, action)` tuples is evaluated
//! against every matching partner B: another entity (by type, base type,
//! or tag) or one of the system pseudo-entities. Filters read the shadow
//! world, so a mutation made by an earlier action this frame is visible
//! to later filters. Edge detection keeps one boolean per
//! (A, B, interaction) key; destroys queued by actions take effect at
//! the end-of-frame sweep, never mid-list.

use crate::components::boxsize::Rect;
use crate::components::interactionstate::InteractionMemory;
use crate::components::props::PropValue;
use crate::definition::{
    FilterDef, GameDef, InteractionDef, MeasureMode, ScreenEdge, ScriptNamespace, TriggerMode,
    PSEUDO_ENTITIES,
};
use crate::resources::entityindex::EntityIndex;
use crate::resources::simtime::SimTime;
use crate::script::convert::prop_to_lua;
use crate::script::runtime::ScriptRuntime;
use crate::script::shadow::{ShadowEntity, ShadowWorld};
use bevy_ecs::prelude::World;
use log::warn;
use mlua::prelude::*;
use smallvec::SmallVec;

/// Outcome of one filter evaluation, with the measurements the action's
/// context table reports so scripts need not re-measure.
#[derive(Debug, Clone, Copy)]
pub struct FilterEval {
    pub passes: bool,
    pub distance: f64,
    pub angle: f64,
    pub target_x: f32,
    pub target_y: f32,
    pub target_active: bool,
}

/// Run the full interaction pass for this frame.
pub fn run_interactions(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    let now = world.resource::<SimTime>().elapsed;

    let actors: Vec<(String, String)> = runtime.with_shadow(|shadow| {
        shadow
            .order
            .iter()
            .filter_map(|id| {
                let entity = shadow.get(id)?;
                (entity.alive && !entity.queued).then(|| (id.clone(), entity.type_name.clone()))
            })
            .collect()
    });

    for (a_id, a_type) in actors {
        let a_alive = runtime.with_shadow(|s| s.get(&a_id).map(|e| e.alive).unwrap_or(false));
        if !a_alive {
            continue;
        }
        let Some(type_def) = def.entity_type(&a_type) else {
            continue;
        };
        for (index, interaction) in type_def.interactions.iter().enumerate() {
            if PSEUDO_ENTITIES.contains(&interaction.target.as_str()) {
                let eval = runtime.with_shadow(|s| {
                    eval_pseudo(s, &a_id, &interaction.target, &interaction.filter, now)
                });
                if let Some(eval) = eval {
                    let partner = interaction.target.clone();
                    maybe_fire(world, runtime, def, &a_id, &partner, index as u32, interaction, eval);
                }
            } else {
                let partners: SmallVec<[String; 16]> = runtime.with_shadow(|shadow| {
                    shadow
                        .order
                        .iter()
                        .filter_map(|id| {
                            if *id == a_id {
                                return None; // self-interactions are never emitted
                            }
                            let entity = shadow.get(id)?;
                            (entity.alive
                                && !entity.queued
                                && matches_target(entity, &interaction.target))
                            .then(|| id.clone())
                        })
                        .collect()
                });
                for b_id in partners {
                    let eval = runtime
                        .with_shadow(|s| eval_pair(s, &a_id, &b_id, &interaction.filter, now));
                    if let Some(eval) = eval {
                        maybe_fire(world, runtime, def, &a_id, &b_id, index as u32, interaction, eval);
                    }
                }
            }
        }
    }
}

/// B matches if its type equals the target, its base chain contains it,
/// or it carries the target as a tag.
pub fn matches_target(entity: &ShadowEntity, target: &str) -> bool {
    entity.type_name == target
        || entity.base_chain.iter().any(|b| b == target)
        || entity.tags.iter().any(|t| t == target)
}

/// Apply edge detection, then dispatch if the trigger fires.
fn maybe_fire(
    world: &mut World,
    runtime: &ScriptRuntime,
    def: &GameDef,
    a_id: &str,
    partner: &str,
    index: u32,
    interaction: &InteractionDef,
    eval: FilterEval,
) {
    let Some(entity) = world.resource::<EntityIndex>().get(a_id) else {
        return;
    };
    let key = InteractionMemory::edge_key(index, partner);
    let previous = match world.get_mut::<InteractionMemory>(entity) {
        Some(mut memory) => memory.swap_edge(key, eval.passes),
        None => false,
    };
    let fire = match interaction.trigger {
        TriggerMode::Enter => eval.passes && !previous,
        TriggerMode::Exit => !eval.passes && previous,
        TriggerMode::Continuous => eval.passes,
    };
    if fire {
        dispatch_action(runtime, def, a_id, partner, interaction, eval);
    }
}

/// Dispatch an interaction's action through the sandbox, honoring the
/// three calling conventions.
pub fn dispatch_action(
    runtime: &ScriptRuntime,
    def: &GameDef,
    a_id: &str,
    b_key: &str,
    interaction: &InteractionDef,
    eval: FilterEval,
) {
    let Some(script) = def.scripts.get(&interaction.action) else {
        return;
    };
    let lua = runtime.lua();
    let modifier = match prop_to_lua(lua, &PropValue::Map(interaction.modifier.clone())) {
        Ok(v) => v,
        Err(e) => {
            warn!("modifier for action '{}' unconvertible: {e}", interaction.action);
            LuaValue::Nil
        }
    };

    let result = match script.namespace {
        ScriptNamespace::InteractionAction => {
            match build_context(lua, interaction, eval) {
                Ok(context) => runtime.call(
                    &interaction.action,
                    "execute",
                    a_id,
                    (a_id.to_string(), b_key.to_string(), modifier, context),
                ),
                Err(e) => {
                    warn!("context table for action '{}': {e}", interaction.action);
                    return;
                }
            }
        }
        ScriptNamespace::CollisionAction => runtime.call(
            &interaction.action,
            "execute",
            a_id,
            (a_id.to_string(), b_key.to_string(), modifier),
        ),
        ScriptNamespace::InputAction => runtime.call(
            &interaction.action,
            "execute",
            a_id,
            (eval.target_x, eval.target_y, modifier),
        ),
        _ => {
            warn!(
                "action '{}' is a {}, not an action namespace",
                interaction.action,
                script.namespace.as_str()
            );
            return;
        }
    };
    if let Err(e) = result {
        warn!("{e}");
    }
}

/// The context table the canonical action form receives.
fn build_context(
    lua: &Lua,
    interaction: &InteractionDef,
    eval: FilterEval,
) -> LuaResult<LuaTable> {
    let context = lua.create_table()?;
    context.set("trigger", interaction.trigger.as_str())?;
    context.set("target", interaction.target.as_str())?;
    context.set("target_x", eval.target_x)?;
    context.set("target_y", eval.target_y)?;
    context.set("target_active", eval.target_active)?;
    context.set("distance", eval.distance)?;
    context.set("angle", eval.angle)?;
    Ok(context)
}

/// Entity-vs-entity filter evaluation.
fn eval_pair(
    shadow: &ShadowWorld,
    a_id: &str,
    b_id: &str,
    filter: &FilterDef,
    now: f64,
) -> Option<FilterEval> {
    let a = shadow.get(a_id)?;
    let b = shadow.get(b_id)?;
    let rect_a = Rect::new(a.pos.x, a.pos.y, a.size.x, a.size.y);
    let rect_b = Rect::new(b.pos.x, b.pos.y, b.size.x, b.size.y);

    let distance = measured_distance(&rect_a, &rect_b, filter.distance_from, filter.distance_to);
    let angle = angle_between(&rect_a, &rect_b);
    let center_b = rect_b.center();

    let mut passes = true;
    if let Some(cmp) = &filter.distance {
        passes &= cmp.matches_scalar(distance);
    }
    if let Some((lo, hi)) = filter.angle_between {
        passes &= angle_in_range(angle, lo, hi);
    }
    if !filter.edges.is_empty() {
        // edges: is sugar for the screen target only.
        passes = false;
    }
    passes &= filter
        .props_a
        .iter()
        .all(|p| p.cmp.matches(&entity_filter_prop(a, &p.key, now)));
    passes &= filter
        .props_b
        .iter()
        .all(|p| p.cmp.matches(&entity_filter_prop(b, &p.key, now)));

    Some(FilterEval {
        passes,
        distance,
        angle,
        target_x: center_b.x,
        target_y: center_b.y,
        target_active: false,
    })
}

/// Pseudo-entity filter evaluation.
fn eval_pseudo(
    shadow: &ShadowWorld,
    a_id: &str,
    target: &str,
    filter: &FilterDef,
    now: f64,
) -> Option<FilterEval> {
    let a = shadow.get(a_id)?;
    let rect_a = Rect::new(a.pos.x, a.pos.y, a.size.x, a.size.y);

    let (rect_b, target_active) = match target {
        "pointer" => {
            let p = &shadow.pointer;
            (
                Rect::new(p.x - p.w * 0.5, p.y - p.h * 0.5, p.w, p.h),
                p.active,
            )
        }
        "screen" => (Rect::new(0.0, 0.0, shadow.screen_w, shadow.screen_h), false),
        // level / game / time have no spatial extent; measurements are 0.
        _ => (rect_a, false),
    };

    let spatial = matches!(target, "pointer" | "screen");
    let distance = if spatial {
        measured_distance(&rect_a, &rect_b, filter.distance_from, filter.distance_to)
    } else {
        0.0
    };
    let angle = if spatial { angle_between(&rect_a, &rect_b) } else { 0.0 };

    let mut passes = true;
    if let Some(cmp) = &filter.distance {
        passes &= spatial && cmp.matches_scalar(distance);
    }
    if let Some((lo, hi)) = filter.angle_between {
        passes &= spatial && angle_in_range(angle, lo, hi);
    }
    if !filter.edges.is_empty() {
        passes &= target == "screen" && edges_pass(a, &rect_a, shadow, filter);
    }
    passes &= filter
        .props_a
        .iter()
        .all(|p| p.cmp.matches(&entity_filter_prop(a, &p.key, now)));
    passes &= filter
        .props_b
        .iter()
        .all(|p| p.cmp.matches(&pseudo_prop(shadow, target, &p.key, a, now)));

    let center_b = rect_b.center();
    Some(FilterEval {
        passes,
        distance,
        angle,
        target_x: center_b.x,
        target_y: center_b.y,
        target_active,
    })
}

/// `edges:` sugar: the entity is moving toward the named edge and its
/// AABB has crossed the edge line (shifted by `margin`).
fn edges_pass(a: &ShadowEntity, rect: &Rect, shadow: &ShadowWorld, filter: &FilterDef) -> bool {
    let m = filter.margin;
    let (w, h) = (shadow.screen_w, shadow.screen_h);
    filter.edges.iter().any(|edge| match edge {
        ScreenEdge::Top => a.vel.y < 0.0 && rect.y < -m,
        ScreenEdge::Bottom => a.vel.y > 0.0 && rect.bottom() > h + m,
        ScreenEdge::Left => a.vel.x < 0.0 && rect.x < -m,
        ScreenEdge::Right => a.vel.x > 0.0 && rect.right() > w + m,
        ScreenEdge::Any => {
            (a.vel.y < 0.0 && rect.y < -m)
                || (a.vel.y > 0.0 && rect.bottom() > h + m)
                || (a.vel.x < 0.0 && rect.x < -m)
                || (a.vel.x > 0.0 && rect.right() > w + m)
        }
    })
}

/// Distance between two boxes under the declared measure modes.
/// Edge-to-edge is AABB separation: 0 on exact touch, negative inside.
pub fn measured_distance(a: &Rect, b: &Rect, from: MeasureMode, to: MeasureMode) -> f64 {
    match (from, to) {
        (MeasureMode::Edge, MeasureMode::Edge) => a.separation(b) as f64,
        (MeasureMode::Center, MeasureMode::Center) => (b.center() - a.center()).length() as f64,
        (MeasureMode::Center, MeasureMode::Edge) => {
            let p = a.center();
            (b.clamp_point(p) - p).length() as f64
        }
        (MeasureMode::Edge, MeasureMode::Center) => {
            let p = b.center();
            (a.clamp_point(p) - p).length() as f64
        }
    }
}

/// Degrees from A's center to B's center: 0 = east, 90 = north
/// (screen up), clockwise negative. Normalized to [0, 360).
pub fn angle_between(a: &Rect, b: &Rect) -> f64 {
    let d = b.center() - a.center();
    ((-d.y as f64).atan2(d.x as f64)).to_degrees().rem_euclid(360.0)
}

/// Wrapping range check in degrees.
pub fn angle_in_range(angle: f64, lo: f64, hi: f64) -> bool {
    let a = angle.rem_euclid(360.0);
    let lo = lo.rem_euclid(360.0);
    let hi = hi.rem_euclid(360.0);
    if lo <= hi {
        a >= lo && a <= hi
    } else {
        a >= lo || a <= hi
    }
}

/// Property reads in filters cover transform attributes as well as the
/// custom bag and computed properties.
fn entity_filter_prop(entity: &ShadowEntity, key: &str, now: f64) -> PropValue {
    match key {
        "x" => PropValue::Number(entity.pos.x as f64),
        "y" => PropValue::Number(entity.pos.y as f64),
        "vx" => PropValue::Number(entity.vel.x as f64),
        "vy" => PropValue::Number(entity.vel.y as f64),
        "width" => PropValue::Number(entity.size.x as f64),
        "height" => PropValue::Number(entity.size.y as f64),
        "health" => PropValue::Number(entity.health as f64),
        "type" => PropValue::Str(entity.type_name.clone()),
        "visible" => PropValue::Bool(entity.visible),
        _ => entity.prop(key, now),
    }
}

/// Readable attributes of the system pseudo-entities.
fn pseudo_prop(
    shadow: &ShadowWorld,
    target: &str,
    key: &str,
    holder: &ShadowEntity,
    now: f64,
) -> PropValue {
    match target {
        "pointer" => match key {
            "active" => PropValue::Bool(shadow.pointer.active),
            "input_type" => PropValue::Str(shadow.pointer.input_type.clone()),
            "x" => PropValue::Number(shadow.pointer.x as f64),
            "y" => PropValue::Number(shadow.pointer.y as f64),
            _ => PropValue::Nil,
        },
        "screen" => match key {
            "width" => PropValue::Number(shadow.screen_w as f64),
            "height" => PropValue::Number(shadow.screen_h as f64),
            _ => PropValue::Nil,
        },
        "game" => match key {
            "lives" => PropValue::Number(shadow.lives as f64),
            "score" => PropValue::Number(shadow.score as f64),
            "state" => PropValue::Str(shadow.state.as_str().to_string()),
            _ => PropValue::Nil,
        },
        "time" => match key {
            "elapsed" => PropValue::Number(now - holder.spawn_time),
            "absolute" => PropValue::Number(now),
            _ => PropValue::Nil,
        },
        _ => PropValue::Nil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_convention_east_is_zero_north_is_ninety() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let east = Rect::new(20.0, 0.0, 10.0, 10.0);
        let north = Rect::new(0.0, -20.0, 10.0, 10.0);
        assert!((angle_between(&a, &east) - 0.0).abs() < 1e-6);
        assert!((angle_between(&a, &north) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn angle_range_wraps() {
        assert!(angle_in_range(350.0, 340.0, 20.0));
        assert!(angle_in_range(10.0, 340.0, 20.0));
        assert!(!angle_in_range(180.0, 340.0, 20.0));
    }
}
