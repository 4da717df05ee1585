//! Draw-list emission: the engine's entire rendering responsibility.
//!
//! Walks alive, visible entities in spawn order and expands each type's
//! render command list into typed draw commands. Template sprites
//! (`duck_{color}_{frame}`) substitute entity state at draw time;
//! `$property` colors and `when:` predicates resolve here too. A `stop`
//! command halts the rest of the entity's list.

use crate::components::boxsize::BoxSize;
use crate::components::ident::Ident;
use crate::components::kind::Kind;
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::components::props::{PropValue, Props};
use crate::components::visual::Visual;
use crate::definition::{ColorRef, GameDef, RenderCmdDef, RenderShape, RenderWhen};
use crate::resources::drawlist::{DrawCommand, DrawKind, DrawList, Rgb};
use crate::script::runtime::ScriptRuntime;
use bevy_ecs::prelude::*;
use log::warn;

/// Built-in colors accepted alongside the game palette.
pub fn builtin_rgb(name: &str) -> Option<Rgb> {
    match name {
        "black" => Some((0, 0, 0)),
        "white" => Some((255, 255, 255)),
        "red" => Some((230, 41, 55)),
        "green" => Some((0, 228, 48)),
        "blue" => Some((0, 121, 241)),
        "yellow" => Some((253, 249, 0)),
        "orange" => Some((255, 161, 0)),
        "purple" => Some((200, 122, 255)),
        "cyan" => Some((0, 255, 255)),
        "gray" => Some((130, 130, 130)),
        _ => None,
    }
}

/// Rebuild the frame's draw list.
pub fn build_draw_list(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    let mut rows: Vec<(u64, String, String, Position, BoxSize, Visual, Props)> = Vec::new();
    {
        let mut query = world.query_filtered::<(
            &Ident,
            &Kind,
            &Position,
            &BoxSize,
            &Visual,
            &Props,
        ), Without<DestroyPending>>();
        for (ident, kind, position, size, visual, props) in query.iter(world) {
            if !visual.visible {
                continue;
            }
            rows.push((
                ident.serial,
                ident.id.clone(),
                kind.name.clone(),
                *position,
                *size,
                visual.clone(),
                props.clone(),
            ));
        }
    }
    rows.sort_by_key(|(serial, ..)| *serial);

    let background = def
        .background_color
        .as_deref()
        .and_then(|name| resolve_color_name(def, name));

    let mut list = std::mem::take(&mut *world.resource_mut::<DrawList>());
    list.clear();
    list.background = background;

    for (_, id, type_name, position, size, visual, props) in &rows {
        let commands = def
            .entity_type(type_name)
            .map(|t| t.render.as_slice())
            .unwrap_or(&[]);
        if commands.is_empty() {
            list.commands
                .push(default_command(def, id, position, size, visual, props, &mut list.warned));
            continue;
        }
        let mut layer_index = 0u32;
        for cmd in commands {
            if let RenderShape::Stop = cmd.shape {
                if when_passes(runtime, cmd, id, props) {
                    break;
                }
                continue;
            }
            if !when_passes(runtime, cmd, id, props) {
                layer_index += 1;
                continue;
            }
            if let Some(draw) =
                expand_command(def, cmd, id, position, size, visual, props, layer_index, &mut list.warned)
            {
                list.commands.push(draw);
            }
            layer_index += 1;
        }
    }

    *world.resource_mut::<DrawList>() = list;
}

/// Entities without a render list draw their sprite, or a filled box.
fn default_command(
    def: &GameDef,
    id: &str,
    position: &Position,
    size: &BoxSize,
    visual: &Visual,
    props: &Props,
    warned: &mut rustc_hash::FxHashSet<String>,
) -> DrawCommand {
    let color = visual
        .color
        .as_deref()
        .and_then(|name| resolve_color_name(def, name))
        .unwrap_or((255, 255, 255));
    let kind = match &visual.sprite {
        Some(sprite) => DrawKind::Sprite {
            name: resolve_template(sprite, visual, &props.map, id, warned),
        },
        None => DrawKind::Rectangle,
    };
    DrawCommand {
        kind,
        x: position.pos.x,
        y: position.pos.y,
        width: size.w,
        height: size.h,
        color,
        alpha: 255,
        fill: true,
        line_width: 1.0,
        entity_id: id.to_string(),
        layer_index: 0,
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_command(
    def: &GameDef,
    cmd: &RenderCmdDef,
    id: &str,
    position: &Position,
    size: &BoxSize,
    visual: &Visual,
    props: &Props,
    layer_index: u32,
    warned: &mut rustc_hash::FxHashSet<String>,
) -> Option<DrawCommand> {
    let (w, h) = cmd.size.unwrap_or((size.w, size.h));
    let color = resolve_color(def, cmd, visual, props, id, warned);

    let kind = match &cmd.shape {
        RenderShape::Rectangle => DrawKind::Rectangle,
        RenderShape::Circle => DrawKind::Circle,
        RenderShape::Triangle => DrawKind::Triangle,
        RenderShape::Line => DrawKind::Line,
        RenderShape::Polygon { points } => DrawKind::Polygon {
            points: points.clone(),
        },
        RenderShape::Sprite { name } => DrawKind::Sprite {
            name: resolve_template(name, visual, &props.map, id, warned),
        },
        RenderShape::Text { text, font_size } => DrawKind::Text {
            text: resolve_template(text, visual, &props.map, id, warned),
            font_size: *font_size,
        },
        RenderShape::Stop => return None,
    };

    Some(DrawCommand {
        kind,
        x: position.pos.x + cmd.offset.0,
        y: position.pos.y + cmd.offset.1,
        width: w,
        height: h,
        color,
        alpha: cmd.alpha,
        fill: cmd.fill,
        line_width: cmd.line_width,
        entity_id: id.to_string(),
        layer_index,
    })
}

fn when_passes(runtime: &ScriptRuntime, cmd: &RenderCmdDef, id: &str, props: &Props) -> bool {
    match &cmd.when {
        None => true,
        Some(RenderWhen::Property { key, value }) => {
            let current = props.map.get(key).cloned().unwrap_or(PropValue::Nil);
            match value {
                PropValue::Nil => current.truthy(),
                expected => current == *expected,
            }
        }
        Some(RenderWhen::Script(script)) => {
            match runtime.call(script, "evaluate", id, (id.to_string(),)) {
                Ok(value) => !matches!(value, mlua::Value::Nil | mlua::Value::Boolean(false)),
                Err(e) => {
                    warn!("{e}");
                    false
                }
            }
        }
    }
}

fn resolve_color(
    def: &GameDef,
    cmd: &RenderCmdDef,
    visual: &Visual,
    props: &Props,
    id: &str,
    warned: &mut rustc_hash::FxHashSet<String>,
) -> Rgb {
    match &cmd.color {
        Some(ColorRef::Literal(r, g, b)) => (*r, *g, *b),
        Some(ColorRef::Palette(name)) => resolve_color_name(def, name).unwrap_or((255, 255, 255)),
        Some(ColorRef::Property(key)) => {
            let name = props
                .map
                .get(key)
                .and_then(|v| v.as_str().map(str::to_string))
                .or_else(|| {
                    // "$color" falls back to the entity's visual color.
                    (key == "color").then(|| visual.color.clone()).flatten()
                });
            match name.as_deref().and_then(|n| resolve_color_name(def, n)) {
                Some(rgb) => rgb,
                None => {
                    let warn_key = format!("color:{id}:{key}");
                    if warned.insert(warn_key) {
                        warn!("render color property '{key}' missing on '{id}'; using white");
                    }
                    (255, 255, 255)
                }
            }
        }
        None => visual
            .color
            .as_deref()
            .and_then(|name| resolve_color_name(def, name))
            .unwrap_or((255, 255, 255)),
    }
}

fn resolve_color_name(def: &GameDef, name: &str) -> Option<Rgb> {
    def.palette.get(name).copied().or_else(|| builtin_rgb(name))
}

/// Substitute `{slot}` markers from entity state: `{color}` reads the
/// visual color, anything else reads the property bag. Numbers format
/// without a trailing `.0` so `duck_{frame}` gives `duck_2`.
fn resolve_template(
    template: &str,
    visual: &Visual,
    props: &crate::components::props::PropMap,
    id: &str,
    warned: &mut rustc_hash::FxHashSet<String>,
) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let slot = &rest[start + 1..start + end];
        let value = match slot {
            "color" => visual.color.clone(),
            "sprite" => visual.sprite.clone(),
            _ => props.get(slot).map(format_prop),
        };
        match value {
            Some(v) => out.push_str(&v),
            None => {
                let warn_key = format!("template:{id}:{slot}");
                if warned.insert(warn_key) {
                    warn!("template slot '{{{slot}}}' missing on '{id}'; left empty");
                }
            }
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

fn format_prop(value: &PropValue) -> String {
    match value {
        PropValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        PropValue::Number(n) => format!("{n}"),
        PropValue::Str(s) => s.clone(),
        PropValue::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::props::PropMap;

    #[test]
    fn template_substitutes_color_and_frame() {
        let visual = Visual::new(None, Some("yellow".to_string()));
        let mut props = PropMap::default();
        props.insert("frame".to_string(), PropValue::Number(2.0));
        let mut warned = rustc_hash::FxHashSet::default();
        let name = resolve_template("duck_{color}_{frame}", &visual, &props, "e1", &mut warned);
        assert_eq!(name, "duck_yellow_2");
    }
}
