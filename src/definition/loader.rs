//! Game-definition loader.
//!
//! Produces a validated, fully-resolved [`GameDef`] from `game.yaml`:
//!
//! 1. open the root file through the content filesystem
//! 2. parse YAML into a generic document (`Parse` errors)
//! 3. convert + validate against the schema (`Schema` errors; the
//!    validation pass is skippable via `SKIP_SCHEMA_VALIDATION`)
//! 4. resolve `extends` chains (child overrides, lists replaced)
//! 5. extract inline `{lua: "..."}` nodes to synthetic names
//! 6. compile every script once into the sandbox, checking entry points
//! 7. reference closure check
//! 8. freeze

use crate::components::props::{PropMap, PropValue};
use crate::content::ContentFs;
use crate::definition::error::{LoadError, LoadErrorKind};
use crate::definition::raw::*;
use crate::definition::*;
use crate::script::runtime::ScriptRuntime;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_yaml::Value;

/// Built-in color names accepted alongside the game's palette.
const BUILTIN_COLORS: [&str; 10] = [
    "black", "white", "red", "green", "blue", "yellow", "orange", "purple", "cyan", "gray",
];

/// Loader switches.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Skip the structural validation pass (`SKIP_SCHEMA_VALIDATION`).
    /// Unsafe for production; exists for debugging definitions.
    pub skip_schema_validation: bool,
}

impl LoadOptions {
    /// Read the switches from the environment.
    pub fn from_env() -> Self {
        Self {
            skip_schema_validation: std::env::var_os("SKIP_SCHEMA_VALIDATION").is_some(),
        }
    }
}

/// Accumulates extracted scripts during loading.
struct ScriptBag {
    scripts: FxHashMap<String, ScriptDef>,
    inline_counter: u32,
}

impl ScriptBag {
    fn new() -> Self {
        Self {
            scripts: FxHashMap::default(),
            inline_counter: 0,
        }
    }

    fn insert(
        &mut self,
        name: String,
        namespace: ScriptNamespace,
        source: String,
        origin: String,
    ) -> Result<(), LoadError> {
        if self.scripts.contains_key(&name) {
            return Err(LoadError::schema(
                origin,
                format!("script name '{name}' is defined more than once"),
            ));
        }
        self.scripts.insert(
            name.clone(),
            ScriptDef {
                name,
                namespace,
                source,
                origin,
            },
        );
        Ok(())
    }

    /// Extract an inline node to a synthetic name within `context`.
    fn extract_inline(
        &mut self,
        context: &str,
        namespace: ScriptNamespace,
        lua: String,
    ) -> Result<String, LoadError> {
        let name = format!("inline_{}_{}", context.replace(['.', '[', ']'], "_"), {
            self.inline_counter += 1;
            self.inline_counter
        });
        self.insert(name.clone(), namespace, lua, context.to_string())?;
        Ok(name)
    }
}

/// Load and freeze a complete game definition.
pub fn load_game(
    fs: &ContentFs,
    runtime: &mut ScriptRuntime,
    slug: &str,
    opts: &LoadOptions,
) -> Result<GameDef, LoadError> {
    let root_vpath = format!("games/{slug}/game.yaml");
    let text = fs.read_text(&root_vpath).map_err(|e| {
        LoadError::new(LoadErrorKind::Parse, &root_vpath, format!("cannot read: {e}"))
    })?;

    // Stage 1: generic parse.
    let doc: Value = serde_yaml::from_str(&text)
        .map_err(|e| LoadError::new(LoadErrorKind::Parse, &root_vpath, e.to_string()))?;
    if !doc.is_mapping() {
        return Err(LoadError::schema(&root_vpath, "document root must be a mapping"));
    }

    // Stage 2: structured conversion.
    let raw: RawGameDef = serde_yaml::from_value(doc)
        .map_err(|e| LoadError::schema(&root_vpath, e.to_string()))?;

    if opts.skip_schema_validation {
        debug!("schema validation skipped for '{slug}' (SKIP_SCHEMA_VALIDATION)");
    } else {
        validate_schema(&raw, &root_vpath)?;
    }

    let mut bag = ScriptBag::new();

    // Named script tables (behaviors, the four action namespaces,
    // generators). File refs resolve through the content filesystem.
    for (table, namespace) in [
        (&raw.behaviors, ScriptNamespace::Behavior),
        (&raw.interaction_actions, ScriptNamespace::InteractionAction),
        (&raw.collision_actions, ScriptNamespace::CollisionAction),
        (&raw.input_actions, ScriptNamespace::InputAction),
        (&raw.generators, ScriptNamespace::Generator),
    ] {
        for (name, reference) in table {
            let context = format!("{}.{name}", namespace.as_str());
            let (source, origin) = resolve_source(fs, slug, reference, &context)?;
            bag.insert(name.clone(), namespace, source, origin)?;
        }
    }

    // Entity types: extends resolution, then per-type extraction.
    let base_chains = resolve_extend_chains(&raw, &root_vpath)?;
    let mut entity_types = FxHashMap::default();
    for name in raw.entity_types.keys() {
        let def = resolve_entity_type(fs, slug, &raw, name, &base_chains[name], &mut bag)?;
        entity_types.insert(name.clone(), def);
    }

    // Global input action.
    let global_input_action = match &raw.global_input {
        None => None,
        Some(reference) => Some(action_name(
            fs,
            slug,
            reference,
            "global_input",
            ScriptNamespace::InputAction,
            &mut bag,
        )?),
    };

    // Win condition.
    let win_condition = match &raw.win_condition {
        None => None,
        Some(raw_win) => Some(resolve_win(fs, slug, raw_win, &mut bag)?),
    };

    // Lose conditions.
    let mut lose_conditions = Vec::new();
    for (i, raw_lose) in raw.lose_conditions.iter().enumerate() {
        lose_conditions.push(resolve_lose(raw_lose, &format!("lose_conditions[{i}]"))?);
    }

    // Assets.
    let assets = resolve_assets(&raw.assets);

    // Layout.
    let layout = match &raw.layout {
        None => None,
        Some(raw_layout) => Some(resolve_layout(raw_layout, "layout")?),
    };

    let def = GameDef {
        slug: slug.to_string(),
        name: raw.name.clone().unwrap_or_else(|| slug.to_string()),
        description: raw.description.clone().unwrap_or_default(),
        version: raw.version.clone().unwrap_or_default(),
        author: raw.author.clone().unwrap_or_default(),
        screen_width: raw.screen_width.unwrap_or(800.0),
        screen_height: raw.screen_height.unwrap_or(600.0),
        background_color: raw.background_color.clone(),
        palette: raw.palette.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        defaults: Defaults {
            lives: raw.defaults.lives.unwrap_or(3),
            pacing: raw.defaults.pacing.clone(),
            quiver_size: raw.defaults.quiver_size,
            retrieval_pause: raw.defaults.retrieval_pause,
        },
        entity_types,
        scripts: bag.scripts,
        global_input_action,
        win_condition,
        lose_conditions,
        levels: raw.levels.clone(),
        layout,
        assets,
    };

    // Stage 6: compile every script once; note entry points.
    for script in def.scripts.values() {
        runtime.compile(script).map_err(|e| {
            LoadError::new(LoadErrorKind::ScriptCompile, &script.origin, e.to_string())
        })?;
    }
    check_entry_points(&def, runtime)?;

    // Stage 7: reference closure.
    check_references(&def)?;

    debug!(
        "loaded game '{}' ({} types, {} scripts)",
        def.slug,
        def.entity_types.len(),
        def.scripts.len()
    );
    Ok(def)
}

/// Load a level file through the content filesystem.
pub fn load_level(fs: &ContentFs, slug: &str, level_vpath: &str, def: &GameDef) -> Result<LevelDef, LoadError> {
    let vpath = format!("games/{slug}/{level_vpath}");
    let text = fs
        .read_text(&vpath)
        .map_err(|e| LoadError::new(LoadErrorKind::Parse, &vpath, format!("cannot read: {e}")))?;
    let raw: RawLevel = serde_yaml::from_str(&text)
        .map_err(|e| LoadError::schema(&vpath, e.to_string()))?;

    let layout = match &raw.layout {
        None => None,
        Some(raw_layout) => Some(resolve_layout(raw_layout, &vpath)?),
    };
    let mut spawns = Vec::new();
    for (i, s) in raw.spawns.iter().flatten().enumerate() {
        if !def.entity_types.contains_key(&s.type_name) {
            return Err(LoadError::missing(
                format!("{vpath}.spawns[{i}]"),
                format!("unknown entity type '{}'", s.type_name),
            ));
        }
        spawns.push(LevelSpawnDef {
            type_name: s.type_name.clone(),
            x: s.x,
            y: s.y,
            vx: s.vx.unwrap_or(0.0),
            vy: s.vy.unwrap_or(0.0),
        });
    }
    if let Some(layout) = &layout {
        for (glyph, cell) in &layout.key {
            if !def.entity_types.contains_key(&cell.type_name) {
                return Err(LoadError::missing(
                    format!("{vpath}.layout.key.{glyph}"),
                    format!("unknown entity type '{}'", cell.type_name),
                ));
            }
        }
    }
    Ok(LevelDef {
        name: raw.name.unwrap_or_else(|| level_vpath.to_string()),
        layout,
        spawns,
    })
}

/// Required-field and value checks (stage 3).
fn validate_schema(raw: &RawGameDef, path: &str) -> Result<(), LoadError> {
    let missing_field = |field: &str| {
        LoadError::schema(
            format!("{path}.{field}"),
            format!("required field '{field}' is missing"),
        )
    };
    if raw.name.is_none() {
        return Err(missing_field("name"));
    }
    if raw.screen_width.is_none() {
        return Err(missing_field("screen_width"));
    }
    if raw.screen_height.is_none() {
        return Err(missing_field("screen_height"));
    }
    if raw.entity_types.is_empty() {
        return Err(missing_field("entity_types"));
    }
    if raw.win_condition.is_none() && raw.lose_conditions.is_empty() {
        return Err(LoadError::schema(
            path,
            "at least one of win_condition or lose_conditions is required",
        ));
    }
    if let Some(w) = raw.screen_width {
        if !w.is_finite() || w <= 0.0 {
            return Err(LoadError::schema(
                format!("{path}.screen_width"),
                "screen_width must be a positive finite number",
            ));
        }
    }
    if let Some(h) = raw.screen_height {
        if !h.is_finite() || h <= 0.0 {
            return Err(LoadError::schema(
                format!("{path}.screen_height"),
                "screen_height must be a positive finite number",
            ));
        }
    }
    for (name, raw_type) in &raw.entity_types {
        for (i, inter) in raw_type.interactions.iter().flatten().enumerate() {
            if let Some(because) = &inter.because {
                if !matches!(because.as_str(), "enter" | "exit" | "continuous") {
                    return Err(LoadError::schema(
                        format!("{path}.entity_types.{name}.interactions[{i}].because"),
                        format!("unknown trigger mode '{because}'"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Stage 4: compute the base-type chain for every entity type,
/// rejecting cycles and dangling `extends`.
fn resolve_extend_chains(
    raw: &RawGameDef,
    path: &str,
) -> Result<FxHashMap<String, Vec<String>>, LoadError> {
    let mut chains = FxHashMap::default();
    for name in raw.entity_types.keys() {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(name.clone());
        let mut current = name.clone();
        loop {
            let Some(parent) = raw
                .entity_types
                .get(&current)
                .and_then(|t| t.extends.clone())
            else {
                break;
            };
            if parent == BASE_TYPE && !raw.entity_types.contains_key(BASE_TYPE) {
                chain.push(parent);
                break;
            }
            if !raw.entity_types.contains_key(&parent) {
                return Err(LoadError::missing(
                    format!("{path}.entity_types.{current}.extends"),
                    format!("unknown base type '{parent}'"),
                ));
            }
            if !seen.insert(parent.clone()) {
                return Err(LoadError::new(
                    LoadErrorKind::ExtendCycle,
                    format!("{path}.entity_types.{name}.extends"),
                    format!("extends chain does not terminate (revisits '{parent}')"),
                ));
            }
            chain.push(parent.clone());
            current = parent;
        }
        if chain.last().map(String::as_str) != Some(BASE_TYPE) {
            chain.push(BASE_TYPE.to_string());
        }
        chains.insert(name.clone(), chain);
    }
    Ok(chains)
}

/// Merge the raw type with its ancestors (child fields override; lists
/// replaced, not concatenated) and extract its inline scripts.
fn resolve_entity_type(
    fs: &ContentFs,
    slug: &str,
    raw: &RawGameDef,
    name: &str,
    base_chain: &[String],
    bag: &mut ScriptBag,
) -> Result<EntityTypeDef, LoadError> {
    // Walk root-most ancestor first so children override.
    let mut merged = RawEntityType {
        extends: None,
        width: None,
        height: None,
        color: None,
        sprite: None,
        max_hits: None,
        tags: None,
        properties: None,
        behaviors: None,
        interactions: None,
        render: None,
        on_destroy: None,
        on_parent_destroy: None,
        on_update: None,
    };
    let lineage: Vec<&str> = base_chain
        .iter()
        .rev()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .collect();
    for ancestor in lineage {
        let Some(t) = raw.entity_types.get(ancestor) else {
            continue; // the implicit root
        };
        merged.width = t.width.or(merged.width);
        merged.height = t.height.or(merged.height);
        merged.color = t.color.clone().or(merged.color);
        merged.sprite = t.sprite.clone().or(merged.sprite);
        merged.max_hits = t.max_hits.or(merged.max_hits);
        merged.tags = t.tags.clone().or(merged.tags);
        merged.behaviors = t.behaviors.clone().or(merged.behaviors);
        merged.interactions = t.interactions.clone().or(merged.interactions);
        merged.render = t.render.clone().or(merged.render);
        merged.on_destroy = t.on_destroy.clone().or(merged.on_destroy);
        merged.on_parent_destroy = t.on_parent_destroy.clone().or(merged.on_parent_destroy);
        merged.on_update = t.on_update.clone().or(merged.on_update);
        // Properties merge key-by-key: children override individual keys.
        merged.properties = match (merged.properties.take(), t.properties.clone()) {
            (None, p) => p,
            (p, None) => p,
            (Some(base), Some(child)) => Some(merge_mappings(base, child)),
        };
    }

    let context = format!("entity_types.{name}");

    let mut behaviors = Vec::new();
    for entry in merged.behaviors.iter().flatten() {
        match entry {
            RawBehaviorEntry::Name(behavior) => behaviors.push((behavior.clone(), PropMap::default())),
            RawBehaviorEntry::Configured { name: behavior, config } => {
                let config = config
                    .as_ref()
                    .map(|v| prop_map_from_value(v, &format!("{context}.behaviors.{behavior}.config")))
                    .transpose()?
                    .unwrap_or_default();
                behaviors.push((behavior.clone(), config));
            }
        }
    }

    let mut interactions = Vec::new();
    for (i, raw_inter) in merged.interactions.iter().flatten().enumerate() {
        let inter_ctx = format!("{context}.interactions[{i}]");
        let filter = match &raw_inter.when {
            None => FilterDef::default(),
            Some(when) => parse_filter(when, &format!("{inter_ctx}.when"))?,
        };
        let trigger = match raw_inter.because.as_deref() {
            None | Some("enter") => TriggerMode::Enter,
            Some("exit") => TriggerMode::Exit,
            Some("continuous") => TriggerMode::Continuous,
            Some(other) => {
                return Err(LoadError::schema(
                    format!("{inter_ctx}.because"),
                    format!("unknown trigger mode '{other}'"),
                ));
            }
        };
        let action = action_name(
            fs,
            slug,
            &raw_inter.action,
            &format!("{inter_ctx}.action"),
            ScriptNamespace::InteractionAction,
            bag,
        )?;
        let modifier = raw_inter
            .modifier
            .as_ref()
            .map(|v| prop_map_from_value(v, &format!("{inter_ctx}.modifier")))
            .transpose()?
            .unwrap_or_default();
        interactions.push(InteractionDef {
            target: raw_inter.target.clone(),
            filter,
            trigger,
            action,
            modifier,
        });
    }

    let mut render = Vec::new();
    for (i, cmd) in merged.render.iter().flatten().enumerate() {
        render.push(parse_render_cmd(cmd, &format!("{context}.render[{i}]"), bag)?);
    }

    let on_destroy = merged
        .on_destroy
        .as_ref()
        .map(|t| parse_transform(t, &format!("{context}.on_destroy"), bag))
        .transpose()?;
    let on_parent_destroy = merged
        .on_parent_destroy
        .as_ref()
        .map(|t| parse_transform(t, &format!("{context}.on_parent_destroy"), bag))
        .transpose()?;

    let mut on_update = Vec::new();
    for (i, raw_up) in merged.on_update.iter().flatten().enumerate() {
        let up_ctx = format!("{context}.on_update[{i}]");
        on_update.push(OnUpdateTransformDef {
            age_min: raw_up.age_min,
            age_max: raw_up.age_max,
            property: raw_up.property.clone(),
            value: raw_up.value.as_ref().map(PropValue::from_yaml),
            interval: raw_up.interval,
            transform: parse_transform(&raw_up.transform, &format!("{up_ctx}.transform"), bag)?,
        });
    }

    let properties = merged
        .properties
        .as_ref()
        .map(|v| prop_map_from_value(v, &format!("{context}.properties")))
        .transpose()?
        .unwrap_or_default();

    Ok(EntityTypeDef {
        name: name.to_string(),
        base_chain: base_chain.to_vec(),
        width: merged.width.unwrap_or(16.0),
        height: merged.height.unwrap_or(16.0),
        color: merged.color,
        sprite: merged.sprite,
        max_hits: merged.max_hits.unwrap_or(1),
        properties,
        tags: merged.tags.unwrap_or_default(),
        behaviors,
        interactions,
        render,
        on_destroy,
        on_parent_destroy,
        on_update,
    })
}

/// Key-by-key mapping merge used for inherited `properties:` blocks.
fn merge_mappings(base: Value, child: Value) -> Value {
    match (base, child) {
        (Value::Mapping(mut base_map), Value::Mapping(child_map)) => {
            for (k, v) in child_map {
                base_map.insert(k, v);
            }
            Value::Mapping(base_map)
        }
        (_, child) => child,
    }
}

/// Convert a freeform mapping value into a [`PropMap`].
fn prop_map_from_value(value: &Value, path: &str) -> Result<PropMap, LoadError> {
    match PropValue::from_yaml(value) {
        PropValue::Map(map) => Ok(map),
        other => Err(LoadError::schema(
            path,
            format!("expected a mapping, found {}", other.type_name()),
        )),
    }
}

/// Resolve a script reference appearing where an action is expected:
/// a name (must already exist or resolve to a file), or an inline node.
fn action_name(
    fs: &ContentFs,
    slug: &str,
    reference: &RawScriptRef,
    context: &str,
    namespace: ScriptNamespace,
    bag: &mut ScriptBag,
) -> Result<String, LoadError> {
    match reference {
        RawScriptRef::Name(name) => {
            if !bag.scripts.contains_key(name) {
                // Late file-backed resolution: shared script directories.
                if let Some((source, origin)) = find_script_file(fs, slug, namespace, name) {
                    bag.insert(name.clone(), namespace, source, origin)?;
                }
            }
            Ok(name.clone())
        }
        RawScriptRef::Inline { lua } => bag.extract_inline(context, namespace, lua.clone()),
        RawScriptRef::File { file } => {
            let (source, origin) = read_script_file(fs, slug, file, context)?;
            let name = format!("file_{}", file.replace(['/', '.'], "_"));
            if !bag.scripts.contains_key(&name) {
                bag.insert(name.clone(), namespace, source, origin)?;
            }
            Ok(name)
        }
    }
}

/// Resolve `{lua: ...}` / `{file: ...}` / name sources for the named
/// script tables.
fn resolve_source(
    fs: &ContentFs,
    slug: &str,
    reference: &RawScriptRef,
    context: &str,
) -> Result<(String, String), LoadError> {
    match reference {
        RawScriptRef::Inline { lua } => Ok((lua.clone(), context.to_string())),
        RawScriptRef::File { file } => read_script_file(fs, slug, file, context),
        RawScriptRef::Name(name) => Err(LoadError::schema(
            context,
            format!("expected {{lua: ...}} or {{file: ...}}, found plain name '{name}'"),
        )),
    }
}

/// Read a script file, trying the game directory first, then the shared
/// content roots.
fn read_script_file(
    fs: &ContentFs,
    slug: &str,
    file: &str,
    context: &str,
) -> Result<(String, String), LoadError> {
    let local = format!("games/{slug}/{file}");
    for vpath in [local.as_str(), file] {
        if fs.exists(vpath) {
            let source = fs.read_text(vpath).map_err(|e| {
                LoadError::new(LoadErrorKind::Parse, vpath, format!("cannot read: {e}"))
            })?;
            return Ok((source, vpath.to_string()));
        }
    }
    Err(LoadError::missing(
        context,
        format!("script file '{file}' not found in any layer"),
    ))
}

/// Look up a bare-name script in the conventional directories:
/// `games/<slug>/lua/<kind>/<name>.lua`, then `lua/<kind>/<name>.lua`.
fn find_script_file(
    fs: &ContentFs,
    slug: &str,
    namespace: ScriptNamespace,
    name: &str,
) -> Option<(String, String)> {
    let kind = match namespace {
        ScriptNamespace::Behavior => "behaviors",
        ScriptNamespace::Generator => "generators",
        _ => "actions",
    };
    let candidates = [
        format!("games/{slug}/lua/{kind}/{name}.lua"),
        format!("lua/{kind}/{name}.lua"),
    ];
    for vpath in candidates {
        if fs.exists(&vpath) {
            if let Ok(source) = fs.read_text(&vpath) {
                return Some((source, vpath));
            }
        }
    }
    None
}

fn resolve_win(
    fs: &ContentFs,
    slug: &str,
    raw_win: &RawWinCondition,
    bag: &mut ScriptBag,
) -> Result<WinCondition, LoadError> {
    match (&raw_win.destroy_all, raw_win.reach_score, &raw_win.script) {
        (Some(target), None, None) => Ok(WinCondition::DestroyAll {
            target: target.clone(),
        }),
        (None, Some(target), None) => Ok(WinCondition::ReachScore { target }),
        (None, None, Some(reference)) => {
            let name = action_name(
                fs,
                slug,
                reference,
                "win_condition.script",
                ScriptNamespace::Expression,
                bag,
            )?;
            Ok(WinCondition::Script(name))
        }
        _ => Err(LoadError::schema(
            "win_condition",
            "exactly one of destroy_all, reach_score, or script is required",
        )),
    }
}

fn resolve_lose(raw_lose: &RawLoseCondition, path: &str) -> Result<LoseConditionDef, LoadError> {
    let event = match raw_lose.event.as_str() {
        "exited_screen" => {
            let edge = match &raw_lose.edge {
                None => ScreenEdge::Any,
                Some(edge) => ScreenEdge::parse(edge).ok_or_else(|| {
                    LoadError::schema(format!("{path}.edge"), format!("unknown edge '{edge}'"))
                })?,
            };
            LoseEvent::ExitedScreen { edge }
        }
        "property_true" => {
            let property = raw_lose.property.clone().ok_or_else(|| {
                LoadError::schema(format!("{path}.property"), "property_true requires 'property'")
            })?;
            LoseEvent::PropertyTrue { property }
        }
        "destroyed" => LoseEvent::Destroyed,
        other => {
            return Err(LoadError::schema(
                format!("{path}.event"),
                format!("unknown lose event '{other}'"),
            ));
        }
    };
    let action = match raw_lose.action.as_deref() {
        None | Some("none") => LoseAction::None,
        Some("lose_life") => LoseAction::LoseLife,
        Some("end_game") => LoseAction::EndGame,
        Some(other) => {
            return Err(LoadError::schema(
                format!("{path}.action"),
                format!("unknown lose action '{other}'"),
            ));
        }
    };
    let then = match &raw_lose.then {
        None => ThenDef::default(),
        Some(raw_then) => ThenDef {
            destroy_type: raw_then.destroy.clone(),
            morph: raw_then
                .morph
                .as_ref()
                .map(|m| (m.from.clone(), m.to.clone())),
            clear_property: raw_then.clear_property.clone(),
        },
    };
    Ok(LoseConditionDef {
        entity_type: raw_lose.entity_type.clone(),
        event,
        action,
        then,
    })
}

fn resolve_assets(raw: &RawAssets) -> AssetsDef {
    let mut assets = AssetsDef::default();
    for (name, sheet) in &raw.sheets {
        assets.sheets.insert(
            name.clone(),
            SpriteSheetDef {
                image: sheet.image.clone(),
                regions: sheet
                    .regions
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            },
        );
    }
    for (name, alias) in &raw.aliases {
        assets.aliases.insert(
            name.clone(),
            SpriteAliasDef {
                target: alias.target.clone(),
                flip_x: alias.flip_x.unwrap_or(false),
                flip_y: alias.flip_y.unwrap_or(false),
            },
        );
    }
    for (name, file) in &raw.sounds {
        assets.sounds.insert(name.clone(), file.clone());
    }
    assets
}

fn resolve_layout(raw: &RawLayout, path: &str) -> Result<LayoutDef, LoadError> {
    let mut key = FxHashMap::default();
    for (glyph, cell) in &raw.key {
        let mut chars = glyph.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(LoadError::schema(
                format!("{path}.key.{glyph}"),
                "layout key glyphs must be single characters",
            ));
        };
        let properties = cell
            .properties
            .as_ref()
            .map(|v| prop_map_from_value(v, &format!("{path}.key.{glyph}.properties")))
            .transpose()?
            .unwrap_or_default();
        key.insert(
            c,
            LayoutCellDef {
                type_name: cell.type_name.clone(),
                properties,
            },
        );
    }
    let (cell_width, cell_height) = raw.cell_size.unwrap_or((16.0, 16.0));
    Ok(LayoutDef {
        rows: raw.rows.clone(),
        key,
        cell_width,
        cell_height,
        origin: raw.origin.unwrap_or((0.0, 0.0)),
    })
}

/// Parse a `when:` block into a [`FilterDef`].
fn parse_filter(when: &Value, path: &str) -> Result<FilterDef, LoadError> {
    let Value::Mapping(map) = when else {
        return Err(LoadError::schema(path, "when: must be a mapping"));
    };
    let mut filter = FilterDef::default();
    for (k, v) in map {
        let Some(key) = k.as_str() else {
            return Err(LoadError::schema(path, "when: keys must be strings"));
        };
        let key_path = format!("{path}.{key}");
        match key {
            "distance" => filter.distance = Some(parse_comparison(v, &key_path, true)?),
            "from" => filter.distance_from = parse_measure_mode(v, &key_path)?,
            "to" => filter.distance_to = parse_measure_mode(v, &key_path)?,
            "angle" => {
                let Value::Mapping(angle_map) = v else {
                    return Err(LoadError::schema(&key_path, "angle must be {between: [lo, hi]}"));
                };
                let between = angle_map
                    .get(&Value::String("between".into()))
                    .and_then(|b| b.as_sequence())
                    .filter(|s| s.len() == 2);
                let Some(pair) = between else {
                    return Err(LoadError::schema(&key_path, "angle must be {between: [lo, hi]}"));
                };
                let lo = pair[0].as_f64().unwrap_or(0.0);
                let hi = pair[1].as_f64().unwrap_or(0.0);
                filter.angle_between = Some((lo, hi));
            }
            "edges" => {
                let Some(seq) = v.as_sequence() else {
                    return Err(LoadError::schema(&key_path, "edges must be a sequence"));
                };
                for edge in seq {
                    let Some(edge_name) = edge.as_str() else {
                        return Err(LoadError::schema(&key_path, "edge names must be strings"));
                    };
                    let Some(edge) = ScreenEdge::parse(edge_name) else {
                        return Err(LoadError::schema(
                            &key_path,
                            format!("unknown edge '{edge_name}'"),
                        ));
                    };
                    filter.edges.push(edge);
                }
            }
            "margin" => filter.margin = v.as_f64().unwrap_or(0.0) as f32,
            _ => {
                if let Some(prop) = key.strip_prefix("a.") {
                    filter.props_a.push(PropPredicate {
                        key: prop.to_string(),
                        cmp: parse_comparison(v, &key_path, false)?,
                    });
                } else if let Some(prop) = key.strip_prefix("b.") {
                    filter.props_b.push(PropPredicate {
                        key: prop.to_string(),
                        cmp: parse_comparison(v, &key_path, false)?,
                    });
                } else {
                    return Err(LoadError::schema(
                        &key_path,
                        format!("unknown filter key '{key}'"),
                    ));
                }
            }
        }
    }
    Ok(filter)
}

/// Parse a predicate operand: bare scalar (implicit `eq`, or `lte` for
/// distances) or an operator mapping.
fn parse_comparison(v: &Value, path: &str, distance: bool) -> Result<Comparison, LoadError> {
    match v {
        Value::Mapping(map) => {
            let mut found = None;
            for (op_key, operand) in map {
                let Some(op) = op_key.as_str() else {
                    return Err(LoadError::schema(path, "operator keys must be strings"));
                };
                let cmp = match op {
                    "eq" => Comparison::Eq(PropValue::from_yaml(operand)),
                    "lt" => Comparison::Lt(operand.as_f64().unwrap_or(0.0)),
                    "gt" => Comparison::Gt(operand.as_f64().unwrap_or(0.0)),
                    "lte" => Comparison::Lte(operand.as_f64().unwrap_or(0.0)),
                    "gte" => Comparison::Gte(operand.as_f64().unwrap_or(0.0)),
                    "between" => {
                        let Some(pair) = operand.as_sequence().filter(|s| s.len() == 2) else {
                            return Err(LoadError::schema(path, "between requires [lo, hi]"));
                        };
                        Comparison::Between(
                            pair[0].as_f64().unwrap_or(0.0),
                            pair[1].as_f64().unwrap_or(0.0),
                        )
                    }
                    "in" => {
                        let Some(seq) = operand.as_sequence() else {
                            return Err(LoadError::schema(path, "in requires a sequence"));
                        };
                        Comparison::In(seq.iter().map(PropValue::from_yaml).collect())
                    }
                    other => {
                        return Err(LoadError::schema(
                            path,
                            format!("unknown operator '{other}'"),
                        ));
                    }
                };
                if found.is_some() {
                    return Err(LoadError::schema(path, "one operator per predicate"));
                }
                found = Some(cmp);
            }
            found.ok_or_else(|| LoadError::schema(path, "empty operator mapping"))
        }
        scalar => {
            let value = PropValue::from_yaml(scalar);
            if distance {
                // A bare distance means "within": separation <= n.
                let n = value.as_number().ok_or_else(|| {
                    LoadError::schema(path, "distance must be a number or operator mapping")
                })?;
                Ok(Comparison::Lte(n))
            } else {
                Ok(Comparison::Eq(value))
            }
        }
    }
}

fn parse_measure_mode(v: &Value, path: &str) -> Result<MeasureMode, LoadError> {
    match v.as_str() {
        Some("edge") => Ok(MeasureMode::Edge),
        Some("center") => Ok(MeasureMode::Center),
        _ => Err(LoadError::schema(path, "measure mode must be 'edge' or 'center'")),
    }
}

fn parse_transform(
    raw: &RawTransform,
    path: &str,
    bag: &mut ScriptBag,
) -> Result<TransformDef, LoadError> {
    let mut children = Vec::new();
    for (i, child) in raw.children.iter().flatten().enumerate() {
        let child_path = format!("{path}.children[{i}]");
        let offset = match &child.offset {
            None => OffsetSpec::Literal(0.0, 0.0),
            Some(Value::Sequence(seq)) if seq.len() == 2 => OffsetSpec::Literal(
                seq[0].as_f64().unwrap_or(0.0) as f32,
                seq[1].as_f64().unwrap_or(0.0) as f32,
            ),
            Some(Value::Mapping(map)) => {
                let lua = map
                    .get(&Value::String("lua".into()))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        LoadError::schema(
                            format!("{child_path}.offset"),
                            "offset must be [dx, dy] or {lua: ...}",
                        )
                    })?;
                let name = bag.extract_inline(
                    &format!("{child_path}.offset"),
                    ScriptNamespace::Generator,
                    lua.to_string(),
                )?;
                OffsetSpec::Script(name)
            }
            Some(_) => {
                return Err(LoadError::schema(
                    format!("{child_path}.offset"),
                    "offset must be [dx, dy] or {lua: ...}",
                ));
            }
        };
        let mut properties = FxHashMap::default();
        for (prop_key, prop_value) in child.properties.iter().flatten() {
            let spec = match prop_value {
                Value::String(s) if s.starts_with('$') => {
                    ChildPropSpec::ParentRef(s[1..].to_string())
                }
                Value::Mapping(map) if map.contains_key(&Value::String("lua".into())) => {
                    let lua = map
                        .get(&Value::String("lua".into()))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let name = bag.extract_inline(
                        &format!("{child_path}.properties.{prop_key}"),
                        ScriptNamespace::Generator,
                        lua.to_string(),
                    )?;
                    ChildPropSpec::Script(name)
                }
                other => ChildPropSpec::Literal(PropValue::from_yaml(other)),
            };
            properties.insert(prop_key.clone(), spec);
        }
        children.push(ChildSpawnDef {
            type_name: child.type_name.clone(),
            count: child.count.unwrap_or(1).max(1),
            offset,
            inherit_velocity: child.inherit_velocity.unwrap_or(0.0),
            lifetime: child.lifetime,
            properties,
        });
    }
    Ok(TransformDef {
        destroy: raw.destroy.unwrap_or(false),
        change_type: raw.change_type.clone(),
        keep_properties: raw.properties.as_deref() != Some("replace"),
        children,
    })
}

fn parse_render_cmd(
    raw: &RawRenderCmd,
    path: &str,
    bag: &mut ScriptBag,
) -> Result<RenderCmdDef, LoadError> {
    let shape = match raw.shape.as_str() {
        "rectangle" => RenderShape::Rectangle,
        "circle" => RenderShape::Circle,
        "triangle" => RenderShape::Triangle,
        "line" => RenderShape::Line,
        "polygon" => RenderShape::Polygon {
            points: raw.points.clone().unwrap_or_default(),
        },
        "sprite" => RenderShape::Sprite {
            name: raw.sprite.clone().ok_or_else(|| {
                LoadError::schema(format!("{path}.sprite"), "sprite command requires 'sprite'")
            })?,
        },
        "text" => RenderShape::Text {
            text: raw.text.clone().ok_or_else(|| {
                LoadError::schema(format!("{path}.text"), "text command requires 'text'")
            })?,
            font_size: raw.font_size.unwrap_or(12.0),
        },
        "stop" => RenderShape::Stop,
        other => {
            return Err(LoadError::schema(
                format!("{path}.shape"),
                format!("unknown shape '{other}'"),
            ));
        }
    };
    let color = match &raw.color {
        None => None,
        Some(Value::String(s)) if s.starts_with('$') => {
            Some(ColorRef::Property(s[1..].to_string()))
        }
        Some(Value::String(s)) => Some(ColorRef::Palette(s.clone())),
        Some(Value::Sequence(seq)) if seq.len() == 3 => Some(ColorRef::Literal(
            seq[0].as_u64().unwrap_or(0) as u8,
            seq[1].as_u64().unwrap_or(0) as u8,
            seq[2].as_u64().unwrap_or(0) as u8,
        )),
        Some(_) => {
            return Err(LoadError::schema(
                format!("{path}.color"),
                "color must be a name, $prop, or [r, g, b]",
            ));
        }
    };
    let when = match &raw.when {
        None => None,
        Some(Value::String(prop)) => Some(RenderWhen::Property {
            key: prop.clone(),
            value: PropValue::Nil,
        }),
        Some(Value::Mapping(map)) => {
            if let Some(lua) = map
                .get(&Value::String("lua".into()))
                .and_then(|v| v.as_str())
            {
                let name = bag.extract_inline(
                    &format!("{path}.when"),
                    ScriptNamespace::Expression,
                    lua.to_string(),
                )?;
                Some(RenderWhen::Script(name))
            } else {
                let key = map
                    .get(&Value::String("property".into()))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        LoadError::schema(
                            format!("{path}.when"),
                            "when must name a property or be {lua: ...}",
                        )
                    })?;
                let value = map
                    .get(&Value::String("value".into()))
                    .map(PropValue::from_yaml)
                    .unwrap_or(PropValue::Nil);
                Some(RenderWhen::Property {
                    key: key.to_string(),
                    value,
                })
            }
        }
        Some(_) => {
            return Err(LoadError::schema(
                format!("{path}.when"),
                "when must name a property or be {lua: ...}",
            ));
        }
    };
    Ok(RenderCmdDef {
        shape,
        offset: raw.offset.unwrap_or((0.0, 0.0)),
        size: raw.size,
        color,
        alpha: raw.alpha.unwrap_or(255),
        fill: raw.fill.unwrap_or(true),
        line_width: raw.line_width.unwrap_or(1.0),
        when,
    })
}

/// Stage 6b: required entry points per namespace.
fn check_entry_points(def: &GameDef, runtime: &ScriptRuntime) -> Result<(), LoadError> {
    for script in def.scripts.values() {
        let required = match script.namespace {
            ScriptNamespace::Behavior => None,
            ScriptNamespace::InteractionAction
            | ScriptNamespace::CollisionAction
            | ScriptNamespace::InputAction => Some("execute"),
            ScriptNamespace::Generator => Some("generate"),
            ScriptNamespace::Expression => Some("evaluate"),
        };
        if let Some(entry) = required {
            if !runtime.exports(&script.name, entry) {
                return Err(LoadError::new(
                    LoadErrorKind::ScriptCompile,
                    &script.origin,
                    format!(
                        "{} '{}' does not export required entry point '{entry}'",
                        script.namespace.as_str(),
                        script.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Stage 7: every name referenced anywhere must resolve. Unused
/// definitions are allowed.
fn check_references(def: &GameDef) -> Result<(), LoadError> {
    let known_tags: FxHashSet<&str> = def
        .entity_types
        .values()
        .flat_map(|t| t.tags.iter().map(String::as_str))
        .collect();

    let type_or_tag_exists = |target: &str| {
        def.entity_types.contains_key(target)
            || target == BASE_TYPE
            || known_tags.contains(target)
            || PSEUDO_ENTITIES.contains(&target)
    };

    let color_known = |name: &str| {
        def.palette.contains_key(name) || BUILTIN_COLORS.contains(&name)
    };

    for (type_name, entity_type) in &def.entity_types {
        let context = format!("entity_types.{type_name}");
        for (behavior, _) in &entity_type.behaviors {
            if !def.scripts.contains_key(behavior) {
                return Err(LoadError::missing(
                    format!("{context}.behaviors"),
                    format!("unknown behavior '{behavior}'"),
                ));
            }
        }
        for (i, interaction) in entity_type.interactions.iter().enumerate() {
            if !type_or_tag_exists(&interaction.target) {
                return Err(LoadError::missing(
                    format!("{context}.interactions[{i}].target"),
                    format!("unknown interaction target '{}'", interaction.target),
                ));
            }
            if !def.scripts.contains_key(&interaction.action) {
                return Err(LoadError::missing(
                    format!("{context}.interactions[{i}].action"),
                    format!("unknown action '{}'", interaction.action),
                ));
            }
        }
        if let Some(color) = &entity_type.color {
            if !color_known(color) {
                return Err(LoadError::missing(
                    format!("{context}.color"),
                    format!("unknown color '{color}'"),
                ));
            }
        }
        if let Some(sprite) = &entity_type.sprite {
            if !def.assets.sprite_known(sprite) {
                return Err(LoadError::missing(
                    format!("{context}.sprite"),
                    format!("unknown sprite '{sprite}'"),
                ));
            }
        }
        for (i, cmd) in entity_type.render.iter().enumerate() {
            if let Some(ColorRef::Palette(name)) = &cmd.color {
                if !color_known(name) {
                    return Err(LoadError::missing(
                        format!("{context}.render[{i}].color"),
                        format!("unknown color '{name}'"),
                    ));
                }
            }
            if let RenderShape::Sprite { name } = &cmd.shape {
                if !def.assets.sprite_known(name) {
                    return Err(LoadError::missing(
                        format!("{context}.render[{i}].sprite"),
                        format!("unknown sprite '{name}'"),
                    ));
                }
            }
        }
        let transforms = entity_type
            .on_destroy
            .iter()
            .chain(entity_type.on_parent_destroy.iter())
            .chain(entity_type.on_update.iter().map(|u| &u.transform));
        for transform in transforms {
            if let Some(target) = &transform.change_type {
                if !def.entity_types.contains_key(target) {
                    return Err(LoadError::missing(
                        format!("{context}"),
                        format!("morph target type '{target}' does not exist"),
                    ));
                }
            }
            for child in &transform.children {
                if !def.entity_types.contains_key(&child.type_name) {
                    return Err(LoadError::missing(
                        format!("{context}"),
                        format!("child spawn type '{}' does not exist", child.type_name),
                    ));
                }
            }
        }
    }

    if let Some(WinCondition::DestroyAll { target }) = &def.win_condition {
        if !type_or_tag_exists(target) {
            return Err(LoadError::missing(
                "win_condition.destroy_all",
                format!("unknown target '{target}'"),
            ));
        }
    }
    for (i, lose) in def.lose_conditions.iter().enumerate() {
        if !type_or_tag_exists(&lose.entity_type) {
            return Err(LoadError::missing(
                format!("lose_conditions[{i}].entity_type"),
                format!("unknown entity type '{}'", lose.entity_type),
            ));
        }
        if let Some(target) = &lose.then.destroy_type {
            if !type_or_tag_exists(target) {
                return Err(LoadError::missing(
                    format!("lose_conditions[{i}].then.destroy"),
                    format!("unknown type '{target}'"),
                ));
            }
        }
    }
    if let Some(layout) = &def.layout {
        for (glyph, cell) in &layout.key {
            if !def.entity_types.contains_key(&cell.type_name) {
                return Err(LoadError::missing(
                    format!("layout.key.{glyph}"),
                    format!("unknown entity type '{}'", cell.type_name),
                ));
            }
        }
    }
    Ok(())
}
