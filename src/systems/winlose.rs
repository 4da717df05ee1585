//! Win/lose condition evaluation.
//!
//! Lose conditions are declarative triggers checked before the sweep so
//! `destroyed` sees destroy-pending entities; the win condition is
//! checked after the sweep so `destroy_all` sees the final population.

use crate::components::boxsize::BoxSize;
use crate::components::ident::Ident;
use crate::components::interactionstate::InteractionMemory;
use crate::components::kind::Kind;
use crate::components::pending::DestroyPending;
use crate::components::position::Position;
use crate::components::props::{PropValue, Props};
use crate::definition::{GameDef, LoseAction, LoseEvent, ScreenEdge, WinCondition};
use crate::resources::entityindex::EntityIndex;
use crate::resources::gamestate::{GameStatus, PlayState};
use crate::resources::queues::DestroyQueue;
use crate::resources::screen::Screen;
use crate::script::runtime::ScriptRuntime;
use crate::systems::transforms::morph_entity;
use bevy_ecs::prelude::*;
use log::{info, warn};

/// Evaluate every lose condition in declared order. Fires once per
/// entity per condition (rising edge held in the entity's interaction
/// memory).
pub fn check_lose_conditions(world: &mut World, def: &GameDef) {
    let screen = *world.resource::<Screen>();

    for (index, lose) in def.lose_conditions.iter().enumerate() {
        // Candidates: entities whose type (or base/tag) matches.
        let mut matched: Vec<(u64, String, bool)> = Vec::new();
        {
            let mut query = world.query::<(
                &Ident,
                &Kind,
                &Position,
                &BoxSize,
                &Props,
                Option<&DestroyPending>,
            )>();
            for (ident, kind, position, size, props, pending) in query.iter(world) {
                if !kind.is_a(&lose.entity_type) {
                    continue;
                }
                let fires = match &lose.event {
                    LoseEvent::ExitedScreen { edge } => {
                        let rect = size.rect_at(position.pos);
                        let fully_out = !rect.overlaps(&screen.rect());
                        fully_out
                            && match edge {
                                ScreenEdge::Top => rect.bottom() < 0.0,
                                ScreenEdge::Bottom => rect.y > screen.h,
                                ScreenEdge::Left => rect.right() < 0.0,
                                ScreenEdge::Right => rect.x > screen.w,
                                ScreenEdge::Any => true,
                            }
                    }
                    LoseEvent::PropertyTrue { property } => props
                        .map
                        .get(property)
                        .map(PropValue::truthy)
                        .unwrap_or(false),
                    LoseEvent::Destroyed => pending.is_some(),
                };
                matched.push((ident.serial, ident.id.clone(), fires));
            }
        }
        matched.sort();

        for (_, id, fires) in matched {
            let Some(entity) = world.resource::<EntityIndex>().get(&id) else {
                continue;
            };
            let key = format!("lose:{index}:{id}");
            let previous = match world.get_mut::<InteractionMemory>(entity) {
                Some(mut memory) => memory.swap_edge(key, fires),
                None => false,
            };
            if fires && !previous {
                fire_lose(world, def, lose, index, &id);
            }
        }
    }
}

fn fire_lose(
    world: &mut World,
    def: &GameDef,
    lose: &crate::definition::LoseConditionDef,
    index: usize,
    entity_id: &str,
) {
    info!(
        "lose condition {index} fired for '{entity_id}' ({})",
        lose.entity_type
    );
    match lose.action {
        LoseAction::LoseLife => {
            let mut status = world.resource_mut::<GameStatus>();
            status.lives -= 1;
            if status.lives <= 0 && status.state == PlayState::Playing {
                status.state = PlayState::Lost;
            }
        }
        LoseAction::EndGame => {
            let mut status = world.resource_mut::<GameStatus>();
            if status.state == PlayState::Playing {
                status.state = PlayState::Lost;
            }
        }
        LoseAction::None => {}
    }

    // then: block, applied to the declared target sets.
    if let Some(target_type) = &lose.then.destroy_type {
        let ids = ids_of_type(world, target_type);
        let mut queue = world.resource_mut::<DestroyQueue>();
        for id in &ids {
            queue.push(id.clone());
        }
        for id in ids {
            if let Some(entity) = world.resource::<EntityIndex>().get(&id) {
                world.entity_mut(entity).insert(DestroyPending);
            }
        }
    }
    if let Some((from, to)) = lose.then.morph.clone() {
        for id in ids_of_type(world, &from) {
            morph_entity(world, def, &id, &to, true);
        }
    }
    if let Some(property) = &lose.then.clear_property {
        for id in ids_of_type(world, &lose.entity_type) {
            if let Some(entity) = world.resource::<EntityIndex>().get(&id) {
                if let Some(mut props) = world.get_mut::<Props>(entity) {
                    props.map.remove(property);
                }
            }
        }
    }
}

/// IDs of alive entities matching a type, base type, or tag, in spawn
/// order.
fn ids_of_type(world: &mut World, target: &str) -> Vec<String> {
    let mut ids: Vec<(u64, String)> = Vec::new();
    let mut query =
        world.query_filtered::<(&Ident, &Kind, &crate::components::kind::Tags), Without<DestroyPending>>();
    for (ident, kind, tags) in query.iter(world) {
        if kind.is_a(target) || tags.has(target) {
            ids.push((ident.serial, ident.id.clone()));
        }
    }
    ids.sort();
    ids.into_iter().map(|(_, id)| id).collect()
}

/// Evaluate the win condition, setting `Won` when it holds. The session
/// compares the state across the frame and surfaces a terminal
/// event on the transition.
pub fn check_win(world: &mut World, runtime: &ScriptRuntime, def: &GameDef) {
    if world.resource::<GameStatus>().state != PlayState::Playing {
        return;
    }
    let won = match &def.win_condition {
        None => false,
        Some(WinCondition::DestroyAll { target }) => ids_of_type(world, target).is_empty(),
        Some(WinCondition::ReachScore { target }) => {
            world.resource::<GameStatus>().score >= *target
        }
        Some(WinCondition::Script(script)) => match runtime.call(script, "evaluate", "", ()) {
            Ok(value) => !matches!(value, mlua::Value::Nil | mlua::Value::Boolean(false)),
            Err(e) => {
                warn!("{e}");
                false
            }
        },
    };
    if won {
        world.resource_mut::<GameStatus>().state = PlayState::Won;
        info!("win condition met");
    }
}
