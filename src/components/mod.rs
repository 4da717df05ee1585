//! ECS components for the AMS engine.
//!
//! Every gameplay entity is a bevy_ecs entity carrying the components in
//! this module. Scripts and the interaction engine never see `Entity`
//! values; they address entities by the opaque string ID stored in
//! [`ident::Ident`].

pub mod behaviors;
pub mod boxsize;
pub mod health;
pub mod hierarchy;
pub mod ident;
pub mod interactionstate;
pub mod kind;
pub mod lifetime;
pub mod pending;
pub mod position;
pub mod props;
pub mod velocity;
pub mod visual;
