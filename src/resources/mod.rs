//! ECS resources: engine-global state owned by the session's world.

pub mod drawlist;
pub mod entityindex;
pub mod gamestate;
pub mod limits;
pub mod pointer;
pub mod queues;
pub mod screen;
pub mod simtime;
pub mod snapshots;
