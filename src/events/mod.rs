//! Event types crossing the session boundary.

pub mod planehit;
pub mod terminal;
