//! Terminal game events surfaced to the host.

/// Emitted once when the game transitions into a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Won,
    Lost,
}
