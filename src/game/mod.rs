//! Game simulation modules

pub mod r#match;
pub mod physics;
pub mod snapshot;

pub use r#match::{
    GameMatch, MatchHandle, MatchOutcome, MatchRegistry, MatchSession, MatchStatus, SessionPlayer,
};

/// Direction of a paddle move input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDir {
    Left,
    Right,
}

/// Commands handed to a running match loop via its channel
#[derive(Debug, Clone)]
pub enum MatchCommand {
    /// Paddle input naming the acting player
    Move { username: String, dir: MoveDir },
    /// Stop the loop at the next tick boundary
    Cancel,
}
