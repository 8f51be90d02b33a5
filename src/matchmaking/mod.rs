//! Lobby: connection registry, wait queue, challenges and match lifecycle

pub mod queue;
pub mod registry;
pub mod service;

pub use service::MatchmakingService;
