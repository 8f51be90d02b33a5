//! External data stores

pub mod matches;
pub mod players;
pub mod supabase;

pub use matches::MatchStore;
pub use players::PlayerStore;
pub use supabase::SupabaseClient;
