//! Player records and presence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Player record as stored in the players table
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerMeta {
    pub id: Uuid,
    pub username: String,
    pub league: Option<String>,
    pub status: Option<String>,
}

/// Presence state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
    InGame,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Presence::Online => "ONLINE",
            Presence::Offline => "OFFLINE",
            Presence::InGame => "INGAME",
        }
    }
}

/// Presence update payload
#[derive(Debug, Clone, Serialize)]
struct PresenceUpdate {
    status: &'static str,
}

/// Player store operations
#[derive(Clone)]
pub struct PlayerStore {
    client: SupabaseClient,
}

impl PlayerStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Look up a player by username
    pub async fn resolve_player(
        &self,
        username: &str,
    ) -> Result<Option<PlayerMeta>, SupabaseError> {
        let query = format!("username=eq.{}", username);
        self.client.get_one("players", &query).await
    }

    /// Update a player's presence status
    pub async fn set_presence(
        &self,
        username: &str,
        presence: Presence,
    ) -> Result<(), SupabaseError> {
        let query = format!("username=eq.{}", username);
        let update = PresenceUpdate {
            status: presence.as_str(),
        };
        self.client.update("players", &query, &update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_maps_to_store_values() {
        assert_eq!(Presence::Online.as_str(), "ONLINE");
        assert_eq!(Presence::Offline.as_str(), "OFFLINE");
        assert_eq!(Presence::InGame.as_str(), "INGAME");
    }
}
