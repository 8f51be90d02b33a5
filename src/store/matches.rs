//! Match history persistence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Completed match row
#[derive(Debug, Clone, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub player1: String,
    pub player2: String,
    pub ranked: bool,
    pub player1_score: i16,
    pub player2_score: i16,
    pub played_at: chrono::DateTime<chrono::Utc>,
}

/// New match result for insertion
#[derive(Debug, Clone, Serialize)]
struct NewMatchRecord {
    id: Uuid,
    player1: String,
    player2: String,
    ranked: bool,
    player1_score: i16,
    player2_score: i16,
    played_at: chrono::DateTime<chrono::Utc>,
}

/// Match store operations
#[derive(Clone)]
pub struct MatchStore {
    client: SupabaseClient,
}

impl MatchStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Record a completed match with final scores
    pub async fn record_match(
        &self,
        player1: &str,
        player2: &str,
        ranked: bool,
        player1_score: u8,
        player2_score: u8,
    ) -> Result<MatchRecord, SupabaseError> {
        let record = NewMatchRecord {
            id: Uuid::new_v4(),
            player1: player1.to_string(),
            player2: player2.to_string(),
            ranked,
            player1_score: player1_score as i16,
            player2_score: player2_score as i16,
            played_at: chrono::Utc::now(),
        };
        self.client.insert("matches", &record).await
    }
}
