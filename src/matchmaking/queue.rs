//! Matchmaking wait queue and challenge board

use std::collections::VecDeque;
use uuid::Uuid;

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub username: String,
    pub league: String,
    pub connection_id: Uuid,
}

/// The league-partitioned wait queue.
///
/// Entries live in one FIFO; pairing scans for the two earliest entries of
/// the requested league, so each league behaves as its own FIFO without a
/// cross-league fairness policy.
#[derive(Default)]
pub struct WaitQueue {
    queue: VecDeque<QueueEntry>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player. Returns false if the username is already queued.
    pub fn enqueue(&mut self, entry: QueueEntry) -> bool {
        if self.contains(&entry.username) {
            return false;
        }
        self.queue.push_back(entry);
        true
    }

    /// Remove a player's entry
    pub fn remove(&mut self, username: &str) -> Option<QueueEntry> {
        let pos = self.queue.iter().position(|e| e.username == username)?;
        self.queue.remove(pos)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.queue.iter().any(|e| e.username == username)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop the two earliest-queued entries of a league, atomically.
    /// Returns None if fewer than two are waiting in that league.
    pub fn try_pair(&mut self, league: &str) -> Option<(QueueEntry, QueueEntry)> {
        let mut positions = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, e)| e.league == league)
            .map(|(i, _)| i);

        let first = positions.next()?;
        let second = positions.next()?;

        // Remove the later index first so the earlier one stays valid
        let b = self.queue.remove(second)?;
        let a = self.queue.remove(first)?;
        Some((a, b))
    }
}

/// A pending direct challenge. The opponent slot is empty until the invited
/// player accepts with the same id.
#[derive(Debug, Clone)]
pub struct ChallengeEntry {
    pub id: String,
    pub challenger: String,
    pub opponent: Option<String>,
}

/// Open challenges, keyed by their shared id
#[derive(Default)]
pub struct ChallengeBoard {
    entries: Vec<ChallengeEntry>,
}

impl ChallengeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn contains_user(&self, username: &str) -> bool {
        self.entries.iter().any(|e| {
            e.challenger == username || e.opponent.as_deref() == Some(username)
        })
    }

    /// First leg: create the entry with an empty opponent slot.
    /// Returns false if the id is already taken.
    pub fn open(&mut self, id: &str, challenger: &str) -> bool {
        if self.contains_id(id) {
            return false;
        }
        self.entries.push(ChallengeEntry {
            id: id.to_string(),
            challenger: challenger.to_string(),
            opponent: None,
        });
        true
    }

    /// Second leg: fill the opponent slot and take the completed entry
    pub fn accept(&mut self, id: &str, opponent: &str) -> Option<ChallengeEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let mut entry = self.entries.remove(pos);
        entry.opponent = Some(opponent.to_string());
        Some(entry)
    }

    /// Drop every entry referencing a user (their disconnect ends the handshake)
    pub fn remove_for(&mut self, username: &str) {
        self.entries.retain(|e| {
            e.challenger != username && e.opponent.as_deref() != Some(username)
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
