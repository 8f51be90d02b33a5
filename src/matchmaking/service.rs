//! Matchmaking service - lobby state machine and match lifecycle
//!
//! All lobby collections live behind one mutex with short critical
//! sections; store I/O and notifications happen outside the lock. World
//! state is owned by each match's own tick loop and never touched here.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::r#match::WIN_SCORE;
use crate::game::{
    GameMatch, MatchOutcome, MatchRegistry, MatchSession, MoveDir, SessionPlayer,
};
use crate::store::matches::MatchStore;
use crate::store::players::{PlayerStore, Presence};
use crate::ws::protocol::ServerMsg;
use crate::ws::ConnectionHandle;

use super::queue::{ChallengeBoard, QueueEntry, WaitQueue};
use super::registry::ConnectionRegistry;

/// Delay between pairing and match start, covering the client-side
/// transition animation
pub const PREGAME_DELAY: Duration = Duration::from_secs(5);

/// Mutable lobby state
struct Lobby {
    connections: ConnectionRegistry,
    queue: WaitQueue,
    challenges: ChallengeBoard,
    /// username -> match id, for both participants of every live session
    in_match: HashMap<String, Uuid>,
}

/// Matchmaking service
#[derive(Clone)]
pub struct MatchmakingService {
    lobby: Arc<Mutex<Lobby>>,
    registry: Arc<MatchRegistry>,
    players: PlayerStore,
    matches: MatchStore,
}

impl MatchmakingService {
    pub fn new(registry: Arc<MatchRegistry>, players: PlayerStore, matches: MatchStore) -> Self {
        Self {
            lobby: Arc::new(Mutex::new(Lobby {
                connections: ConnectionRegistry::new(),
                queue: WaitQueue::new(),
                challenges: ChallengeBoard::new(),
                in_match: HashMap::new(),
            })),
            registry,
            players,
            matches,
        }
    }

    /// Track a freshly opened connection (called on WebSocket upgrade)
    pub fn attach(&self, handle: ConnectionHandle) {
        self.lobby.lock().connections.attach(handle);
    }

    /// Bind a connection to a logical player
    pub async fn register(&self, connection_id: Uuid, username: &str) {
        {
            let mut lobby = self.lobby.lock();
            lobby.connections.register(username, connection_id);
        }
        info!(username = %username, connection_id = %connection_id, "Registered player connection");

        match self.players.resolve_player(username).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(username = %username, "No player record for registered username"),
            Err(e) => warn!(username = %username, error = %e, "Player lookup failed"),
        }
    }

    /// Join the league-partitioned wait queue. Unknown or busy users are
    /// ignored; a successful insert immediately scans the league for a pair.
    pub fn enqueue_for_match(&self, username: &str, league: &str) {
        let mut lobby = self.lobby.lock();

        let Some(conn) = lobby.connections.resolve(username) else {
            debug!(username = %username, "Matchmaking request from unknown user ignored");
            return;
        };
        if lobby.in_match.contains_key(username) || lobby.challenges.contains_user(username) {
            debug!(username = %username, "User busy, matchmaking request ignored");
            return;
        }
        if !lobby.queue.enqueue(QueueEntry {
            username: username.to_string(),
            league: league.to_string(),
            connection_id: conn.id,
        }) {
            debug!(username = %username, "Already queued");
            return;
        }
        info!(
            username = %username,
            league = %league,
            queue_size = lobby.queue.len(),
            "Player joined matchmaking queue"
        );

        let Some((first, second)) = lobby.queue.try_pair(league) else {
            return;
        };
        let (Some(conn1), Some(conn2)) = (
            lobby.connections.resolve(&first.username),
            lobby.connections.resolve(&second.username),
        ) else {
            // stale entries are removed by the disconnect path
            return;
        };

        let match_id = Uuid::new_v4();
        let game = self.start_match(
            &mut lobby,
            match_id,
            (first.username.clone(), conn1.clone()),
            (second.username.clone(), conn2.clone()),
        );
        drop(lobby);

        info!(
            match_id = %match_id,
            player1 = %first.username,
            player2 = %second.username,
            league = %league,
            "Matched players"
        );
        conn1.send(ServerMsg::MatchmakingFound {
            matchmaking: true,
            opponent: second.username.clone(),
        });
        conn2.send(ServerMsg::MatchmakingFound {
            matchmaking: true,
            opponent: first.username.clone(),
        });

        self.spawn_match(game);
    }

    /// Leave the wait queue; a no-op for users who are not queued
    pub fn cancel_matchmaking(&self, username: &str) {
        let mut lobby = self.lobby.lock();
        if lobby.queue.remove(username).is_some() {
            info!(username = %username, "Player left matchmaking queue");
        }
    }

    /// Two-phase direct challenge. The first call with an id opens the
    /// entry; a second call with the same id is the acceptance and promotes
    /// both legs into a match.
    pub fn challenge(&self, id: &str, challenger: &str, opponent: &str) {
        let mut lobby = self.lobby.lock();

        if !lobby.challenges.contains_id(id) {
            if lobby.connections.resolve(challenger).is_none() {
                debug!(challenge_id = %id, "Challenge from unknown user ignored");
                return;
            }
            if lobby.in_match.contains_key(challenger) || lobby.queue.contains(challenger) {
                debug!(username = %challenger, "User busy, challenge ignored");
                return;
            }
            if lobby.challenges.open(id, challenger) {
                info!(
                    challenge_id = %id,
                    challenger = %challenger,
                    opponent = %opponent,
                    "Challenge issued"
                );
            }
            return;
        }

        // Known id: this is the invited player's acceptance
        let Some(entry) = lobby.challenges.accept(id, opponent) else {
            return;
        };
        if entry.challenger == opponent {
            return;
        }
        let (Some(conn1), Some(conn2)) = (
            lobby.connections.resolve(&entry.challenger),
            lobby.connections.resolve(opponent),
        ) else {
            debug!(challenge_id = %id, "Challenge leg no longer connected, dropped");
            return;
        };
        if lobby.in_match.contains_key(&entry.challenger) || lobby.in_match.contains_key(opponent)
        {
            return;
        }
        // Accepting a challenge supersedes any queue membership
        lobby.queue.remove(&entry.challenger);
        lobby.queue.remove(opponent);

        let match_id = Uuid::new_v4();
        let game = self.start_match(
            &mut lobby,
            match_id,
            (entry.challenger.clone(), conn1.clone()),
            (opponent.to_string(), conn2.clone()),
        );
        drop(lobby);

        info!(challenge_id = %id, match_id = %match_id, "Challenge accepted");
        conn1.send(ServerMsg::MatchmakingFound {
            matchmaking: true,
            opponent: opponent.to_string(),
        });
        conn2.send(ServerMsg::MatchmakingFound {
            matchmaking: true,
            opponent: entry.challenger.clone(),
        });

        self.spawn_match(game);
    }

    /// Forward a paddle input to the sender's current match. Input from a
    /// connection that is not in a match is dropped.
    pub fn forward_move(&self, connection_id: Uuid, username: String, dir: MoveDir) {
        let handle = {
            let lobby = self.lobby.lock();
            let Some(me) = lobby.connections.username_of(connection_id) else {
                return;
            };
            let Some(match_id) = lobby.in_match.get(&me) else {
                return;
            };
            self.registry.get(match_id)
        };
        if let Some(handle) = handle {
            handle.send_move(username, dir);
        }
    }

    /// Full cleanup for a closing connection: queue, challenges, live match
    /// (forfeit), then the connection registry entry itself.
    pub async fn on_disconnect(&self, connection_id: Uuid) {
        let (username, opponent, offline) = {
            let mut lobby = self.lobby.lock();
            let Some(username) = lobby.connections.username_of(connection_id) else {
                lobby.connections.unregister(connection_id);
                return;
            };

            lobby.queue.remove(&username);
            lobby.challenges.remove_for(&username);

            let mut opponent = None;
            if let Some(match_id) = lobby.in_match.remove(&username) {
                if let Some(handle) = self.registry.get(&match_id) {
                    handle.cancel();
                }
                self.registry.remove(&match_id);

                let opponent_name = lobby
                    .in_match
                    .iter()
                    .find(|(_, id)| **id == match_id)
                    .map(|(name, _)| name.clone());
                if let Some(name) = opponent_name {
                    lobby.in_match.remove(&name);
                    opponent = lobby.connections.resolve(&name).map(|conn| (name, conn));
                }
                info!(
                    username = %username,
                    match_id = %match_id,
                    "Participant disconnected, match cancelled"
                );
            }

            // The connection entry goes last so concurrent lookups can still
            // find the disconnecting user during cleanup
            lobby.connections.unregister(connection_id);
            let offline = !lobby.connections.has_connection(&username);
            (username, opponent, offline)
        };

        if let Some((opponent_name, conn)) = opponent {
            conn.send(ServerMsg::OpponentDisconnect);
            conn.send(ServerMsg::GameStop {
                opponent: username.clone(),
            });
            debug!(username = %opponent_name, "Notified opponent of forfeit win");
        }

        let presence = if offline {
            Presence::Offline
        } else {
            Presence::Online
        };
        self.set_presence(&username, presence).await;
    }

    /// Instantiate a session and its engine, and register it so disconnect
    /// handling can find it by username. Caller holds the lobby lock.
    fn start_match(
        &self,
        lobby: &mut Lobby,
        match_id: Uuid,
        player1: (String, ConnectionHandle),
        player2: (String, ConnectionHandle),
    ) -> GameMatch {
        let (game, handle) = GameMatch::new(
            match_id,
            rand::random(),
            SessionPlayer::new(player1.0.clone(), player1.1),
            SessionPlayer::new(player2.0.clone(), player2.1),
        );
        lobby.in_match.insert(player1.0, match_id);
        lobby.in_match.insert(player2.0, match_id);
        self.registry.insert(handle);
        game
    }

    /// Run the match after the pre-game delay, then settle its outcome
    fn spawn_match(&self, game: GameMatch) {
        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PREGAME_DELAY).await;

            if !game.is_cancelled() {
                let (player1, player2) = game.usernames();
                service.set_presence(&player1, Presence::InGame).await;
                service.set_presence(&player2, Presence::InGame).await;
            }

            let outcome = game.run().await;
            service.on_match_complete(outcome).await;
        });
    }

    async fn on_match_complete(&self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Finished(session) => self.on_match_finished(session).await,
            MatchOutcome::Cancelled(session) => {
                self.release_session(&session);
                debug!(match_id = %session.id, "Cancelled match released");
                for username in [&session.player1.username, &session.player2.username] {
                    if self.is_connected(username) {
                        self.set_presence(username, Presence::Online).await;
                    }
                }
            }
        }
    }

    /// Persist the result, notify both players with their own perspective,
    /// then release the session.
    async fn on_match_finished(&self, session: MatchSession) {
        let player1 = &session.player1;
        let player2 = &session.player2;
        let winner = if player1.score >= WIN_SCORE {
            player1.username.clone()
        } else {
            player2.username.clone()
        };

        info!(
            match_id = %session.id,
            winner = %winner,
            score1 = player1.score,
            score2 = player2.score,
            "Match finished, recording result"
        );

        player1.conn.send(ServerMsg::Finished {
            winner: winner.clone(),
            player1: player1.username.clone(),
            player2: player2.username.clone(),
            player1_score: player1.score,
            player2_score: player2.score,
            i_win: player1.score >= WIN_SCORE,
        });
        player2.conn.send(ServerMsg::Finished {
            winner: winner.clone(),
            player1: player1.username.clone(),
            player2: player2.username.clone(),
            player1_score: player1.score,
            player2_score: player2.score,
            i_win: player2.score >= WIN_SCORE,
        });

        if let Err(e) = self
            .matches
            .record_match(
                &player1.username,
                &player2.username,
                true,
                player1.score,
                player2.score,
            )
            .await
        {
            warn!(match_id = %session.id, error = %e, "Failed to record match result");
        }

        self.release_session(&session);

        for username in [&player1.username, &player2.username] {
            if self.is_connected(username) {
                self.set_presence(username, Presence::Online).await;
            }
        }
    }

    /// Remove the session from the lobby and the match registry. Idempotent
    /// with the disconnect path.
    fn release_session(&self, session: &MatchSession) {
        {
            let mut lobby = self.lobby.lock();
            for username in [&session.player1.username, &session.player2.username] {
                if lobby.in_match.get(username) == Some(&session.id) {
                    lobby.in_match.remove(username);
                }
            }
        }
        self.registry.remove(&session.id);
    }

    fn is_connected(&self, username: &str) -> bool {
        self.lobby.lock().connections.has_connection(username)
    }

    async fn set_presence(&self, username: &str, presence: Presence) {
        if let Err(e) = self.players.set_presence(username, presence).await {
            warn!(username = %username, error = %e, "Failed to update presence");
        }
    }

    /// Current queue size (health endpoint)
    pub fn queue_size(&self) -> usize {
        self.lobby.lock().queue.len()
    }

    /// Number of registered player connections (health endpoint)
    pub fn connected_players(&self) -> usize {
        self.lobby.lock().connections.registered_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::supabase::SupabaseClient;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_service() -> Arc<MatchmakingService> {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            // unroutable store; every store call fails and is swallowed
            supabase_url: "http://127.0.0.1:9".to_string(),
            supabase_service_role_key: "test-key".to_string(),
            client_origin: "http://localhost:3000".to_string(),
        };
        let client = SupabaseClient::new(&config);
        Arc::new(MatchmakingService::new(
            Arc::new(MatchRegistry::new()),
            PlayerStore::new(client.clone()),
            MatchStore::new(client),
        ))
    }

    /// Attach and register a connection without touching the store
    fn connect(service: &Arc<MatchmakingService>, username: &str) -> (Uuid, UnboundedReceiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let (handle, rx) = ConnectionHandle::new(id);
        service.attach(handle);
        service.lobby.lock().connections.register(username, id);
        (id, rx)
    }

    fn expect_found(rx: &mut UnboundedReceiver<ServerMsg>, opponent: &str) {
        match rx.try_recv() {
            Ok(ServerMsg::MatchmakingFound {
                matchmaking,
                opponent: got,
            }) => {
                assert!(matchmaking);
                assert_eq!(got, opponent);
            }
            other => panic!("expected matchmakingfound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn same_league_pair_notifies_both() {
        let service = test_service();
        let (_a, mut rx_a) = connect(&service, "alice");
        let (_b, mut rx_b) = connect(&service, "bob");

        service.enqueue_for_match("alice", "bronze");
        service.enqueue_for_match("bob", "bronze");

        expect_found(&mut rx_a, "bob");
        expect_found(&mut rx_b, "alice");
        assert_eq!(service.queue_size(), 0);
        assert_eq!(service.registry.active_matches(), 1);

        let lobby = service.lobby.lock();
        assert!(lobby.in_match.contains_key("alice"));
        assert!(lobby.in_match.contains_key("bob"));
    }

    #[tokio::test]
    async fn different_leagues_do_not_pair() {
        let service = test_service();
        let (_a, mut rx_a) = connect(&service, "alice");
        let (_b, mut rx_b) = connect(&service, "bob");

        service.enqueue_for_match("alice", "bronze");
        service.enqueue_for_match("bob", "gold");

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(service.queue_size(), 2);
    }

    #[tokio::test]
    async fn unknown_user_enqueue_is_ignored() {
        let service = test_service();
        service.enqueue_for_match("ghost", "bronze");
        assert_eq!(service.queue_size(), 0);
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_idempotent() {
        let service = test_service();
        let (_a, mut rx_a) = connect(&service, "alice");

        service.enqueue_for_match("alice", "bronze");
        service.enqueue_for_match("alice", "bronze");

        assert_eq!(service.queue_size(), 1);
        assert!(rx_a.try_recv().is_err(), "no self-pairing");
    }

    #[tokio::test]
    async fn cancel_matchmaking_dequeues() {
        let service = test_service();
        let (_a, _rx_a) = connect(&service, "alice");

        service.enqueue_for_match("alice", "bronze");
        assert_eq!(service.queue_size(), 1);

        service.cancel_matchmaking("alice");
        assert_eq!(service.queue_size(), 0);

        // no-op for an unqueued user
        service.cancel_matchmaking("alice");
        assert_eq!(service.queue_size(), 0);
    }

    #[tokio::test]
    async fn queued_player_vanishes_on_disconnect() {
        let service = test_service();
        let (conn_a, _rx_a) = connect(&service, "alice");

        service.enqueue_for_match("alice", "bronze");
        service.on_disconnect(conn_a).await;

        assert_eq!(service.queue_size(), 0);
        assert_eq!(service.connected_players(), 0);
    }

    #[tokio::test]
    async fn disconnect_mid_match_forfeits_to_opponent() {
        let service = test_service();
        let (conn_a, mut rx_a) = connect(&service, "alice");
        let (_b, mut rx_b) = connect(&service, "bob");

        service.enqueue_for_match("alice", "bronze");
        service.enqueue_for_match("bob", "bronze");
        expect_found(&mut rx_a, "bob");
        expect_found(&mut rx_b, "alice");

        service.on_disconnect(conn_a).await;

        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMsg::OpponentDisconnect)
        ));
        match rx_b.try_recv() {
            Ok(ServerMsg::GameStop { opponent }) => assert_eq!(opponent, "alice"),
            other => panic!("expected game-stop, got {:?}", other),
        }

        // exactly one disconnect/stop pair
        assert!(rx_b.try_recv().is_err());
        assert!(service.lobby.lock().in_match.is_empty());
        assert_eq!(service.registry.active_matches(), 0);

        // a second disconnect signal for the same match is a no-op
        service.on_disconnect(conn_a).await;
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn challenge_two_phase_promotes_to_match() {
        let service = test_service();
        let (_a, mut rx_a) = connect(&service, "alice");
        let (_b, mut rx_b) = connect(&service, "bob");

        service.challenge("c-1", "alice", "bob");
        assert!(rx_a.try_recv().is_err(), "first leg only opens the entry");

        service.challenge("c-1", "alice", "bob");
        expect_found(&mut rx_a, "bob");
        expect_found(&mut rx_b, "alice");
        assert_eq!(service.registry.active_matches(), 1);
        assert!(service.lobby.lock().challenges.is_empty());
    }

    #[tokio::test]
    async fn challenger_disconnect_drops_open_challenge() {
        let service = test_service();
        let (conn_a, _rx_a) = connect(&service, "alice");
        let (_b, mut rx_b) = connect(&service, "bob");

        service.challenge("c-1", "alice", "bob");
        service.on_disconnect(conn_a).await;

        // the entry is gone and the challenger is no longer connected, so
        // the would-be acceptance does nothing
        service.challenge("c-1", "alice", "bob");
        assert!(rx_b.try_recv().is_err());
        assert_eq!(service.registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn queued_user_cannot_open_challenge() {
        let service = test_service();
        let (_a, _rx_a) = connect(&service, "alice");

        service.enqueue_for_match("alice", "bronze");
        service.challenge("c-1", "alice", "bob");

        assert!(service.lobby.lock().challenges.is_empty());
    }
}
