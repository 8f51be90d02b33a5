//! Match state and authoritative tick loop

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::{tick_duration, SIMULATION_TPS};
use crate::ws::ConnectionHandle;

use super::physics::{
    deflect_x, paddle_contact, Body, Vec2, BALL_RADIUS, CANVAS_HEIGHT, CANVAS_WIDTH,
    INITIAL_BALL_SPEED, MAX_BALL_SPEED, PADDLE_HEIGHT, PADDLE_MARGIN, PADDLE_STEP,
    PADDLE_WALL_OFFSET, SPEED_UP_HITS,
};
use super::snapshot;
use super::{MatchCommand, MoveDir};

/// First score to reach this wins
pub const WIN_SCORE: u8 = 7;

/// Ticks between match start and the opening serve
pub const INITIAL_LAUNCH_DELAY_TICKS: u32 = 2 * SIMULATION_TPS;
/// Ticks between a point and the next serve
pub const RELAUNCH_DELAY_TICKS: u32 = SIMULATION_TPS;

/// Which paddle a player defends. The authoritative frame puts player1 at
/// the bottom; player2's client sees the mirrored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Top,
    Bottom,
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Paired, waiting out the pre-game delay
    Starting,
    /// Tick loop running
    Playing,
    /// Torn down by disconnect or external cancel
    Cancelled,
    /// A side reached the win threshold
    Finished,
}

/// A serve waiting for its delay to elapse
#[derive(Debug, Clone, Copy)]
struct PendingLaunch {
    ticks_left: u32,
    velocity: Vec2,
}

/// The authoritative world of one match
#[derive(Debug, Clone)]
pub struct World {
    pub ball: Body,
    pub top_paddle: Body,
    pub bottom_paddle: Body,
    /// Current rally speed, pixels per tick
    pub ball_speed: f32,
    pub tick: u64,
    hit_counter: u32,
    pending_launch: Option<PendingLaunch>,
}

impl World {
    pub fn new() -> Self {
        Self {
            ball: Body::new(CANVAS_WIDTH / 2.0, CANVAS_HEIGHT / 2.0),
            top_paddle: Body::new(CANVAS_WIDTH / 2.0, PADDLE_WALL_OFFSET),
            bottom_paddle: Body::new(CANVAS_WIDTH / 2.0, CANVAS_HEIGHT - PADDLE_WALL_OFFSET),
            ball_speed: INITIAL_BALL_SPEED,
            tick: 0,
            hit_counter: 0,
            pending_launch: None,
        }
    }

    /// Queue a serve `delay_ticks` from now
    pub fn schedule_launch(&mut self, delay_ticks: u32, velocity: Vec2) {
        self.pending_launch = Some(PendingLaunch {
            ticks_left: delay_ticks.max(1),
            velocity,
        });
    }

    /// Apply one paddle input, clamped to the playable width. Out-of-range
    /// moves leave the paddle where it is.
    pub fn apply_move(&mut self, seat: Seat, dir: MoveDir) {
        // The top player sees a mirrored field, so their left/right flip
        let delta = match (seat, dir) {
            (Seat::Bottom, MoveDir::Right) | (Seat::Top, MoveDir::Left) => PADDLE_STEP,
            (Seat::Bottom, MoveDir::Left) | (Seat::Top, MoveDir::Right) => -PADDLE_STEP,
        };

        let paddle = match seat {
            Seat::Top => &mut self.top_paddle,
            Seat::Bottom => &mut self.bottom_paddle,
        };

        let new_x = paddle.pos.x + delta;
        if new_x < PADDLE_MARGIN || new_x > CANVAS_WIDTH - PADDLE_MARGIN {
            return;
        }
        paddle.pos.x = new_x;
    }

    /// Advance the world by one fixed timestep. Returns the seat that won a
    /// point this tick, if any.
    pub fn step(&mut self, rng: &mut ChaCha8Rng) -> Option<Seat> {
        self.tick += 1;

        if let Some(launch) = self.pending_launch.as_mut() {
            launch.ticks_left -= 1;
            if launch.ticks_left == 0 {
                self.ball.vel = launch.velocity;
                self.pending_launch = None;
            }
        }

        self.ball.step();

        // Side walls reflect
        if self.ball.pos.x - BALL_RADIUS <= 0.0 && self.ball.vel.x < 0.0 {
            self.ball.vel.x = -self.ball.vel.x;
        }
        if self.ball.pos.x + BALL_RADIUS >= CANVAS_WIDTH && self.ball.vel.x > 0.0 {
            self.ball.vel.x = -self.ball.vel.x;
        }

        // Rally escalation: every SPEED_UP_HITS paddle hits, up to the ceiling
        if self.hit_counter >= SPEED_UP_HITS && self.ball_speed < MAX_BALL_SPEED {
            self.hit_counter = 0;
            self.ball_speed += 1.0;
        }

        // Paddle collisions, only against a ball travelling toward the paddle
        if self.ball.vel.y < 0.0 {
            if let Some(contact_x) =
                paddle_contact(&self.ball, self.top_paddle.pos.x, self.top_paddle.pos.y)
            {
                self.hit_counter += 1;
                self.ball.vel = Vec2::new(
                    deflect_x(contact_x, self.top_paddle.pos.x, self.ball.vel.x, self.ball_speed),
                    self.ball_speed + 1.0,
                );
            }
        }
        if self.ball.vel.y > 0.0 {
            if let Some(contact_x) = paddle_contact(
                &self.ball,
                self.bottom_paddle.pos.x,
                self.bottom_paddle.pos.y,
            ) {
                self.hit_counter += 1;
                self.ball.vel = Vec2::new(
                    deflect_x(
                        contact_x,
                        self.bottom_paddle.pos.x,
                        self.ball.vel.x,
                        self.ball_speed,
                    ),
                    -(self.ball_speed + 1.0),
                );
            }
        }

        // Back walls score: top wall for the bottom seat, bottom wall for the top seat
        if self.ball.pos.y - BALL_RADIUS <= 0.0 {
            self.reset_after_point(rng);
            return Some(Seat::Bottom);
        }
        if self.ball.pos.y + BALL_RADIUS >= CANVAS_HEIGHT {
            self.reset_after_point(rng);
            return Some(Seat::Top);
        }

        None
    }

    /// Park the ball at center and queue a randomized serve at the reset speed
    fn reset_after_point(&mut self, rng: &mut ChaCha8Rng) {
        self.ball_speed = INITIAL_BALL_SPEED;
        self.ball.pos = Vec2::new(CANVAS_WIDTH / 2.0, CANVAS_HEIGHT / 2.0);
        self.ball.vel = Vec2::default();

        let vx = rng.gen_range(-self.ball_speed..=self.ball_speed);
        let vy = if rng.gen_bool(0.5) {
            self.ball_speed
        } else {
            -self.ball_speed
        };
        self.schedule_launch(RELAUNCH_DELAY_TICKS, Vec2::new(vx, vy));
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of a match
#[derive(Debug, Clone)]
pub struct SessionPlayer {
    pub username: String,
    pub conn: ConnectionHandle,
    pub score: u8,
}

impl SessionPlayer {
    pub fn new(username: String, conn: ConnectionHandle) -> Self {
        Self {
            username,
            conn,
            score: 0,
        }
    }
}

/// Authoritative state of one match (owned by its tick loop)
#[derive(Debug, Clone)]
pub struct MatchSession {
    pub id: Uuid,
    /// Bottom seat in the authoritative frame
    pub player1: SessionPlayer,
    /// Top seat in the authoritative frame
    pub player2: SessionPlayer,
    pub status: MatchStatus,
    pub world: World,
}

impl MatchSession {
    pub fn new(id: Uuid, player1: SessionPlayer, player2: SessionPlayer) -> Self {
        Self {
            id,
            player1,
            player2,
            status: MatchStatus::Starting,
            world: World::new(),
        }
    }

    /// Seat of a named participant, or None for an outsider
    pub fn seat_of(&self, username: &str) -> Option<Seat> {
        if username == self.player1.username {
            Some(Seat::Bottom)
        } else if username == self.player2.username {
            Some(Seat::Top)
        } else {
            None
        }
    }

    pub fn award_point(&mut self, scorer: Seat) {
        match scorer {
            Seat::Bottom => self.player1.score += 1,
            Seat::Top => self.player2.score += 1,
        }
    }

    /// The side that reached the win threshold, if any
    pub fn winner(&self) -> Option<&SessionPlayer> {
        if self.player1.score >= WIN_SCORE {
            Some(&self.player1)
        } else if self.player2.score >= WIN_SCORE {
            Some(&self.player2)
        } else {
            None
        }
    }
}

/// How a match loop ended
#[derive(Debug)]
pub enum MatchOutcome {
    Finished(MatchSession),
    Cancelled(MatchSession),
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    commands_tx: mpsc::Sender<MatchCommand>,
    cancelled: Arc<AtomicBool>,
}

impl MatchHandle {
    /// Forward a paddle input; a full channel drops the move
    pub fn send_move(&self, username: String, dir: MoveDir) {
        if self
            .commands_tx
            .try_send(MatchCommand::Move { username, dir })
            .is_err()
        {
            debug!(match_id = %self.id, "Match command channel full, dropping move");
        }
    }

    /// Cancel the match; takes effect within one tick. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        let _ = self.commands_tx.try_send(MatchCommand::Cancel);
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    session: MatchSession,
    commands_rx: mpsc::Receiver<MatchCommand>,
    cancelled: Arc<AtomicBool>,
    rng: ChaCha8Rng,
}

impl GameMatch {
    /// Create a new match and its handle
    pub fn new(
        id: Uuid,
        seed: u64,
        player1: SessionPlayer,
        player2: SessionPlayer,
    ) -> (Self, MatchHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(256);
        let cancelled = Arc::new(AtomicBool::new(false));

        let handle = MatchHandle {
            id,
            commands_tx,
            cancelled: cancelled.clone(),
        };

        let game_match = Self {
            session: MatchSession::new(id, player1, player2),
            commands_rx,
            cancelled,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };

        (game_match, handle)
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn usernames(&self) -> (String, String) {
        (
            self.session.player1.username.clone(),
            self.session.player2.username.clone(),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Run the authoritative tick loop to completion
    pub async fn run(mut self) -> MatchOutcome {
        if self.cancelled.load(Ordering::Relaxed) {
            // A participant disconnected during the pre-game delay
            self.session.status = MatchStatus::Cancelled;
            info!(match_id = %self.session.id, "Match cancelled before start");
            return MatchOutcome::Cancelled(self.session);
        }

        self.session.status = MatchStatus::Playing;
        info!(
            match_id = %self.session.id,
            player1 = %self.session.player1.username,
            player2 = %self.session.player2.username,
            "Match started"
        );

        let init = snapshot::canvas_init();
        self.session.player1.conn.send(init.clone());
        self.session.player2.conn.send(init);

        // Opening serve goes straight down once the clients have settled
        self.session.world.schedule_launch(
            INITIAL_LAUNCH_DELAY_TICKS,
            Vec2::new(0.0, INITIAL_BALL_SPEED),
        );

        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            self.drain_commands();

            if self.cancelled.load(Ordering::Relaxed)
                || self.session.status == MatchStatus::Cancelled
            {
                self.session.status = MatchStatus::Cancelled;
                info!(match_id = %self.session.id, "Match cancelled");
                break;
            }

            // A side that reached the threshold last tick ends the match
            // before any further simulation or emission
            if self.session.winner().is_some() {
                self.session.status = MatchStatus::Finished;
                info!(
                    match_id = %self.session.id,
                    score1 = self.session.player1.score,
                    score2 = self.session.player2.score,
                    "Match finished"
                );
                break;
            }

            if let Some(scorer) = self.session.world.step(&mut self.rng) {
                self.session.award_point(scorer);
            }

            let (view1, view2) = snapshot::build_views(&self.session);
            self.session.player1.conn.send(view1);
            self.session.player2.conn.send(view2);
        }

        match self.session.status {
            MatchStatus::Finished => MatchOutcome::Finished(self.session),
            _ => MatchOutcome::Cancelled(self.session),
        }
    }

    /// Apply all pending commands from both connections
    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands_rx.try_recv() {
            match cmd {
                MatchCommand::Move { username, dir } => {
                    // input naming someone not in this match is ignored
                    if let Some(seat) = self.session.seat_of(&username) {
                        self.session.world.apply_move(seat, dir);
                    }
                }
                MatchCommand::Cancel => {
                    self.session.status = MatchStatus::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn test_player(username: &str) -> (SessionPlayer, tokio::sync::mpsc::UnboundedReceiver<ServerMsg>) {
        let (conn, rx) = ConnectionHandle::new(Uuid::new_v4());
        (SessionPlayer::new(username.to_string(), conn), rx)
    }

    fn test_session() -> MatchSession {
        let (p1, _rx1) = test_player("alice");
        let (p2, _rx2) = test_player("bob");
        MatchSession::new(Uuid::new_v4(), p1, p2)
    }

    #[test]
    fn launch_fires_after_delay() {
        let mut world = World::new();
        let mut rng = test_rng();
        world.schedule_launch(3, Vec2::new(0.0, 5.0));

        world.step(&mut rng);
        world.step(&mut rng);
        assert_eq!(world.ball.vel, Vec2::default());

        world.step(&mut rng);
        assert_eq!(world.ball.vel, Vec2::new(0.0, 5.0));
    }

    #[test]
    fn move_right_steps_bottom_paddle() {
        let mut world = World::new();
        world.bottom_paddle.pos.x = 240.0;
        world.apply_move(Seat::Bottom, MoveDir::Right);
        assert_eq!(world.bottom_paddle.pos.x, 250.0);
    }

    #[test]
    fn move_past_margin_is_rejected() {
        let mut world = World::new();
        world.bottom_paddle.pos.x = CANVAS_WIDTH - PADDLE_MARGIN;
        world.apply_move(Seat::Bottom, MoveDir::Right);
        assert_eq!(world.bottom_paddle.pos.x, CANVAS_WIDTH - PADDLE_MARGIN);

        world.bottom_paddle.pos.x = PADDLE_MARGIN;
        world.apply_move(Seat::Bottom, MoveDir::Left);
        assert_eq!(world.bottom_paddle.pos.x, PADDLE_MARGIN);
    }

    #[test]
    fn top_seat_moves_are_mirrored() {
        let mut world = World::new();
        world.top_paddle.pos.x = 250.0;
        world.apply_move(Seat::Top, MoveDir::Right);
        assert_eq!(world.top_paddle.pos.x, 240.0);
        world.apply_move(Seat::Top, MoveDir::Left);
        assert_eq!(world.top_paddle.pos.x, 250.0);
    }

    #[test]
    fn bottom_paddle_hit_reverses_ball_upward() {
        let mut world = World::new();
        let mut rng = test_rng();
        // Ball one step above the bottom paddle face, falling straight down
        let paddle_top = world.bottom_paddle.pos.y - PADDLE_HEIGHT / 2.0;
        world.ball.pos = Vec2::new(world.bottom_paddle.pos.x, paddle_top - BALL_RADIUS - 4.0);
        world.ball.vel = Vec2::new(0.0, 5.0);

        world.step(&mut rng);

        assert_eq!(world.ball.vel.y, -(world.ball_speed + 1.0));
    }

    #[test]
    fn top_wall_scores_for_bottom_seat_and_resets_ball() {
        let mut world = World::new();
        let mut rng = test_rng();
        world.ball_speed = 9.0;
        world.ball.pos = Vec2::new(100.0, BALL_RADIUS + 2.0);
        world.ball.vel = Vec2::new(0.0, -5.0);

        let scorer = world.step(&mut rng);

        assert_eq!(scorer, Some(Seat::Bottom));
        assert_eq!(
            world.ball.pos,
            Vec2::new(CANVAS_WIDTH / 2.0, CANVAS_HEIGHT / 2.0)
        );
        assert_eq!(world.ball.vel, Vec2::default());
        assert_eq!(world.ball_speed, INITIAL_BALL_SPEED);
        assert!(world.pending_launch.is_some());
    }

    #[test]
    fn bottom_wall_scores_for_top_seat() {
        let mut world = World::new();
        let mut rng = test_rng();
        world.ball.pos = Vec2::new(100.0, CANVAS_HEIGHT - BALL_RADIUS - 2.0);
        world.ball.vel = Vec2::new(0.0, 5.0);

        assert_eq!(world.step(&mut rng), Some(Seat::Top));
    }

    #[test]
    fn side_walls_reflect() {
        let mut world = World::new();
        let mut rng = test_rng();
        world.ball.pos = Vec2::new(BALL_RADIUS + 1.0, 400.0);
        world.ball.vel = Vec2::new(-5.0, 2.0);

        world.step(&mut rng);

        assert!(world.ball.vel.x > 0.0);
        assert_eq!(world.ball.vel.y, 2.0);
    }

    #[test]
    fn ball_speed_never_exceeds_ceiling() {
        let mut world = World::new();
        let mut rng = test_rng();
        // Park the ball mid-field so only the escalation rule runs
        world.ball.vel = Vec2::default();
        for _ in 0..200 {
            world.hit_counter = SPEED_UP_HITS;
            world.step(&mut rng);
            assert!(world.ball_speed <= MAX_BALL_SPEED);
        }
        assert_eq!(world.ball_speed, MAX_BALL_SPEED);
    }

    #[test]
    fn scores_are_monotone_and_terminal_at_win_threshold() {
        let mut session = test_session();
        for i in 1..=WIN_SCORE {
            assert!(session.winner().is_none());
            session.award_point(Seat::Bottom);
            assert_eq!(session.player1.score, i);
        }
        let winner = session.winner().expect("threshold reached");
        assert_eq!(winner.username, "alice");
    }

    #[test]
    fn seat_lookup_rejects_outsiders() {
        let session = test_session();
        assert_eq!(session.seat_of("alice"), Some(Seat::Bottom));
        assert_eq!(session.seat_of("bob"), Some(Seat::Top));
        assert_eq!(session.seat_of("mallory"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_start_skips_the_loop() {
        let (p1, mut rx1) = test_player("alice");
        let (p2, _rx2) = test_player("bob");
        let (game, handle) = GameMatch::new(Uuid::new_v4(), 7, p1, p2);

        handle.cancel();
        let outcome = game.run().await;

        assert!(matches!(outcome, MatchOutcome::Cancelled(_)));
        assert!(rx1.try_recv().is_err(), "no emission for a cancelled match");
    }

    #[tokio::test(start_paused = true)]
    async fn loop_sends_canvas_then_stops_on_cancel() {
        let (p1, mut rx1) = test_player("alice");
        let (p2, _rx2) = test_player("bob");
        let (game, handle) = GameMatch::new(Uuid::new_v4(), 7, p1, p2);

        let task = tokio::spawn(game.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let outcome = task.await.unwrap();

        assert!(matches!(outcome, MatchOutcome::Cancelled(_)));
        assert!(matches!(rx1.recv().await, Some(ServerMsg::Canvas { .. })));

        // Whatever was in flight is update-game only; the loop never emits
        // after observing the cancel
        drop(outcome);
        while let Ok(msg) = rx1.try_recv() {
            assert!(matches!(msg, ServerMsg::UpdateGame { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_cancel_is_a_no_op() {
        let (p1, _rx1) = test_player("alice");
        let (p2, _rx2) = test_player("bob");
        let (game, handle) = GameMatch::new(Uuid::new_v4(), 7, p1, p2);

        let task = tokio::spawn(game.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        handle.cancel();
        assert!(matches!(task.await.unwrap(), MatchOutcome::Cancelled(_)));
    }
}
