//! Per-recipient view construction
//!
//! The world is kept in one authoritative frame (player1 at the bottom).
//! The opponent's payload is derived here at emission time by point-
//! reflecting every position through the canvas center, so each client
//! renders itself as the bottom paddle facing up.

use crate::ws::protocol::{BallDims, CanvasDims, PaddleDims, ScoreView, ServerMsg};

use super::physics::{BALL_RADIUS, CANVAS_HEIGHT, CANVAS_WIDTH, PADDLE_HEIGHT, PADDLE_WIDTH};
use super::r#match::MatchSession;
use crate::util::time::FRAME_MILLIS;

/// One-time match initialization payload, identical for both players
pub fn canvas_init() -> ServerMsg {
    ServerMsg::Canvas {
        canvas: CanvasDims {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
        },
        frame_rate: FRAME_MILLIS,
        top_paddle: PaddleDims {
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
        },
        bottom_paddle: PaddleDims {
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
        },
        ball: BallDims {
            radius: BALL_RADIUS,
        },
    }
}

/// Build the per-tick snapshots for both recipients
pub fn build_views(session: &MatchSession) -> (ServerMsg, ServerMsg) {
    let world = &session.world;
    let ball = world.ball.pos;
    let top = world.top_paddle.pos;
    let bottom = world.bottom_paddle.pos;

    let view1 = ServerMsg::UpdateGame {
        ball_pos: ball,
        top_paddle_pos: top,
        bottom_paddle_pos: bottom,
        username: session.player1.username.clone(),
        score: ScoreView {
            top: session.player2.score,
            bottom: session.player1.score,
        },
    };

    // Mirrored frame: the paddles swap roles along with the reflection
    let view2 = ServerMsg::UpdateGame {
        ball_pos: ball.mirrored(),
        top_paddle_pos: bottom.mirrored(),
        bottom_paddle_pos: top.mirrored(),
        username: session.player2.username.clone(),
        score: ScoreView {
            top: session.player1.score,
            bottom: session.player2.score,
        },
    };

    (view1, view2)
}
