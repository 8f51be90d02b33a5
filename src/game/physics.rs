//! Ball and paddle physics primitives
//!
//! Velocities are expressed in pixels per simulation tick, matching the
//! fixed 60 Hz step the engine advances the world by.

use serde::{Deserialize, Serialize};

/// Playing field width in pixels
pub const CANVAS_WIDTH: f32 = 500.0;
/// Playing field height in pixels
pub const CANVAS_HEIGHT: f32 = 800.0;

/// Ball radius
pub const BALL_RADIUS: f32 = 10.0;

/// Paddle width
pub const PADDLE_WIDTH: f32 = 100.0;
/// Paddle height
pub const PADDLE_HEIGHT: f32 = 20.0;
/// Distance of each paddle's center from its wall
pub const PADDLE_WALL_OFFSET: f32 = 50.0;
/// Inset from the side walls a paddle center may not cross
pub const PADDLE_MARGIN: f32 = 50.0;
/// Horizontal displacement per move input
pub const PADDLE_STEP: f32 = 10.0;

/// Ball speed at launch and after every point
pub const INITIAL_BALL_SPEED: f32 = 5.0;
/// Rally escalation ceiling
pub const MAX_BALL_SPEED: f32 = 16.0;
/// Paddle hits between speed increments
pub const SPEED_UP_HITS: u32 = 6;

/// 2D position or velocity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Point-reflect through the canvas center, so the opposite side of the
    /// table sees itself at the bottom
    pub fn mirrored(self) -> Self {
        Self {
            x: CANVAS_WIDTH - self.x,
            y: CANVAS_HEIGHT - self.y,
        }
    }
}

/// A moving body: position plus per-tick velocity
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub pos: Vec2,
    pub vel: Vec2,
}

impl Body {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            pos: Vec2::new(x, y),
            vel: Vec2::default(),
        }
    }

    /// Advance one fixed timestep
    pub fn step(&mut self) {
        self.pos.x += self.vel.x;
        self.pos.y += self.vel.y;
    }
}

/// Check the ball (circle) against a paddle (axis-aligned rect centered at
/// `paddle_x`, `paddle_y`). Returns the contact x coordinate on overlap.
pub fn paddle_contact(ball: &Body, paddle_x: f32, paddle_y: f32) -> Option<f32> {
    let half_w = PADDLE_WIDTH / 2.0;
    let half_h = PADDLE_HEIGHT / 2.0;

    let closest_x = ball.pos.x.clamp(paddle_x - half_w, paddle_x + half_w);
    let closest_y = ball.pos.y.clamp(paddle_y - half_h, paddle_y + half_h);

    let dx = ball.pos.x - closest_x;
    let dy = ball.pos.y - closest_y;
    if dx * dx + dy * dy <= BALL_RADIUS * BALL_RADIUS {
        Some(closest_x)
    } else {
        None
    }
}

/// Horizontal velocity after a paddle hit.
///
/// The return angle is a linear function of the contact offset from the
/// paddle center, scaled by the current ball speed, combined with the
/// incoming horizontal velocity and capped at the current speed.
pub fn deflect_x(contact_x: f32, paddle_x: f32, ball_vx: f32, ball_speed: f32) -> f32 {
    let offset = contact_x - paddle_x;
    let x_velocity = offset / (PADDLE_WIDTH / 2.0) * ball_speed;

    if ball_vx * x_velocity >= 0.0 {
        let total = ball_vx.abs() + x_velocity.abs();
        if total > ball_speed {
            return if x_velocity < 0.0 { -ball_speed } else { ball_speed };
        }
        return x_velocity + ball_vx;
    }

    let total = x_velocity - ball_vx;
    if total < -ball_speed {
        return x_velocity;
    }
    x_velocity - ball_vx
}
