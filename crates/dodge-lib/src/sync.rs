//! The client-side synchronization contract: how remote players are smoothed
//! onto screen and how hazards replicate from a single spawn event.
//!
//! None of this runs on the server. It lives here so the server's relay
//! semantics and the math every client must agree on sit next to each other.

use serde::{Deserialize, Serialize};

use crate::{ARENA_HEIGHT, ARENA_WIDTH};

/// Simulated frames per second. Hazard trajectories advance in whole ticks of
/// this rate so differently-paced clients compute the same positions.
pub const TICK_RATE: u32 = 60;

/// Fraction of the remaining distance a smoothed position covers per frame.
pub const LERP_FACTOR: f32 = 0.3;

/// How far outside the arena a hazard may travel before clients cull it.
pub const CULL_MARGIN: f32 = 100.0;

/// Radius of the circle players are placed on when a shared-arena round starts.
pub const SPAWN_RING_RADIUS: f32 = 100.0;

/// Default spawn point, also the centre of the shared-arena formation.
pub const ARENA_CENTER: Position = Position {
    x: ARENA_WIDTH / 2.0,
    y: ARENA_HEIGHT / 2.0,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Straight-line distance to `other`.
    pub fn distance(&self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Renders a remote player by easing toward the most recently reported
/// position instead of snapping to it.
///
/// Movement reports arrive at whatever cadence the remote player's connection
/// allows. Each [`advance`](Self::advance) covers [`LERP_FACTOR`] of the
/// distance still to go, which hides network jitter and keeps a late target
/// from teleporting the sprite.
#[derive(Copy, Clone, Debug)]
pub struct SmoothedPosition {
    current: Position,
    target: Position,
}

impl SmoothedPosition {
    pub fn new(initial: Position) -> Self {
        Self {
            current: initial,
            target: initial,
        }
    }

    /// Replace the interpolation target with a newly reported position.
    pub fn retarget(&mut self, target: Position) {
        self.target = target;
    }

    /// Jump straight to `position`, used on (re)spawn.
    pub fn snap(&mut self, position: Position) {
        self.current = position;
        self.target = position;
    }

    /// Advance one local frame and return the position to render.
    pub fn advance(&mut self) -> Position {
        self.current.x += (self.target.x - self.current.x) * LERP_FACTOR;
        self.current.y += (self.target.y - self.current.y) * LERP_FACTOR;
        self.current
    }

    pub fn current(&self) -> Position {
        self.current
    }

    pub fn target(&self) -> Position {
        self.target
    }
}

/// A hazard minted by the shared-arena host and replicated exactly once.
///
/// After the spawn broadcast no further updates are sent for it. Every client
/// advances the hazard itself at constant velocity, one step per simulated
/// tick, and culls it once it leaves the arena. The id is chosen by the
/// spawning client and is opaque to the server.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Enemy {
    pub id: String,
    pub position: Position,
    pub velocity: Velocity,
    pub size: f32,
}

impl Enemy {
    /// Advance one simulated tick.
    pub fn advance(&mut self) {
        self.position.x += self.velocity.x;
        self.position.y += self.velocity.y;
    }

    /// Position after `ticks` further simulated ticks.
    pub fn position_at(&self, ticks: u32) -> Position {
        Position {
            x: self.position.x + self.velocity.x * ticks as f32,
            y: self.position.y + self.velocity.y * ticks as f32,
        }
    }

    /// True once the hazard is more than [`CULL_MARGIN`] outside the arena
    /// and should be dropped.
    pub fn out_of_bounds(&self) -> bool {
        self.position.x < -CULL_MARGIN
            || self.position.x > ARENA_WIDTH + CULL_MARGIN
            || self.position.y < -CULL_MARGIN
            || self.position.y > ARENA_HEIGHT + CULL_MARGIN
    }
}

/// Whole simulated ticks between a spawn stamp and `now_ms`.
///
/// Receivers anchor hazard trajectories to elapsed wall time rather than to
/// their own frame counters, so a client that joined an animation frame late
/// or renders slowly still agrees with everyone else about where a hazard is.
pub fn ticks_between(spawned_at_ms: u64, now_ms: u64) -> u32 {
    let elapsed_ms = now_ms.saturating_sub(spawned_at_ms);
    (elapsed_ms * u64::from(TICK_RATE) / 1000).min(u64::from(u32::MAX)) as u32
}
