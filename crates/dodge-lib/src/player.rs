use std::fmt::{self, Display};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sync::{Position, ARENA_CENTER};
use crate::PlayerId;

/// The fixed set of colors a room can hand out, in checkout order for the
/// room creator.
pub const PALETTE: [Color; 5] = [
    Color(0xff, 0x6b, 0x6b),
    Color(0x4e, 0xcd, 0xc4),
    Color(0x45, 0xb7, 0xd1),
    Color(0xff, 0xa0, 0x7a),
    Color(0x98, 0xd8, 0xc8),
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Color(pub u8, pub u8, pub u8);

impl Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // CSS hex notation, matching what clients feed their canvas
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// The colors of a single room: checked out when a player joins, restored
/// when they leave. Capacity bounds the roster as a side effect, a room can
/// never hold more players than [`PALETTE`] has entries.
#[derive(Debug)]
pub struct ColorPool {
    available: Vec<Color>,
}

impl ColorPool {
    pub fn new() -> Self {
        Self {
            available: PALETTE.to_vec(),
        }
    }

    /// Checkout the first palette entry, reserved for the room creator.
    pub fn checkout_first(&mut self) -> Option<Color> {
        if self.available.is_empty() {
            return None;
        }
        Some(self.available.remove(0))
    }

    pub fn checkout_random<R: Rng>(&mut self, rng: &mut R) -> Option<Color> {
        if self.available.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.available.len());
        Some(self.available.remove(index))
    }

    /// Return a checked-out color to the pool.
    pub fn restore(&mut self, color: Color) {
        debug_assert!(
            !self.available.contains(&color),
            "color {color} restored twice"
        );
        self.available.push(color);
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}

impl Default for ColorPool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: Color,
    pub ready: bool,
    pub alive: bool,
    pub position: Position,
    pub join_order: u8,
}

impl Player {
    pub fn new(id: PlayerId, name: String, color: Color, join_order: u8) -> Self {
        Self {
            id,
            name,
            color,
            ready: false,
            alive: true,
            position: ARENA_CENTER,
            join_order,
        }
    }
}
