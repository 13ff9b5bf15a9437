use std::{
    borrow::Borrow,
    fmt::{Debug, Display, Write},
    str::FromStr,
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod net;
pub mod player;
pub mod room;
pub mod sync;

pub const MAX_PLAYERS: usize = 5;

/// Playfield size every client simulates against.
pub const ARENA_WIDTH: f32 = 1000.0;
pub const ARENA_HEIGHT: f32 = 600.0;

// Newtype pattern for player ids
#[derive(Copy, Clone, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub struct PlayerId(pub u32);

impl Debug for PlayerId {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}
impl Display for PlayerId {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Always display IDs in hex
        write!(f, "{:#X}", self.0)
    }
}

impl From<u32> for PlayerId {
    #[inline]
    fn from(v: u32) -> Self {
        Self(v)
    }
}
impl From<PlayerId> for u32 {
    #[inline]
    fn from(v: PlayerId) -> Self {
        v.0
    }
}

impl Borrow<u32> for PlayerId {
    #[inline]
    fn borrow(&self) -> &u32 {
        &self.0
    }
}
impl PartialEq<u32> for PlayerId {
    #[inline]
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short shareable code identifying an open room.
///
/// Always six characters from `A-Z0-9`. Codes are compared and stored
/// uppercase; [`FromStr`] normalizes lowercase input so codes survive being
/// read aloud or typed sloppily.
#[derive(Copy, Clone, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub struct RoomCode([u8; ROOM_CODE_LEN]);

impl RoomCode {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut code = [0; ROOM_CODE_LEN];
        for c in &mut code {
            *c = ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())];
        }
        Self(code)
    }
}

impl Debug for RoomCode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}
impl Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Both constructors guarantee ascii
        for &b in &self.0 {
            f.write_char(char::from(b))?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("Room codes are six letters or digits")]
pub struct InvalidRoomCode;

impl FromStr for RoomCode {
    type Err = InvalidRoomCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ROOM_CODE_LEN || !s.is_ascii() {
            return Err(InvalidRoomCode);
        }

        let mut code = [0; ROOM_CODE_LEN];
        for (slot, b) in code.iter_mut().zip(s.bytes()) {
            let b = b.to_ascii_uppercase();
            if !ROOM_CODE_CHARSET.contains(&b) {
                return Err(InvalidRoomCode);
            }
            *slot = b;
        }
        Ok(Self(code))
    }
}
