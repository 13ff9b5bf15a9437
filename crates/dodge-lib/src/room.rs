use std::collections::HashMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::sync::{Position, ARENA_CENTER, SPAWN_RING_RADIUS};
use crate::{PlayerId, RoomCode, MAX_PLAYERS};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum GameMode {
    /// Every player dodges in their own arena copy; last alive wins.
    BattleRoyale,
    /// One arena, hazards minted by the host and mirrored to everyone.
    SharedArena,
}

impl Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::BattleRoyale => write!(f, "battle-royale"),
            GameMode::SharedArena => write!(f, "shared-arena"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum RoomState {
    Waiting,
    Playing,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Winner {
    pub id: PlayerId,
    pub name: String,
}

/// Everything about a room that members get to see. Sent whole as the
/// snapshot on roster and phase changes; hazards are deliberately not part
/// of it since they replicate through their own spawn events.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Room {
    pub code: RoomCode,
    // TODO: Refactor this option out, a room is only ever opened on behalf of a
    //       connected creator so the host could be specified up front.
    pub host_id: Option<PlayerId>,
    pub players: HashMap<PlayerId, Player>,
    pub state: RoomState,
    pub max_players: usize,
    pub mode: Option<GameMode>,
    pub winner: Option<Winner>,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            host_id: None,
            players: HashMap::new(),
            state: RoomState::Waiting,
            max_players: MAX_PLAYERS,
            mode: None,
            winner: None,
        }
    }

    pub fn is_host(&self, player_id: PlayerId) -> bool {
        self.host_id == Some(player_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// True when every member has readied up.
    pub fn can_start(&self) -> bool {
        self.players.values().all(|p| p.ready)
    }

    pub fn alive(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }
}

/// Starting positions for a round of `mode` with `count` players, in join
/// order.
///
/// Shared-arena rounds fan the roster out on a ring around the arena centre
/// so nobody spawns inside anyone else. Battle-royale rounds give every
/// player the centre of their own arena copy.
pub fn start_positions(mode: GameMode, count: usize) -> Vec<Position> {
    match mode {
        GameMode::BattleRoyale => vec![ARENA_CENTER; count],
        GameMode::SharedArena => (0..count)
            .map(|i| {
                let angle = (i as f32 / count as f32) * std::f32::consts::TAU;
                Position {
                    x: ARENA_CENTER.x + angle.cos() * SPAWN_RING_RADIUS,
                    y: ARENA_CENTER.y + angle.sin() * SPAWN_RING_RADIUS,
                }
            })
            .collect(),
    }
}
