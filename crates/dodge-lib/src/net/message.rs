use crate::player::Player;
use crate::room::{GameMode, Room, Winner};
use crate::sync::{Enemy, Position};
use crate::{PlayerId, RoomCode};
use serde::{Deserialize, Serialize};

use super::ProtocolError;

// TODO: Take more advantage of the type system (e.g. Client/Server messages)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub enum Message {
    Error { error: ProtocolError },
    Version { version: String },
    ConnectionAccept { player_id: PlayerId },
    CreateRoom { player_name: String },
    JoinRoom { code: RoomCode, player_name: String },
    RoomCreated { code: RoomCode, player: Player, room: Room },
    RoomJoined { player: Player, room: Room },
    Room(RoomMessage),
}

impl From<RoomMessage> for Message {
    fn from(msg: RoomMessage) -> Self {
        Self::Room(msg)
    }
}

/// Traffic within a joined room. The first block are requests from a member,
/// the rest are the events the room broadcasts back out.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum RoomMessage {
    SelectMode { mode: GameMode },
    ToggleReady,
    StartGame,
    RestartGame,
    Move { position: Position },
    Died,
    SpawnEnemy { enemy: Enemy },
    LeaveRoom,

    PlayerJoined { player: Player, room: Room },
    PlayerLeft { player_id: PlayerId, player_name: String, room: Room },
    HostChanged { new_host_id: PlayerId, room: Room },
    ModeSelected { mode: GameMode, room: Room },
    RoomUpdated { room: Room },
    GameStarted { room: Room },
    PlayerMoved { player_id: PlayerId, position: Position },
    PlayerDied { player_id: PlayerId, player_name: String },
    EnemySpawned { enemy: Enemy, spawned_at_ms: u64 },
    GameFinished { winner: Option<Winner> },
}
