use dodge_lib::{net::Message, net::ProtocolError, PlayerId, RoomCode};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::state::OwnedId;

use self::{
    room_actor::RoomActor,
    room_handle::{RoomHandle, RoomHandleProvider},
};

mod room_actor;
pub mod room_handle;

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Attempted to add a player to a full room")]
    RoomFull,
    #[error("Attempted to join a game already in progress")]
    NotJoinable,
    #[error("No color is left for another player")]
    NoColorAvailable,
    #[error("The game is already underway")]
    AlreadyStarted,
    #[error("No finished game to restart")]
    NotFinished,
    #[error("No game mode has been selected")]
    ModeNotSelected,
    #[error("Not every player is ready")]
    PlayersNotReady,
    #[error("Action attempted by Player {0:#} who is not in this room")]
    PlayerInvalid(PlayerId),
    #[error("Action attempted by Player {0:#} was invalid.")]
    InvalidAction(PlayerId),
    #[error("Non-host attempted a host-only action")]
    NeedsHost,
    #[error("The Room Handle is no longer connected to a room.")]
    HandleInvalid,
}

impl From<RoomError> for ProtocolError {
    fn from(v: RoomError) -> Self {
        Self::Message(v.to_string())
    }
}

pub type RoomResult<T> = Result<T, RoomError>;

/// An event fanned out to every member's connection task.
///
/// `origin` is set on relayed state (movement) so the originating member's
/// writer can skip echoing it back; everything else goes to the whole room.
#[derive(Clone, Debug)]
pub struct RoomEvent {
    pub origin: Option<PlayerId>,
    pub message: Message,
}

pub fn start_new_room(
    code: OwnedId<RoomCode>,
    host_id: PlayerId,
) -> (RoomHandleProvider, RoomHandle) {
    let (sender, receiver) = mpsc::channel(64);
    let weak_sender = sender.downgrade();
    let actor = RoomActor::new(receiver, code);
    let handle = RoomHandle {
        sender,
        player_id: host_id,
    };
    tokio::spawn(actor.run());

    (
        RoomHandleProvider {
            sender: weak_sender,
        },
        handle,
    )
}
