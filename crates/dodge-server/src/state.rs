use dodge_lib::net::ProtocolError;
use dodge_lib::{PlayerId, RoomCode};
use rand::{thread_rng, Rng};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::room;
use crate::room::room_handle::{RoomHandle, RoomHandleProvider};

/// Attempts at rolling an unused room code before create-room gives up.
const ROOM_CODE_ATTEMPTS: usize = 32;

#[derive(Clone, Debug, Default)]
pub struct ServerState {
    players: Arc<Mutex<HashSet<PlayerId>>>,
    rooms: Arc<Mutex<HashMap<RoomCode, RoomHandleProvider>>>,
}

impl ServerState {
    pub fn add_player(&self) -> OwnedId<PlayerId> {
        let player_id = self.gen_player_id();
        self.players().insert(player_id);
        OwnedId::<PlayerId>::new(self.clone(), player_id)
    }

    /// Open a new room with the player represented by `host_id` as its future host.
    ///
    /// This will add a [`RoomHandleProvider`] to [`ServerState`]'s room registry and
    /// return the generated code along with a concrete `RoomHandle` for the player
    /// who opened the room. The creator still becomes a member through that handle
    /// like everyone else.
    ///
    /// # Errors
    ///
    /// Will return a [`ProtocolError::RegistryFull`] if no unused code was found
    /// within [`ROOM_CODE_ATTEMPTS`] tries.
    pub fn open_room(&self, host_id: PlayerId) -> Result<(RoomCode, RoomHandle), ProtocolError> {
        let code = self.gen_room_code()?;
        let (handle_provider, handle) =
            room::start_new_room(OwnedId::<RoomCode>::new(self.clone(), code), host_id);
        tracing::info!("Room {code} opened");
        self.rooms().insert(code, handle_provider);
        Ok((code, handle))
    }

    /// Get a [`RoomHandleProvider`] instance for the specified `code`
    ///
    /// # Errors
    ///
    /// Will return a [`ProtocolError::RoomNotFound`] if the given code does not
    /// correspond to an open room.
    pub fn get_room_handle_provider(
        &self,
        code: RoomCode,
    ) -> Result<RoomHandleProvider, ProtocolError> {
        let provider = self
            .rooms()
            .get(&code)
            .ok_or(ProtocolError::RoomNotFound(code))?
            .clone();
        Ok(provider)
    }

    fn players(&self) -> MutexGuard<HashSet<PlayerId>> {
        self.players.lock().unwrap()
    }

    fn rooms(&self) -> MutexGuard<HashMap<RoomCode, RoomHandleProvider>> {
        self.rooms.lock().unwrap()
    }

    fn gen_player_id(&self) -> PlayerId {
        let mut player_id;
        loop {
            player_id = thread_rng().gen::<u32>().into();
            if !self.players().contains(&player_id) {
                break;
            };
        }
        player_id
    }

    /// Six-character codes can collide, so retry a bounded number of times
    /// rather than looping forever against a full registry.
    fn gen_room_code(&self) -> Result<RoomCode, ProtocolError> {
        let mut rng = thread_rng();
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let code = RoomCode::random(&mut rng);
            if !self.rooms().contains_key(&code) {
                return Ok(code);
            }
        }
        Err(ProtocolError::RegistryFull)
    }
}

/// Wrapper around Id types that is handed out when an Id is stored in the state
/// and when dropped will remove that id from the state.
#[derive(Debug)]
pub struct OwnedId<Id: Copy> {
    state: ServerState,
    id: Id,
    cleanup: fn(ServerState, Id),
}

impl<Id: Display + Copy> Display for OwnedId<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

/// Workaround for testing RoomActor
#[cfg(test)]
impl From<RoomCode> for OwnedId<RoomCode> {
    fn from(v: RoomCode) -> Self {
        Self {
            state: ServerState::default(),
            id: v,
            cleanup: |_, _| {},
        }
    }
}

impl OwnedId<PlayerId> {
    fn new(state: ServerState, id: PlayerId) -> Self {
        Self {
            state,
            id,
            cleanup: |state, id| {
                tracing::info!("Releasing player id {id}");
                state.players.lock().unwrap().remove(&id);
            },
        }
    }
}

impl OwnedId<RoomCode> {
    fn new(state: ServerState, id: RoomCode) -> Self {
        Self {
            state,
            id,
            cleanup: |state, id| {
                tracing::info!("Closing room {id}");
                state.rooms.lock().unwrap().remove(&id);
            },
        }
    }
}

impl<Id: Copy> Deref for OwnedId<Id> {
    type Target = Id;

    fn deref(&self) -> &Self::Target {
        &self.id
    }
}

impl<Id: Copy> Drop for OwnedId<Id> {
    fn drop(&mut self) {
        // This will crash the program if we're dropping due to a previous panic caused by a poisoned lock,
        // and that's fine for now.
        (self.cleanup)(self.state.clone(), self.id);
    }
}
