use dodge_lib::{
    player::Player,
    room::{GameMode, Room},
    sync::{Enemy, Position},
    PlayerId,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::RoomError;
use super::{room_actor::RoomAction, RoomEvent, RoomResult};

/// The registry's entry point to a room. Holding one does not keep the room
/// alive.
#[derive(Clone, Debug)]
pub struct RoomHandleProvider {
    pub(super) sender: mpsc::WeakSender<RoomAction>,
}

impl RoomHandleProvider {
    pub fn into_handle(self, player_id: impl Into<PlayerId>) -> RoomResult<RoomHandle> {
        Ok(RoomHandle {
            sender: self.sender.upgrade().ok_or(RoomError::HandleInvalid)?,
            player_id: player_id.into(),
        })
    }
}

/// A single player's capability to act on their room.
#[derive(Debug)]
pub struct RoomHandle {
    pub(super) sender: mpsc::Sender<RoomAction>,
    pub(super) player_id: PlayerId,
}

impl RoomHandle {
    async fn execute<T>(
        &self,
        msg: RoomAction,
        rx: oneshot::Receiver<Result<T, RoomError>>,
    ) -> Result<T, RoomError> {
        // Ignore first error, if there is an error, rx.await will fail as well since it's sender
        // will have been dropped
        let _ = self.sender.send(msg).await;
        rx.await.unwrap_or(Err(RoomError::HandleInvalid))
    }

    /// Become a member of the room this handle points at.
    ///
    /// Returns the created player record, a room snapshot for the join reply,
    /// and a receiver of all room events from this moment on.
    pub async fn join(
        &self,
        name: String,
    ) -> Result<(Player, Room, broadcast::Receiver<RoomEvent>), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::AddPlayer {
            respond_to: tx,
            id: self.player_id,
            name,
        };
        self.execute(msg, rx).await
    }

    pub async fn select_mode(&self, mode: GameMode) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::SelectMode {
            respond_to: tx,
            id: self.player_id,
            mode,
        };
        self.execute(msg, rx).await
    }

    pub async fn toggle_ready(&self) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::ToggleReady {
            respond_to: tx,
            id: self.player_id,
        };
        self.execute(msg, rx).await
    }

    pub async fn start_game(&self) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::StartGame {
            respond_to: tx,
            id: self.player_id,
        };
        self.execute(msg, rx).await
    }

    pub async fn restart_game(&self) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::RestartGame {
            respond_to: tx,
            id: self.player_id,
        };
        self.execute(msg, rx).await
    }

    /// Report this player's position. Fire-and-forget, the room drops stale
    /// reports without a reply.
    pub async fn move_to(&self, position: Position) {
        let _ = self
            .sender
            .send(RoomAction::MovePlayer {
                id: self.player_id,
                position,
            })
            .await;
    }

    /// Report this player's death. Fire-and-forget like movement.
    pub async fn report_death(&self) {
        let _ = self
            .sender
            .send(RoomAction::PlayerDied { id: self.player_id })
            .await;
    }

    /// Offer a hazard spawn. The room only accepts it from the shared-arena
    /// host and drops it otherwise.
    pub async fn spawn_enemy(&self, enemy: Enemy) {
        let _ = self
            .sender
            .send(RoomAction::SpawnEnemy {
                id: self.player_id,
                enemy,
            })
            .await;
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        let tx = self.sender.clone();
        let id = self.player_id;
        tokio::spawn(async move {
            if let Err(e) = tx.send(RoomAction::RemovePlayer { id }).await {
                tracing::warn!(%e, "Failed to remove player from their room.");
            }
        });
    }
}
