use dodge_lib::net::connection::{self, ConnectionRx, ConnectionTx};
use dodge_lib::net::{Message, ProtocolError, RoomMessage};
use dodge_lib::{PlayerId, RoomCode};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::room::room_handle::RoomHandle;
use crate::room::{RoomError, RoomEvent};
use crate::state::{OwnedId, ServerState};

/// Take a socket for a newly connected client and begin serving it.
pub async fn handle_new_connection(state: ServerState, socket: TcpStream) {
    let client = match ConnectingClient::new(state, socket).handshake().await {
        Some(c) => c,
        None => return,
    };
    client.run().await;
}

/// Represents a client who just connected and still needs to enter a room.
struct ConnectingClient {
    state: ServerState,
    player_id: OwnedId<PlayerId>,
    conn_tx: ConnectionTx,
    conn_rx: ConnectionRx,
}

impl ConnectingClient {
    fn new(state: ServerState, socket: TcpStream) -> Self {
        let player_id = state.add_player();
        let (conn_tx, conn_rx) = connection::from_socket(socket);
        Self {
            state,
            player_id,
            conn_tx,
            conn_rx,
        }
    }

    async fn handshake(mut self) -> Option<PlayerClient> {
        match self.try_handshake().await {
            Ok(joined) => Some(PlayerClient::from_connecting(self, joined)),
            Err(error) => {
                tracing::error!(%error);
                let _ = self.conn_tx.write_frame(Message::Error { error }).await;
                None
            }
        }
    }

    async fn try_handshake(&mut self) -> Result<JoinedRoom, ProtocolError> {
        let version = match self.conn_rx.read_frame().await? {
            Some(Message::Version { version }) => version,
            Some(_) => return Err(ProtocolError::InvalidMessage),
            None => return Err(ProtocolError::Disconnected),
        };

        if version != crate::VERSION {
            return Err(ProtocolError::VersionMismatch(
                version,
                crate::VERSION.to_owned(),
            ));
        }

        // Inform player of their PlayerId
        self.conn_tx
            .write_frame(Message::ConnectionAccept {
                player_id: *self.player_id,
            })
            .await?;
        tracing::info!("New connection for player id {} opened", self.player_id);

        match self.conn_rx.read_frame().await? {
            Some(Message::CreateRoom { player_name }) => self.create_room(player_name).await,
            Some(Message::JoinRoom { code, player_name }) => {
                self.join_room(code, player_name).await
            }
            Some(_) => Err(ProtocolError::InvalidMessage),
            None => Err(ProtocolError::Disconnected),
        }
    }

    async fn create_room(&mut self, player_name: String) -> Result<JoinedRoom, ProtocolError> {
        let (code, room_handle) = self.state.open_room(*self.player_id)?;
        let (player, room, events) = room_handle.join(player_name).await?;

        self.conn_tx
            .write_frame(Message::RoomCreated { code, player, room })
            .await?;
        Ok(JoinedRoom {
            room_handle,
            events,
        })
    }

    async fn join_room(
        &mut self,
        code: RoomCode,
        player_name: String,
    ) -> Result<JoinedRoom, ProtocolError> {
        let room_handle = self
            .state
            .get_room_handle_provider(code)?
            .into_handle(*self.player_id)?;
        let (player, room, events) = room_handle.join(player_name).await?;

        self.conn_tx
            .write_frame(Message::RoomJoined { player, room })
            .await?;
        Ok(JoinedRoom {
            room_handle,
            events,
        })
    }
}

/// The pieces of a room membership produced by the handshake. Returned out of
/// `try_handshake` since the caller needs to retain ownership of `self` for
/// error reporting to the client.
struct JoinedRoom {
    room_handle: RoomHandle,
    events: broadcast::Receiver<RoomEvent>,
}

/// Feeds every frame destined for one client into its socket: room events and
/// direct replies. Relayed state carries the id of the member it came from,
/// which this client's copy is filtered on so nobody hears their own echo.
async fn send_task(
    player_id: PlayerId,
    mut conn_tx: ConnectionTx,
    mut room_rx: broadcast::Receiver<RoomEvent>,
    mut local_rx: mpsc::Receiver<Message>,
) {
    loop {
        let m = select! {
            Ok(event) = room_rx.recv() => {
                if event.origin == Some(player_id) {
                    continue;
                }
                event.message
            }
            Some(m) = local_rx.recv() => m,
            else => return,
        };

        if conn_tx.write_frame(m).await.is_err() {
            return;
        }
    }
}

/// Used to represent a client who is a member of a room.
struct PlayerClient {
    player_id: OwnedId<PlayerId>,
    conn_rx: ConnectionRx,
    local_tx: mpsc::Sender<Message>,
    task_handle: JoinHandle<()>,
    room_handle: RoomHandle,
}

impl PlayerClient {
    fn from_connecting(client: ConnectingClient, joined: JoinedRoom) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let task_handle = tokio::spawn(send_task(
            *client.player_id,
            client.conn_tx,
            joined.events,
            rx,
        ));

        PlayerClient {
            player_id: client.player_id,
            conn_rx: client.conn_rx,
            local_tx: tx,
            task_handle,
            room_handle: joined.room_handle,
        }
    }

    /// Takes ownership of self to guarantee that client will be dropped when its
    /// message loop ends
    #[instrument(skip_all, fields(player_id = %self.player_id))]
    async fn run(mut self) {
        loop {
            let incoming = match self.conn_rx.read_frame().await {
                Ok(Some(Message::Room(RoomMessage::LeaveRoom))) => break,
                Ok(Some(Message::Room(x))) => x,
                Ok(Some(m)) => {
                    tracing::error!("Invalid message received: {m:?}");
                    let _ = self
                        .local_tx
                        .send(Message::Error {
                            error: ProtocolError::InvalidMessage,
                        })
                        .await;
                    continue;
                }
                Ok(None) => {
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading message, Closing connection\n{e:?}",);
                    break;
                }
            };

            tracing::debug!("Received message: {incoming:?}");
            match self.process(incoming).await {
                Ok(()) => (),
                Err(e) => {
                    tracing::error!("Encountered error processing message: {e:?}");
                    let _ = self
                        .local_tx
                        .send(Message::Error {
                            error: ProtocolError::Message(e.to_string()),
                        })
                        .await;
                }
            }
        }
        tracing::info!("Player disconnected");
    }

    async fn process(&mut self, msg: RoomMessage) -> Result<(), RoomError> {
        match msg {
            RoomMessage::SelectMode { mode } => self.room_handle.select_mode(mode).await,
            RoomMessage::ToggleReady => self.room_handle.toggle_ready().await,
            RoomMessage::StartGame => self.room_handle.start_game().await,
            RoomMessage::RestartGame => self.room_handle.restart_game().await,
            RoomMessage::Move { position } => {
                self.room_handle.move_to(position).await;
                Ok(())
            }
            RoomMessage::Died => {
                self.room_handle.report_death().await;
                Ok(())
            }
            RoomMessage::SpawnEnemy { enemy } => {
                self.room_handle.spawn_enemy(enemy).await;
                Ok(())
            }
            // The read loop ends the session on LeaveRoom before dispatching here
            RoomMessage::LeaveRoom => Ok(()),
            // Everything else is a server-to-client event echoed back by a
            // confused client
            _ => Err(RoomError::InvalidAction(*self.player_id)),
        }
    }
}

impl Drop for PlayerClient {
    fn drop(&mut self) {
        self.task_handle.abort();
        // room_handle and player_id take care of removing the player from
        // their room and the server when dropped
    }
}
