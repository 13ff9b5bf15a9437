use std::time::{SystemTime, UNIX_EPOCH};

use dodge_lib::net::{Message, RoomMessage};
use dodge_lib::player::{ColorPool, Player};
use dodge_lib::room::{start_positions, GameMode, Room, RoomState, Winner};
use dodge_lib::sync::{Enemy, Position, ARENA_CENTER};
use dodge_lib::{PlayerId, RoomCode};
use rand::thread_rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::instrument;

use crate::state::OwnedId;

use super::{RoomError, RoomEvent, RoomResult};

pub struct RoomActor {
    receiver: mpsc::Receiver<RoomAction>,
    code: OwnedId<RoomCode>,
    shared: Room,
    colors: ColorPool,
    enemies: Vec<Enemy>,
    sender: broadcast::Sender<RoomEvent>,
    next_join_order: u8,
}

#[derive(Debug)]
pub enum RoomAction {
    AddPlayer {
        respond_to: oneshot::Sender<RoomResult<(Player, Room, broadcast::Receiver<RoomEvent>)>>,
        id: PlayerId,
        name: String,
    },
    RemovePlayer {
        id: PlayerId,
    },
    SelectMode {
        respond_to: oneshot::Sender<RoomResult<()>>,
        id: PlayerId,
        mode: GameMode,
    },
    ToggleReady {
        respond_to: oneshot::Sender<RoomResult<()>>,
        id: PlayerId,
    },
    StartGame {
        respond_to: oneshot::Sender<RoomResult<()>>,
        id: PlayerId,
    },
    RestartGame {
        respond_to: oneshot::Sender<RoomResult<()>>,
        id: PlayerId,
    },
    MovePlayer {
        id: PlayerId,
        position: Position,
    },
    PlayerDied {
        id: PlayerId,
    },
    SpawnEnemy {
        id: PlayerId,
        enemy: Enemy,
    },
}

impl RoomActor {
    pub fn new(receiver: mpsc::Receiver<RoomAction>, code: OwnedId<RoomCode>) -> Self {
        let (sender, _) = broadcast::channel(100);
        let shared = Room::new(*code);

        Self {
            receiver,
            code,
            shared,
            colors: ColorPool::new(),
            enemies: Vec::new(),
            sender,
            next_join_order: 0,
        }
    }

    #[instrument(skip_all, fields(room = %self.code))]
    pub async fn run(mut self) {
        tracing::info!("Room opened");
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                RoomAction::AddPlayer {
                    respond_to,
                    id,
                    name,
                } => {
                    let _ = respond_to.send(self.add_player(id, name));
                }
                RoomAction::RemovePlayer { id } => self.rem_player(id),
                RoomAction::SelectMode {
                    respond_to,
                    id,
                    mode,
                } => {
                    let _ = respond_to.send(self.select_mode(id, mode));
                }
                RoomAction::ToggleReady { respond_to, id } => {
                    let _ = respond_to.send(self.toggle_ready(id));
                }
                RoomAction::StartGame { respond_to, id } => {
                    let _ = respond_to.send(self.start_game(id));
                }
                RoomAction::RestartGame { respond_to, id } => {
                    let _ = respond_to.send(self.restart_game(id));
                }
                RoomAction::MovePlayer { id, position } => self.move_player(id, position),
                RoomAction::PlayerDied { id } => self.player_died(id),
                RoomAction::SpawnEnemy { id, enemy } => self.spawn_enemy(id, enemy),
            }
        }
        // Dropping self.code removes this room from the registry
        tracing::info!("Room closed");
    }

    /// Send `message` to every member.
    fn broadcast(&self, message: impl Into<Message>) {
        let _ = self.sender.send(RoomEvent {
            origin: None,
            message: message.into(),
        });
    }

    /// Send `message` to every member except `origin`, who produced it.
    fn relay(&self, origin: PlayerId, message: impl Into<Message>) {
        let _ = self.sender.send(RoomEvent {
            origin: Some(origin),
            message: message.into(),
        });
    }

    fn snapshot(&self) -> Room {
        self.shared.clone()
    }
}

// ----------------------------------------------------------------------------
// Message Handlers
// ----------------------------------------------------------------------------
impl RoomActor {
    /// Adds a new player to this room. The first player becomes the host and
    /// is auto-readied. A `[broadcast::Receiver]` is returned that will be sent
    /// all future events that happen to this room, along with the new player
    /// record and a snapshot for the join reply.
    ///
    /// # Errors
    ///
    /// This function will return an error if the game already started, the
    /// room is full, or no color is left.
    #[instrument(skip(self, name))]
    fn add_player(
        &mut self,
        player_id: PlayerId,
        name: String,
    ) -> RoomResult<(Player, Room, broadcast::Receiver<RoomEvent>)> {
        if self.shared.state != RoomState::Waiting {
            return Err(RoomError::NotJoinable);
        }
        if self.shared.is_full() {
            return Err(RoomError::RoomFull);
        }

        let host = self.shared.players.is_empty();
        let color = if host {
            self.colors.checkout_first()
        } else {
            self.colors.checkout_random(&mut thread_rng())
        }
        .ok_or(RoomError::NoColorAvailable)?;

        let mut player = Player::new(player_id, name, color, self.next_join_order);
        self.next_join_order += 1;
        if host {
            player.ready = true;
            self.shared.host_id = Some(player_id);
        }
        self.shared.players.insert(player_id, player.clone());

        tracing::info!("Player {} joined room", player.name);

        // Existing members hear about the join. The subscription is taken
        // afterwards so the new player only sees events from here on
        self.broadcast(RoomMessage::PlayerJoined {
            player: player.clone(),
            room: self.snapshot(),
        });
        let events = self.sender.subscribe();

        Ok((player, self.snapshot(), events))
    }

    /// Removes a player from the room, returning their color to the pool. If
    /// the host is removed, the longest-standing member is promoted.
    #[instrument(skip(self))]
    fn rem_player(&mut self, player_id: PlayerId) {
        let Some(player) = self.shared.players.remove(&player_id) else {
            // Leave and disconnect can race, the second removal is a no-op
            tracing::debug!("Attempted to remove player from room who isn't in it");
            return;
        };
        self.colors.restore(player.color);
        tracing::info!("Player {} left room", player.name);

        // Close the room after the last player leaves by closing our receiver.
        // This will cause the run loop to consume all remaining messages,
        // (likely none since the last player just left), and then exit
        if self.shared.players.is_empty() {
            self.receiver.close();
            return;
        }

        if self.shared.host_id == Some(player_id) {
            // Pass host authority along in join order, and ready the new host
            // since hosts are always ready
            let new_host = self
                .shared
                .players
                .values_mut()
                .min_by_key(|p| p.join_order)
                .map(|p| {
                    p.ready = true;
                    p.id
                });
            self.shared.host_id = new_host;
            tracing::info!("Player {:?} is now the host", new_host);
            if let Some(new_host_id) = new_host {
                self.broadcast(RoomMessage::HostChanged {
                    new_host_id,
                    room: self.snapshot(),
                });
            }
        }

        self.broadcast(RoomMessage::PlayerLeft {
            player_id,
            player_name: player.name,
            room: self.snapshot(),
        });
    }

    #[instrument(skip(self))]
    fn select_mode(&mut self, player_id: PlayerId, mode: GameMode) -> RoomResult<()> {
        if !self.shared.is_host(player_id) {
            return Err(RoomError::NeedsHost);
        }
        if self.shared.state != RoomState::Waiting {
            return Err(RoomError::AlreadyStarted);
        }

        self.shared.mode = Some(mode);
        tracing::info!("Game mode set to {mode}");
        self.broadcast(RoomMessage::ModeSelected {
            mode,
            room: self.snapshot(),
        });
        Ok(())
    }

    /// Flips a player's ready flag. The host is always ready, so a toggle from
    /// them is accepted and ignored.
    #[instrument(skip(self))]
    fn toggle_ready(&mut self, player_id: PlayerId) -> RoomResult<()> {
        if self.shared.is_host(player_id) {
            return Ok(());
        }
        if self.shared.state != RoomState::Waiting {
            return Err(RoomError::AlreadyStarted);
        }

        let player = self
            .shared
            .players
            .get_mut(&player_id)
            .ok_or(RoomError::PlayerInvalid(player_id))?;

        player.ready = !player.ready;
        tracing::info!(
            "Player {} is {}ready",
            player.name,
            if player.ready { "" } else { "not " }
        );
        self.broadcast(RoomMessage::RoomUpdated {
            room: self.snapshot(),
        });
        Ok(())
    }

    /// Begins a round with everyone alive in their mode's start formation.
    #[instrument(skip(self))]
    fn start_game(&mut self, player_id: PlayerId) -> RoomResult<()> {
        if !self.shared.is_host(player_id) {
            return Err(RoomError::NeedsHost);
        }
        if self.shared.state != RoomState::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        let mode = self.shared.mode.ok_or(RoomError::ModeNotSelected)?;
        if !self.shared.can_start() {
            return Err(RoomError::PlayersNotReady);
        }

        self.shared.state = RoomState::Playing;
        self.shared.winner = None;
        self.enemies.clear();

        // Positions are assigned here rather than by each client so every
        // member renders the same formation
        let mut roster: Vec<&mut Player> = self.shared.players.values_mut().collect();
        roster.sort_by_key(|p| p.join_order);
        let spots = start_positions(mode, roster.len());
        for (player, position) in roster.into_iter().zip(spots) {
            player.alive = true;
            player.position = position;
        }

        tracing::info!("Round started in {mode} mode");
        self.broadcast(RoomMessage::GameStarted {
            room: self.snapshot(),
        });
        Ok(())
    }

    /// Resets a finished room back to waiting so the same group can go again.
    /// Ready flags and the selected mode survive the reset.
    #[instrument(skip(self))]
    fn restart_game(&mut self, player_id: PlayerId) -> RoomResult<()> {
        if !self.shared.is_host(player_id) {
            return Err(RoomError::NeedsHost);
        }
        if self.shared.state != RoomState::Finished {
            return Err(RoomError::NotFinished);
        }

        self.shared.state = RoomState::Waiting;
        self.shared.winner = None;
        for player in self.shared.players.values_mut() {
            player.alive = true;
            player.position = ARENA_CENTER;
        }

        tracing::info!("Room reset");
        self.broadcast(RoomMessage::RoomUpdated {
            room: self.snapshot(),
        });
        Ok(())
    }

    /// Records and relays a movement report. Reports from the wrong phase or
    /// from dead or unknown players are stale by definition and dropped
    /// without an error.
    fn move_player(&mut self, player_id: PlayerId, position: Position) {
        if self.shared.state != RoomState::Playing {
            return;
        }
        let Some(player) = self.shared.players.get_mut(&player_id) else {
            return;
        };
        if !player.alive {
            return;
        }

        player.position = position;
        self.relay(
            player_id,
            RoomMessage::PlayerMoved {
                player_id,
                position,
            },
        );
    }

    /// Marks a player dead and settles the round once at most one is left.
    #[instrument(skip(self))]
    fn player_died(&mut self, player_id: PlayerId) {
        if self.shared.state != RoomState::Playing {
            return;
        }
        let Some(player) = self.shared.players.get_mut(&player_id) else {
            return;
        };
        if !player.alive {
            // A duplicate report must not re-broadcast or re-settle the round
            return;
        }

        player.alive = false;
        let player_name = player.name.clone();
        tracing::info!("Player {player_name} died");
        self.broadcast(RoomMessage::PlayerDied {
            player_id,
            player_name,
        });

        // Scoped so the roster borrow ends before the writes below
        let outcome = {
            let mut alive = self.shared.alive();
            match (alive.next(), alive.next()) {
                (Some(survivor), None) => Some(Some(Winner {
                    id: survivor.id,
                    name: survivor.name.clone(),
                })),
                (None, _) => Some(None),
                _ => None,
            }
        };

        if let Some(winner) = outcome {
            self.shared.state = RoomState::Finished;
            self.shared.winner = winner.clone();
            match &winner {
                Some(w) => tracing::info!("Round finished, {} wins", w.name),
                None => tracing::info!("Round finished with no survivors"),
            }
            self.broadcast(RoomMessage::GameFinished { winner });
        }
    }

    /// Records a host-minted hazard and broadcasts it, stamped with the wall
    /// clock so receivers can anchor its trajectory to elapsed time. Spawns
    /// from anyone but the shared-arena host are dropped without comment.
    fn spawn_enemy(&mut self, player_id: PlayerId, enemy: Enemy) {
        if self.shared.state != RoomState::Playing
            || self.shared.mode != Some(GameMode::SharedArena)
            || !self.shared.is_host(player_id)
        {
            return;
        }

        self.enemies.push(enemy.clone());
        self.broadcast(RoomMessage::EnemySpawned {
            enemy,
            spawned_at_ms: unix_ms(),
        });
    }
}

/// Current wall clock in unix milliseconds.
fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::time::Duration;

    use dodge_lib::net::{Message, RoomMessage};
    use dodge_lib::player::PALETTE;
    use dodge_lib::room::{GameMode, RoomState};
    use dodge_lib::sync::{Enemy, Position, Velocity, ARENA_CENTER, SPAWN_RING_RADIUS};
    use dodge_lib::{RoomCode, MAX_PLAYERS};
    use tokio::sync::broadcast;
    use tokio::{sync::mpsc, time::timeout};

    use crate::room::{room_handle::RoomHandleProvider, RoomError, RoomEvent};

    use super::RoomActor;

    fn test_code() -> RoomCode {
        "DODGE1".parse().unwrap()
    }

    fn setup() -> RoomActor {
        let (_, rx) = mpsc::channel(2);
        RoomActor::new(rx, test_code().into())
    }

    fn join(actor: &mut RoomActor, id: u32, name: &str) {
        actor.add_player(id.into(), name.to_owned()).unwrap();
    }

    /// Waiting-room boilerplate: a host plus `n - 1` joiners, everyone readied
    /// up and shared-arena selected.
    fn ready_room(n: u32) -> RoomActor {
        let mut actor = setup();
        for i in 0..n {
            join(&mut actor, i, &format!("player-{i}"));
        }
        for i in 1..n {
            actor.toggle_ready(i.into()).unwrap();
        }
        actor.select_mode(0.into(), GameMode::SharedArena).unwrap();
        actor
    }

    fn collect_events(rx: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn hazard() -> Enemy {
        Enemy {
            id: "enemy-1-0".to_owned(),
            position: Position::new(-20.0, 50.0),
            velocity: Velocity { x: 3.0, y: 0.0 },
            size: 15.0,
        }
    }

    #[test]
    fn add_player() {
        let mut actor = setup();

        for i in 0..MAX_PLAYERS as u32 {
            assert!(actor.add_player(i.into(), format!("player-{i}")).is_ok());
            assert!(actor.shared.players.contains_key(&i));
        }
        assert_eq!(actor.shared.host_id, Some(0.into()));

        // Adding a sixth player will fail
        assert!(matches!(
            actor.add_player(9.into(), "latecomer".to_owned()),
            Err(RoomError::RoomFull)
        ));
        assert_eq!(actor.shared.players.len(), MAX_PLAYERS);
    }

    #[test]
    fn creator_is_host_and_ready() {
        let mut actor = setup();
        join(&mut actor, 7, "Ada");

        assert_eq!(actor.shared.host_id, Some(7.into()));
        let ada = actor.shared.players.get(&7).unwrap();
        assert!(ada.ready);
        assert!(ada.alive);
        assert_eq!(ada.color, PALETTE[0]);
        assert_eq!(actor.shared.state, RoomState::Waiting);
    }

    #[test]
    fn joiners_start_not_ready() {
        let mut actor = setup();
        join(&mut actor, 0, "host");
        join(&mut actor, 1, "guest");
        assert!(!actor.shared.players.get(&1).unwrap().ready);
    }

    #[test]
    fn join_after_start_is_rejected() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();

        assert!(matches!(
            actor.add_player(9.into(), "late".to_owned()),
            Err(RoomError::NotJoinable)
        ));
        assert_eq!(actor.shared.players.len(), 2);
    }

    #[test]
    fn joiner_does_not_see_their_own_join() {
        let mut actor = setup();
        join(&mut actor, 0, "host");

        let (_, _, mut events) = actor.add_player(1.into(), "guest".to_owned()).unwrap();
        // The subscription starts after the join broadcast
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn colors_are_unique_and_returned() {
        let mut actor = setup();
        for i in 0..MAX_PLAYERS as u32 {
            join(&mut actor, i, "p");
        }

        let held: HashSet<_> = actor.shared.players.values().map(|p| p.color).collect();
        assert_eq!(held.len(), MAX_PLAYERS);

        // A freed color becomes available to the next joiner
        actor.rem_player(3.into());
        assert!(actor.add_player(9.into(), "p".to_owned()).is_ok());
    }

    #[test]
    fn remove_player() {
        let mut actor = setup();
        join(&mut actor, 0, "a");
        join(&mut actor, 1, "b");

        // Removing the host will assign a new one
        actor.rem_player(0.into());
        assert!(!actor.shared.players.contains_key(&0));
        assert_eq!(actor.shared.host_id, Some(1.into()));

        // Removing an absent player is a no-op
        actor.rem_player(0.into());
        assert_eq!(actor.shared.players.len(), 1);
    }

    #[test]
    fn host_leave_promotes_by_join_order() {
        let mut actor = setup();
        join(&mut actor, 5, "host");
        join(&mut actor, 3, "second");
        join(&mut actor, 8, "third");

        actor.rem_player(5.into());
        assert_eq!(actor.shared.players.len(), 2);
        // Succession follows join order, not id order or map order
        assert_eq!(actor.shared.host_id, Some(3.into()));
        assert!(actor.shared.players.get(&3).unwrap().ready);
    }

    #[test]
    fn host_changed_broadcast_precedes_player_left() {
        let mut actor = setup();
        join(&mut actor, 0, "host");
        join(&mut actor, 1, "guest");

        let mut events = actor.sender.subscribe();
        actor.rem_player(0.into());

        let kinds: Vec<_> = collect_events(&mut events)
            .into_iter()
            .map(|ev| ev.message)
            .collect();
        let host_changed = kinds
            .iter()
            .position(|m| matches!(m, Message::Room(RoomMessage::HostChanged { .. })))
            .unwrap();
        let player_left = kinds
            .iter()
            .position(|m| matches!(m, Message::Room(RoomMessage::PlayerLeft { .. })))
            .unwrap();
        assert!(host_changed < player_left);
    }

    #[test]
    fn select_mode_requires_host() {
        let mut actor = setup();
        join(&mut actor, 0, "host");
        join(&mut actor, 1, "guest");

        assert_eq!(
            actor.select_mode(1.into(), GameMode::SharedArena),
            Err(RoomError::NeedsHost)
        );
        assert!(actor.select_mode(0.into(), GameMode::SharedArena).is_ok());
        assert_eq!(actor.shared.mode, Some(GameMode::SharedArena));
    }

    #[test]
    fn toggle_ready() {
        let mut actor = setup();
        join(&mut actor, 0, "host");
        join(&mut actor, 1, "guest");

        actor.toggle_ready(1.into()).unwrap();
        assert!(actor.shared.players.get(&1).unwrap().ready);
        actor.toggle_ready(1.into()).unwrap();
        assert!(!actor.shared.players.get(&1).unwrap().ready);

        // The host is always ready, their toggle is accepted and ignored
        actor.toggle_ready(0.into()).unwrap();
        assert!(actor.shared.players.get(&0).unwrap().ready);
    }

    #[test]
    fn start_game_gates() {
        let mut actor = setup();
        join(&mut actor, 0, "host");
        join(&mut actor, 1, "guest");

        // Only the host can start a game
        assert_eq!(actor.start_game(1.into()), Err(RoomError::NeedsHost));
        // A mode must be chosen first
        assert_eq!(actor.start_game(0.into()), Err(RoomError::ModeNotSelected));

        actor.select_mode(0.into(), GameMode::BattleRoyale).unwrap();
        // And everyone must be ready
        assert_eq!(actor.start_game(0.into()), Err(RoomError::PlayersNotReady));

        actor.toggle_ready(1.into()).unwrap();
        assert!(actor.start_game(0.into()).is_ok());
        assert_eq!(actor.shared.state, RoomState::Playing);

        // A second start is rejected
        assert_eq!(actor.start_game(0.into()), Err(RoomError::AlreadyStarted));
    }

    #[test]
    fn start_game_broadcasts_once_and_places_players() {
        let mut actor = ready_room(3);

        let mut events = actor.sender.subscribe();
        actor.start_game(0.into()).unwrap();

        let starts = collect_events(&mut events)
            .into_iter()
            .filter(|ev| matches!(ev.message, Message::Room(RoomMessage::GameStarted { .. })))
            .count();
        assert_eq!(starts, 1);

        // Shared arena puts everyone on the spawn ring around the centre
        for player in actor.shared.players.values() {
            assert!(player.alive);
            let radius = player.position.distance(ARENA_CENTER);
            assert!((radius - SPAWN_RING_RADIUS).abs() < 1e-3);
        }
    }

    #[test]
    fn battle_royale_players_start_at_centre() {
        let mut actor = setup();
        join(&mut actor, 0, "a");
        join(&mut actor, 1, "b");
        actor.toggle_ready(1.into()).unwrap();
        actor.select_mode(0.into(), GameMode::BattleRoyale).unwrap();

        actor.start_game(0.into()).unwrap();
        for player in actor.shared.players.values() {
            assert_eq!(player.position, ARENA_CENTER);
        }
    }

    #[test]
    fn movement_is_recorded_and_relayed_from_sender() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        let position = Position::new(120.0, 80.0);
        actor.move_player(1.into(), position);

        assert_eq!(actor.shared.players.get(&1).unwrap().position, position);
        let moved = collect_events(&mut events);
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].origin, Some(1.into()));
        assert!(matches!(
            &moved[0].message,
            Message::Room(RoomMessage::PlayerMoved { player_id, .. }) if *player_id == 1
        ));
    }

    #[test]
    fn movement_ignored_when_not_playing() {
        let mut actor = ready_room(2);
        let before = actor.shared.players.get(&1).unwrap().position;

        let mut events = actor.sender.subscribe();
        actor.move_player(1.into(), Position::new(9.0, 9.0));

        assert_eq!(actor.shared.players.get(&1).unwrap().position, before);
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn dead_players_do_not_move() {
        let mut actor = ready_room(3);
        actor.start_game(0.into()).unwrap();
        actor.player_died(1.into());

        let before = actor.shared.players.get(&1).unwrap().position;
        let mut events = actor.sender.subscribe();
        actor.move_player(1.into(), Position::new(1.0, 1.0));

        assert_eq!(actor.shared.players.get(&1).unwrap().position, before);
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn game_finishes_once_with_last_survivor() {
        let mut actor = ready_room(3);
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        actor.player_died(1.into());
        actor.player_died(2.into());
        // A report for an already-dead player must be inert
        actor.player_died(2.into());

        assert_eq!(actor.shared.state, RoomState::Finished);
        let finishes: Vec<_> = collect_events(&mut events)
            .into_iter()
            .filter_map(|ev| match ev.message {
                Message::Room(RoomMessage::GameFinished { winner }) => Some(winner),
                _ => None,
            })
            .collect();
        assert_eq!(finishes.len(), 1);

        let winner = finishes[0].clone().expect("round had a survivor");
        assert_eq!(winner.id, 0);
        assert_eq!(actor.shared.winner.as_ref().unwrap().id, 0);
    }

    #[test]
    fn solo_round_ends_with_no_winner() {
        let mut actor = ready_room(1);
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        actor.player_died(0.into());

        assert_eq!(actor.shared.state, RoomState::Finished);
        assert!(actor.shared.winner.is_none());
        assert!(collect_events(&mut events).into_iter().any(|ev| matches!(
            ev.message,
            Message::Room(RoomMessage::GameFinished { winner: None })
        )));
    }

    #[test]
    fn straggler_death_after_finish_is_inert() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();
        actor.player_died(1.into());
        assert_eq!(actor.shared.state, RoomState::Finished);

        // A late report for the winner must not disturb the settled round
        let mut events = actor.sender.subscribe();
        actor.player_died(0.into());

        assert_eq!(actor.shared.state, RoomState::Finished);
        assert_eq!(actor.shared.winner.as_ref().unwrap().id, 0);
        assert!(actor.shared.players.get(&0).unwrap().alive);
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn host_spawn_is_broadcast_with_stamp() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        actor.spawn_enemy(0.into(), hazard());

        assert_eq!(actor.enemies.len(), 1);
        let spawned = collect_events(&mut events);
        assert_eq!(spawned.len(), 1);
        // Spawns go to the whole room, the host client ignores its own echo
        assert_eq!(spawned[0].origin, None);
        assert!(matches!(
            &spawned[0].message,
            Message::Room(RoomMessage::EnemySpawned { spawned_at_ms, .. }) if *spawned_at_ms > 0
        ));
    }

    #[test]
    fn non_host_spawn_is_dropped_silently() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        actor.spawn_enemy(1.into(), hazard());

        assert!(actor.enemies.is_empty());
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn spawn_authority_follows_host_migration() {
        let mut actor = ready_room(3);
        actor.start_game(0.into()).unwrap();

        // The host leaves mid-round, passing authority along in join order
        actor.rem_player(0.into());
        assert_eq!(actor.shared.host_id, Some(1.into()));

        let mut events = actor.sender.subscribe();
        // An in-flight spawn from the demoted host is dropped without a trace
        actor.spawn_enemy(0.into(), hazard());
        assert!(actor.enemies.is_empty());

        actor.spawn_enemy(1.into(), hazard());
        assert_eq!(actor.enemies.len(), 1);
        let spawned = collect_events(&mut events);
        assert_eq!(spawned.len(), 1);
        assert!(matches!(
            &spawned[0].message,
            Message::Room(RoomMessage::EnemySpawned { .. })
        ));
    }

    #[test]
    fn spawn_requires_shared_arena() {
        let mut actor = setup();
        join(&mut actor, 0, "a");
        join(&mut actor, 1, "b");
        actor.toggle_ready(1.into()).unwrap();
        actor.select_mode(0.into(), GameMode::BattleRoyale).unwrap();
        actor.start_game(0.into()).unwrap();

        let mut events = actor.sender.subscribe();
        actor.spawn_enemy(0.into(), hazard());

        assert!(actor.enemies.is_empty());
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn spawn_ignored_outside_a_round() {
        let mut actor = ready_room(2);

        let mut events = actor.sender.subscribe();
        actor.spawn_enemy(0.into(), hazard());

        assert!(actor.enemies.is_empty());
        assert!(collect_events(&mut events).is_empty());
    }

    #[test]
    fn restart_resets_a_finished_room() {
        let mut actor = ready_room(2);
        actor.start_game(0.into()).unwrap();

        // Can't restart mid-round
        assert_eq!(actor.restart_game(0.into()), Err(RoomError::NotFinished));

        actor.player_died(1.into());
        assert_eq!(actor.shared.state, RoomState::Finished);

        // Only the host can restart
        assert_eq!(actor.restart_game(1.into()), Err(RoomError::NeedsHost));
        actor.restart_game(0.into()).unwrap();

        assert_eq!(actor.shared.state, RoomState::Waiting);
        assert!(actor.shared.winner.is_none());
        assert!(actor.shared.players.values().all(|p| p.alive));
        // Mode and ready flags survive so the host can start right away
        assert_eq!(actor.shared.mode, Some(GameMode::SharedArena));
        assert!(actor.start_game(0.into()).is_ok());
    }

    #[tokio::test]
    async fn room_dies() {
        let get_room = || {
            let (tx, rx) = mpsc::channel(2);
            let mut actor = RoomActor::new(rx, test_code().into());
            let handle = RoomHandleProvider {
                sender: tx.downgrade(),
            }
            .into_handle(0)
            .unwrap();
            actor.add_player(0.into(), "solo".to_owned()).unwrap();
            (actor, handle)
        };

        // The room will run for as long as handles remain
        {
            let (actor, handle) = get_room();
            timeout(Duration::from_millis(50), actor.run())
                .await
                .expect_err("Room closed with handles still remaining");
            // Explicitly drop handle to ensure it's not dropped early
            drop(handle)
        }

        // The room will die when the last handle (Sender) is dropped
        {
            let (actor, handle) = get_room();

            drop(handle);
            timeout(Duration::from_millis(50), actor.run())
                .await
                .expect("Room failed to close");
        }

        // Alternatively, the room will die when the last player is removed
        {
            let (mut actor, handle) = get_room();

            actor.rem_player(0.into());
            timeout(Duration::from_millis(50), actor.run())
                .await
                .expect("Room failed to close");
            assert_eq!(handle.start_game().await, Err(RoomError::HandleInvalid));
        }
    }
}
