//! Lobby worker: name acceptance, pending games, and game instantiation.
//!
//! A single task owns the pending-game descriptors and is the only writer of
//! the running-games table and of session identities. Connects, game
//! management commands, and disconnects are serialized through its channel;
//! disconnects of players inside a running game are forwarded to that game's
//! worker so they serialize with in-flight claims.

use crate::broadcast::{self, Delivery};
use crate::game::{self, Game, GameCommand, GameContext, GameHandle, GameSettings, SharedGameTable, GAME_QUEUE};
use crate::session::{OutboundSender, SessionId, SessionState, SharedRegistry};
use log::{debug, info};
use shared::{GameSummary, Notification};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the lobby command channel.
pub const LOBBY_QUEUE: usize = 256;

/// Bounds accepted by `create-game`; out-of-range arguments are malformed
/// and ignored.
pub const MAX_ROUNDS: u32 = 50;
pub const MAX_WORDS_COUNT: u32 = 100;

/// Commands consumed by the lobby worker.
#[derive(Debug)]
pub enum LobbyCommand {
    /// New connection: register a session and report its id back.
    Open {
        outbound: OutboundSender,
        reply: oneshot::Sender<SessionId>,
    },
    Connect {
        session_id: SessionId,
        name: String,
    },
    CreateGame {
        session_id: SessionId,
        settings: GameSettings,
    },
    DeleteGame {
        session_id: SessionId,
    },
    JoinGame {
        session_id: SessionId,
        game_id: u64,
    },
    LeaveGame {
        session_id: SessionId,
    },
    StartGame {
        session_id: SessionId,
    },
    /// Connection closed (or declared dead by an overflowing critical send).
    Disconnect {
        session_id: SessionId,
    },
    /// A player quit a finished game and is back in the lobby.
    PlayerReturned {
        session_id: SessionId,
    },
    /// A game destroyed itself.
    GameEnded {
        game_id: u64,
    },
}

/// A created-but-not-started game, joinable from the lobby.
#[derive(Debug, Clone)]
pub struct GameDescriptor {
    pub id: u64,
    pub creator_session: SessionId,
    pub creator: String,
    pub settings: GameSettings,
    /// Players in join order, creator first.
    pub players: Vec<(SessionId, String)>,
}

impl GameDescriptor {
    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            creator: self.creator.clone(),
            mode: self.settings.mode,
            style: self.settings.style,
            rounds: self.settings.rounds,
            words_count: self.settings.words_count,
            language: self.settings.language,
            difficulty: self.settings.difficulty,
            players: self.players.iter().map(|(_, n)| n.clone()).collect(),
        }
    }
}

/// Lobby state, owned by its worker task.
pub struct Lobby {
    registry: SharedRegistry,
    games: SharedGameTable,
    pending: HashMap<u64, GameDescriptor>,
    next_game_id: u64,
    game_ctx: GameContext,
    max_name_len: usize,
}

impl Lobby {
    pub fn new(
        registry: SharedRegistry,
        games: SharedGameTable,
        game_ctx: GameContext,
        max_name_len: usize,
    ) -> Self {
        Self {
            registry,
            games,
            pending: HashMap::new(),
            next_game_id: 1,
            game_ctx,
            max_name_len,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn handle(&mut self, command: LobbyCommand) {
        match command {
            LobbyCommand::Open { outbound, reply } => self.on_open(outbound, reply),
            LobbyCommand::Connect { session_id, name } => self.on_connect(session_id, name),
            LobbyCommand::CreateGame {
                session_id,
                settings,
            } => self.on_create_game(session_id, settings),
            LobbyCommand::DeleteGame { session_id } => self.on_delete_game(session_id),
            LobbyCommand::JoinGame {
                session_id,
                game_id,
            } => self.on_join_game(session_id, game_id),
            LobbyCommand::LeaveGame { session_id } => self.on_leave_game(session_id),
            LobbyCommand::StartGame { session_id } => self.on_start_game(session_id),
            LobbyCommand::Disconnect { session_id } => self.on_disconnect(session_id),
            LobbyCommand::PlayerReturned { session_id } => self.on_player_returned(session_id),
            LobbyCommand::GameEnded { game_id } => self.on_game_ended(game_id),
        }
    }

    fn on_open(&mut self, outbound: OutboundSender, reply: oneshot::Sender<SessionId>) {
        let session_id = self.registry.write().add_session(outbound);
        // The connection may already be gone; its disconnect will clean up.
        let _ = reply.send(session_id);
    }

    /// Name acceptance: length, shape, uniqueness, in that order. On success
    /// the fresh games list goes to this session only.
    fn on_connect(&mut self, session_id: SessionId, name: String) {
        let (state, outbound) = {
            let registry = self.registry.read();
            match registry.get(session_id) {
                Some(s) => (s.state, s.outbound.clone()),
                None => return,
            }
        };
        if state != SessionState::Unidentified {
            return;
        }

        if name.chars().count() > self.max_name_len {
            self.reply_or_drop(session_id, &outbound, &Notification::TooLongName);
            return;
        }
        if name.is_empty() || name.chars().any(|c| c.is_whitespace()) {
            self.reply_or_drop(session_id, &outbound, &Notification::IncorrectName);
            return;
        }
        if self.registry.read().name_in_use(&name) {
            self.reply_or_drop(session_id, &outbound, &Notification::UsedName);
            return;
        }

        self.registry.write().set_identified(session_id, name);
        let games = Notification::GamesList {
            games: self.summaries(),
        };
        self.reply_or_drop(session_id, &outbound, &games);
    }

    fn on_create_game(&mut self, session_id: SessionId, settings: GameSettings) {
        if self.state_of(session_id) != Some(SessionState::Identified) {
            return;
        }
        if settings.rounds == 0
            || settings.rounds > MAX_ROUNDS
            || settings.words_count == 0
            || settings.words_count > MAX_WORDS_COUNT
        {
            debug!(
                "Session {}: create-game out of range ({} rounds, {} words)",
                session_id, settings.rounds, settings.words_count
            );
            return;
        }
        let Some(name) = self.registry.read().name_of(session_id) else {
            return;
        };

        let id = self.next_game_id;
        self.next_game_id += 1;
        let descriptor = GameDescriptor {
            id,
            creator_session: session_id,
            creator: name.clone(),
            settings,
            players: vec![(session_id, name.clone())],
        };
        self.pending.insert(id, descriptor);
        {
            let mut registry = self.registry.write();
            registry.set_state(session_id, SessionState::Created);
            registry.set_game(session_id, id);
        }
        info!("Game {} created by {} ({} mode)", id, name, settings.mode);
        self.broadcast_games_list();
    }

    fn on_delete_game(&mut self, session_id: SessionId) {
        let Some((SessionState::Created, game_id)) = self.route_info(session_id) else {
            return;
        };
        match self.pending.get(&game_id) {
            Some(d) if d.creator_session == session_id => {}
            _ => return,
        }
        let Some(descriptor) = self.pending.remove(&game_id) else {
            return;
        };

        {
            let mut registry = self.registry.write();
            for (player_id, _) in &descriptor.players {
                registry.set_state(*player_id, SessionState::Identified);
                registry.set_game(*player_id, 0);
            }
        }
        info!("Game {} deleted by {}", game_id, descriptor.creator);
        self.broadcast_games_list();
    }

    fn on_join_game(&mut self, session_id: SessionId, game_id: u64) {
        if self.state_of(session_id) != Some(SessionState::Identified) {
            return;
        }
        let Some(name) = self.registry.read().name_of(session_id) else {
            return;
        };
        // Joining a game that already started (or never existed) is stale
        // client state: ignored.
        let Some(descriptor) = self.pending.get_mut(&game_id) else {
            return;
        };

        descriptor.players.push((session_id, name.clone()));
        {
            let mut registry = self.registry.write();
            registry.set_state(session_id, SessionState::Joined);
            registry.set_game(session_id, game_id);
        }
        info!("{} joined game {}", name, game_id);
        self.broadcast_games_list();
    }

    fn on_leave_game(&mut self, session_id: SessionId) {
        let Some((SessionState::Joined, game_id)) = self.route_info(session_id) else {
            return;
        };
        if let Some(descriptor) = self.pending.get_mut(&game_id) {
            descriptor.players.retain(|(id, _)| *id != session_id);
        }
        {
            let mut registry = self.registry.write();
            registry.set_state(session_id, SessionState::Identified);
            registry.set_game(session_id, 0);
        }
        self.broadcast_games_list();
    }

    /// Promotes a pending descriptor to a running game: spawns the worker,
    /// publishes its handle, and refreshes the lobby view.
    fn on_start_game(&mut self, session_id: SessionId) {
        let Some((SessionState::Created, game_id)) = self.route_info(session_id) else {
            return;
        };
        match self.pending.get(&game_id) {
            Some(d) if d.creator_session == session_id => {}
            _ => return,
        }
        let Some(descriptor) = self.pending.remove(&game_id) else {
            return;
        };

        let (tx, rx) = mpsc::channel(GAME_QUEUE);
        let game = Game::new(
            game_id,
            descriptor.creator.clone(),
            descriptor.players.clone(),
            descriptor.settings,
            self.game_ctx.clone(),
            tx.clone(),
        );
        self.games
            .write()
            .insert(game_id, GameHandle { id: game_id, tx });

        // Mark the players before the worker's first broadcast so they drop
        // out of the lobby view right away.
        {
            let mut registry = self.registry.write();
            for (player_id, _) in &descriptor.players {
                registry.set_state(*player_id, SessionState::Started);
            }
        }
        info!(
            "Game {} started by {} with {} players",
            game_id,
            descriptor.creator,
            descriptor.players.len()
        );
        tokio::spawn(game::run(game, rx));
        self.broadcast_games_list();
    }

    /// Connection loss. Lobby-state sessions are cleaned up here; players of
    /// running games are handed to their game worker, which owns the rest.
    fn on_disconnect(&mut self, session_id: SessionId) {
        match self.route_info(session_id) {
            None => {}
            Some((SessionState::Unidentified | SessionState::Identified, _)) => {
                self.registry.write().remove(session_id);
            }
            Some((SessionState::Created, game_id)) => {
                self.registry.write().remove(session_id);
                if let Some(descriptor) = self.pending.remove(&game_id) {
                    let mut registry = self.registry.write();
                    for (player_id, _) in &descriptor.players {
                        if *player_id != session_id {
                            registry.set_state(*player_id, SessionState::Identified);
                            registry.set_game(*player_id, 0);
                        }
                    }
                    info!("Game {} dropped, creator disconnected", game_id);
                }
                self.broadcast_games_list();
            }
            Some((SessionState::Joined, game_id)) => {
                self.registry.write().remove(session_id);
                if let Some(descriptor) = self.pending.get_mut(&game_id) {
                    descriptor.players.retain(|(id, _)| *id != session_id);
                }
                self.broadcast_games_list();
            }
            Some((_, game_id)) => {
                let handle = self.games.read().get(&game_id).cloned();
                match handle {
                    Some(handle) => {
                        // Serialize with the game's own commands; never block
                        // the lobby on a busy game channel.
                        let tx = handle.tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(GameCommand::Disconnect { session_id }).await;
                        });
                    }
                    None => {
                        // Game already gone; just drop the session.
                        self.registry.write().remove(session_id);
                    }
                }
            }
        }
    }

    fn on_player_returned(&mut self, session_id: SessionId) {
        let Some(outbound) = self.registry.read().outbound_of(session_id) else {
            return;
        };
        let games = Notification::GamesList {
            games: self.summaries(),
        };
        self.reply_or_drop(session_id, &outbound, &games);
    }

    fn on_game_ended(&mut self, game_id: u64) {
        self.games.write().remove(&game_id);
        info!("Game {} removed from running set", game_id);
        self.broadcast_games_list();
    }

    /// Pending games in id order, for a deterministic lobby view.
    fn summaries(&self) -> Vec<GameSummary> {
        let mut summaries: Vec<GameSummary> =
            self.pending.values().map(|d| d.summary()).collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Sends the pending-games list to everyone in a lobby state. Sessions
    /// whose queue rejects it are treated as disconnected.
    fn broadcast_games_list(&mut self) {
        let notification = Notification::GamesList {
            games: self.summaries(),
        };
        let targets = self.registry.read().lobby_targets();
        let dead = broadcast::send_to_many(&targets, &notification, Delivery::Critical);
        for session_id in dead {
            self.on_disconnect(session_id);
        }
    }

    /// Single-frame reply; an undeliverable reply disconnects the session.
    fn reply_or_drop(
        &mut self,
        session_id: SessionId,
        outbound: &OutboundSender,
        notification: &Notification,
    ) {
        if !broadcast::send_one(outbound, notification) {
            debug!("Session {}: reply undeliverable, dropping", session_id);
            self.on_disconnect(session_id);
        }
    }

    fn state_of(&self, session_id: SessionId) -> Option<SessionState> {
        self.route_info(session_id).map(|(state, _)| state)
    }

    fn route_info(&self, session_id: SessionId) -> Option<(SessionState, u64)> {
        self.registry.read().route_info(session_id)
    }
}

/// Worker loop; runs until the server shuts down (all command senders gone).
pub async fn run(mut lobby: Lobby, mut rx: mpsc::Receiver<LobbyCommand>) {
    while let Some(command) = rx.recv().await {
        lobby.handle(command);
    }
}
