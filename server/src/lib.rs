//! # Typing Competition Server
//!
//! Authoritative server core for the real-time multiplayer typing
//! competition. Connected players enter a shared lobby, create or join game
//! rooms, and play synchronized rounds racing to type words (or solve small
//! arithmetic expressions) first. The server owns all state that matters:
//! identity uniqueness, room membership, word assignment, scoring, round
//! lifecycle, and the fan-out of state deltas.
//!
//! ## Architecture
//!
//! One worker task per concern, connected by channels:
//!
//! - Connection tasks ([`connection`]) adapt TCP and WebSocket sockets into
//!   command lines in and JSON frames out, consulting the per-session
//!   protocol FSM ([`router`]) for every inbound frame.
//! - The lobby worker ([`lobby`]) serializes name acceptance, pending-game
//!   management, and disconnect routing.
//! - One worker per running game ([`game`]) serializes claims, timers, and
//!   player departures over that game's state; games run in parallel with
//!   each other.
//! - Timers ([`scheduler`]) re-enter their game's worker as commands carrying
//!   the round epoch they were armed under; a stale epoch retires them.
//!
//! Shared read-mostly state, the session registry and the running-games
//! table, lives behind short-lived `parking_lot` locks that are never held
//! across an await point.

pub mod broadcast;
pub mod connection;
pub mod game;
pub mod lobby;
pub mod router;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod topscores;
pub mod utils;
pub mod words;

use crate::connection::ServerState;
use crate::game::{GameContext, GameTiming};
use crate::lobby::{Lobby, LOBBY_QUEUE};
use crate::topscores::{MemoryTopScores, TopScoreSink};
use crate::utils::{Clock, SystemClock};
use crate::words::{ArithmeticGenerator, BuiltinDictionary, CalculusProvider, DictionaryProvider};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default display-name length limit.
pub const DEFAULT_MAX_NAME_LEN: usize = 16;

/// Server assembly knobs. Production uses the defaults; tests swap in fixed
/// word providers, a manual clock, and millisecond timing.
pub struct ServerConfig {
    pub max_name_len: usize,
    pub timing: GameTiming,
    pub clock: Arc<dyn Clock>,
    pub dictionary: Arc<dyn DictionaryProvider>,
    pub calculus: Arc<dyn CalculusProvider>,
    pub top_scores: Arc<dyn TopScoreSink>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            timing: GameTiming::default(),
            clock: Arc::new(SystemClock),
            dictionary: Arc::new(BuiltinDictionary),
            calculus: Arc::new(ArithmeticGenerator),
            top_scores: Arc::new(MemoryTopScores::new()),
        }
    }
}

/// Builds the shared state and spawns the lobby worker. Must be called from
/// within a tokio runtime; the returned state feeds the accept loops in
/// [`connection`].
pub fn start(config: ServerConfig) -> Arc<ServerState> {
    let registry = session::shared_registry();
    let games = game::shared_game_table();
    let (lobby_tx, lobby_rx) = mpsc::channel(LOBBY_QUEUE);

    let game_ctx = GameContext {
        registry: registry.clone(),
        clock: config.clock,
        dictionary: config.dictionary,
        calculus: config.calculus,
        top_scores: config.top_scores,
        timing: config.timing,
        lobby_tx: lobby_tx.clone(),
    };
    let lobby = Lobby::new(
        registry.clone(),
        games.clone(),
        game_ctx,
        config.max_name_len,
    );
    tokio::spawn(lobby::run(lobby, lobby_rx));

    Arc::new(ServerState {
        registry,
        games,
        lobby_tx,
    })
}
