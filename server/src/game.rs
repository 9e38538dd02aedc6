//! Per-game worker: round lifecycle, claim arbitration, and collapse.
//!
//! Every running game is one tokio task owning a [`Game`] and draining a
//! [`GameCommand`] channel. Claims, start-round requests, disconnects, and
//! timer callbacks all arrive through that channel, so everything that
//! touches a game's state is serialized by construction; games only run in
//! parallel with *each other*.
//!
//! Timers are never cancelled. Each scheduled command carries the round epoch
//! it was created under and is discarded on arrival if the game's epoch has
//! moved on. Ending a round bumps the epoch, which is what retires the
//! pending expiration timer.

use crate::broadcast::{self, Delivery};
use crate::lobby::LobbyCommand;
use crate::scheduler;
use crate::scoring;
use crate::session::{OutboundSender, SessionId, SessionState, SharedRegistry};
use crate::topscores::TopScoreSink;
use crate::utils::Clock;
use crate::words::{CalculusProvider, DictionaryProvider};
use log::{debug, info, warn};
use parking_lot::RwLock;
use shared::{Difficulty, GameMode, Language, Notification, Score, Word, WordStyle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of a game's command channel.
pub const GAME_QUEUE: usize = 64;

/// Everything a client can make happen inside a running game, plus the two
/// timer callbacks.
#[derive(Debug)]
pub enum GameCommand {
    StartRound { session_id: SessionId },
    Claim { session_id: SessionId, label: String },
    Quit { session_id: SessionId },
    Disconnect { session_id: SessionId },
    CountdownElapsed { epoch: u64 },
    RoundExpired { epoch: u64 },
}

/// Entry of the running-games table: how to reach a game's worker.
#[derive(Clone)]
pub struct GameHandle {
    pub id: u64,
    pub tx: mpsc::Sender<GameCommand>,
}

/// Table resolving a game id to its worker, written by the lobby and read by
/// the session router.
pub type SharedGameTable = Arc<RwLock<HashMap<u64, GameHandle>>>;

pub fn shared_game_table() -> SharedGameTable {
    Arc::new(RwLock::new(HashMap::new()))
}

/// The parameters a creator declares with `create-game`.
#[derive(Debug, Clone, Copy)]
pub struct GameSettings {
    pub mode: GameMode,
    pub style: WordStyle,
    pub rounds: u32,
    pub words_count: u32,
    pub language: Language,
    pub difficulty: Difficulty,
}

/// Round timing. Production values are fixed by the protocol; tests shrink
/// them to milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct GameTiming {
    /// Pause between `game-start` and the words appearing.
    pub countdown: Duration,
    /// Base time budget per declared word; scaled by the style factor.
    pub word_time: Duration,
}

impl Default for GameTiming {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(5),
            word_time: Duration::from_secs(3),
        }
    }
}

impl GameTiming {
    /// How long a round may run before it expires. Derived only from the
    /// style and the declared word count, so it is reproducible.
    pub fn round_expiration(&self, style: WordStyle, declared_words: u32) -> Duration {
        let factor = match style {
            WordStyle::Regular => 1,
            WordStyle::Hidden => 2,
            WordStyle::Calculus => 2,
        };
        self.word_time * declared_words.max(1) * factor
    }
}

/// Collaborators a game needs, shared by all games of the server.
#[derive(Clone)]
pub struct GameContext {
    pub registry: SharedRegistry,
    pub clock: Arc<dyn Clock>,
    pub dictionary: Arc<dyn DictionaryProvider>,
    pub calculus: Arc<dyn CalculusProvider>,
    pub top_scores: Arc<dyn TopScoreSink>,
    pub timing: GameTiming,
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
}

/// Where a game currently is in its round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Countdown,
    Playing,
    RoundEnd,
}

/// Outcome of removing a player.
enum Removal {
    NotPresent,
    Removed,
    /// The game lost its last player and destroyed itself.
    Empty,
}

/// A running game. Owned exclusively by its worker task.
pub struct Game {
    id: u64,
    settings: GameSettings,
    manager: String,
    /// Players in join order; `scores` is index-parallel.
    players: Vec<(SessionId, String)>,
    scores: Vec<Score>,
    /// Shared word pool; used in Capture mode only.
    words: Vec<Word>,
    /// Private per-player copies of the generated list; Race mode only.
    boards: HashMap<SessionId, Vec<Word>>,
    round_id: u32,
    round_epoch: u64,
    round_start_millis: u64,
    effective_words_count: u32,
    phase: GamePhase,
    game_over: bool,
    ctx: GameContext,
    self_tx: mpsc::Sender<GameCommand>,
}

impl Game {
    pub fn new(
        id: u64,
        manager: String,
        players: Vec<(SessionId, String)>,
        settings: GameSettings,
        ctx: GameContext,
        self_tx: mpsc::Sender<GameCommand>,
    ) -> Self {
        let effective_words_count = settings
            .mode
            .effective_words_count(settings.words_count, players.len());
        let scores = players
            .iter()
            .map(|(_, name)| Score::new(name.clone()))
            .collect();

        Self {
            id,
            settings,
            manager,
            players,
            scores,
            words: Vec::new(),
            boards: HashMap::new(),
            round_id: 0,
            round_epoch: 0,
            round_start_millis: 0,
            effective_words_count,
            phase: GamePhase::RoundEnd,
            game_over: false,
            ctx,
            self_tx,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn round_id(&self) -> u32 {
        self.round_id
    }

    pub fn round_epoch(&self) -> u64 {
        self.round_epoch
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn board_of(&self, session_id: SessionId) -> Option<&[Word]> {
        self.boards.get(&session_id).map(|b| b.as_slice())
    }

    pub fn scores(&self) -> &[Score] {
        &self.scores
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|(_, name)| name.clone()).collect()
    }

    /// Opens the next round: bumps the round id and epoch, clears per-round
    /// scores, announces `game-start`, and arms the countdown timer.
    /// Returns false if the game destroyed itself (all players unreachable).
    pub fn start_countdown(&mut self) -> bool {
        eprintln!("DEBUG start_countdown called, players={}", self.players.len());
        self.round_id += 1;
        for score in &mut self.scores {
            score.reset_points();
        }
        self.phase = GamePhase::Countdown;
        self.round_epoch += 1;
        let epoch = self.round_epoch;
        self.set_session_states(SessionState::Started);

        info!(
            "Game {}: round {} countdown ({} players)",
            self.id,
            self.round_id,
            self.players.len()
        );

        let notification = Notification::GameStart {
            id: self.id,
            mode: self.settings.mode,
            style: self.settings.style,
            rounds: self.settings.rounds,
            round_id: self.round_id,
            words_count: self.settings.words_count,
            language: self.settings.language,
            difficulty: self.settings.difficulty,
            players: self.player_names(),
            manager: self.manager.clone(),
            countdown_seconds: self.ctx.timing.countdown.as_secs(),
        };
        let dead = self.broadcast(&notification, Delivery::Critical);

        scheduler::schedule(
            self.ctx.timing.countdown,
            self.self_tx.clone(),
            GameCommand::CountdownElapsed { epoch },
        );

        self.drain_dead(dead)
    }

    /// Countdown timer callback: generates the words and opens play.
    pub fn on_countdown_elapsed(&mut self, epoch: u64) -> bool {
        eprintln!("DEBUG on_countdown_elapsed called epoch={} self.round_epoch={}", epoch, self.round_epoch);
        if epoch != self.round_epoch {
            debug!("Game {}: stale countdown timer (epoch {})", self.id, epoch);
            return true;
        }
        if self.phase != GamePhase::Countdown {
            return true;
        }

        let requested = self.effective_words_count;
        let generated = match self.settings.style {
            WordStyle::Calculus => self
                .ctx
                .calculus
                .generate(requested, self.settings.difficulty),
            _ => self.ctx.dictionary.generate(
                self.settings.language,
                requested,
                self.settings.style,
                self.settings.difficulty,
            ),
        };
        if generated.len() < requested as usize {
            warn!(
                "Game {}: provider returned {} of {} words, round shortened",
                self.id,
                generated.len(),
                requested
            );
        }

        match self.settings.mode {
            GameMode::Capture => {
                self.words = generated;
                self.boards.clear();
            }
            GameMode::Race => {
                // Every player races through a private copy of the full list.
                self.words.clear();
                self.boards = self
                    .players
                    .iter()
                    .map(|(id, _)| (*id, generated.clone()))
                    .collect();
            }
        }
        self.round_start_millis = self.ctx.clock.now_millis();
        self.phase = GamePhase::Playing;
        self.set_session_states(SessionState::Running);

        let dead = self.broadcast_words(Delivery::Critical);

        scheduler::schedule(
            self.ctx
                .timing
                .round_expiration(self.settings.style, self.settings.words_count),
            self.self_tx.clone(),
            GameCommand::RoundExpired { epoch },
        );

        self.drain_dead(dead)
    }

    /// Claim arbitration. Commands are processed serially on this worker, so
    /// the first claim to arrive wins; later claims for the same label are
    /// dropped without a reply.
    pub fn on_claim(&mut self, session_id: SessionId, label: &str) -> bool {
        if self.phase != GamePhase::Playing {
            return true;
        }
        let Some(name) = self.name_of(session_id) else {
            return true;
        };
        match self.settings.mode {
            GameMode::Capture => self.claim_shared(&name, label),
            GameMode::Race => self.claim_on_board(session_id, &name, label),
        }
    }

    /// Capture: one contested pool; the round ends when it is exhausted.
    fn claim_shared(&mut self, name: &str, label: &str) -> bool {
        let Some(word) = self.words.iter_mut().find(|w| w.label == label) else {
            debug!("Game {}: claim for unknown label {:?}", self.id, label);
            return true;
        };
        if word.is_claimed() {
            debug!(
                "Game {}: late claim of {:?} by {} (held by {})",
                self.id, label, name, word.claimed_by
            );
            return true;
        }
        word.claimed_by = name.to_string();
        self.award_point(name);
        debug!("Game {}: {} claimed {:?}", self.id, name, label);

        // Per-claim refresh; losing one under backpressure is fine because
        // the next claim or the scores frame supersedes it.
        let _ = self.broadcast_words(Delivery::Droppable);

        if self.words.iter().all(|w| w.is_claimed()) {
            return self.end_round();
        }
        true
    }

    /// Race: claims only touch the claimant's private board, so every player
    /// can claim the same label once. The round ends when one player has
    /// finished their board.
    fn claim_on_board(&mut self, session_id: SessionId, name: &str, label: &str) -> bool {
        let Some(board) = self.boards.get_mut(&session_id) else {
            return true;
        };
        let Some(word) = board.iter_mut().find(|w| w.label == label) else {
            debug!("Game {}: claim for unknown label {:?}", self.id, label);
            return true;
        };
        if word.is_claimed() {
            debug!(
                "Game {}: {} already claimed {:?} on their board",
                self.id, name, label
            );
            return true;
        }
        word.claimed_by = name.to_string();
        let board_done = board.iter().all(|w| w.is_claimed());
        self.award_point(name);
        debug!("Game {}: {} claimed {:?} on their board", self.id, name, label);

        // Nothing changed for anyone else; refresh the claimant's view only.
        let outbound = self.ctx.registry.read().outbound_of(session_id);
        if let Some(outbound) = outbound {
            let _ = broadcast::send_one(
                &outbound,
                &Notification::WordsList {
                    words: self.boards.get(&session_id).cloned().unwrap_or_default(),
                },
            );
        }

        if board_done {
            return self.end_round();
        }
        true
    }

    fn award_point(&mut self, name: &str) {
        if let Some(score) = self.scores.iter_mut().find(|s| s.user_name == name) {
            score.points += 1;
        }
    }

    /// Expiration timer callback: the timeout terminates the round with
    /// whatever has been claimed.
    pub fn on_round_expired(&mut self, epoch: u64) -> bool {
        if epoch != self.round_epoch {
            return true;
        }
        if self.phase != GamePhase::Playing {
            return true;
        }
        info!("Game {}: round {} expired", self.id, self.round_id);
        self.end_round()
    }

    /// Manager's request to open the next round.
    pub fn on_start_round(&mut self, session_id: SessionId) -> bool {
        if self.phase != GamePhase::RoundEnd || self.game_over {
            return true;
        }
        match self.name_of(session_id) {
            Some(name) if name == self.manager => self.start_countdown(),
            _ => true,
        }
    }

    /// A player leaving a finished game back to the lobby. Ignored while the
    /// game is still running.
    pub fn on_quit(&mut self, session_id: SessionId) -> bool {
        if !self.game_over {
            return true;
        }
        let mut pending = Vec::new();
        match self.remove_player(session_id, false, &mut pending) {
            Removal::NotPresent => true,
            Removal::Removed => {
                self.notify_lobby(LobbyCommand::PlayerReturned { session_id });
                self.drain_dead(pending)
            }
            Removal::Empty => {
                self.notify_lobby(LobbyCommand::PlayerReturned { session_id });
                false
            }
        }
    }

    /// Connection loss of a player, in any phase. Elects a new manager when
    /// needed and destroys the game when the last player is gone.
    pub fn on_disconnect(&mut self, session_id: SessionId) -> bool {
        let mut pending = Vec::new();
        match self.remove_player(session_id, true, &mut pending) {
            Removal::NotPresent => true,
            Removal::Removed => self.drain_dead(pending),
            Removal::Empty => false,
        }
    }

    /// Closes the round: retires the expiration timer via the epoch, scores
    /// everyone, awards the round victory, and broadcasts `scores`.
    fn end_round(&mut self) -> bool {
        self.round_epoch += 1;
        let now = self.ctx.clock.now_millis();
        let elapsed = now.saturating_sub(self.round_start_millis);

        for score in &mut self.scores {
            score.speed = scoring::compute_speed(score.points, elapsed);
            if score.speed > score.best_speed {
                score.best_speed = score.speed;
            }
        }

        // The round winner is decided before the victory is recorded; ties at
        // zero resolve by join order through the stable sort.
        let provisional = scoring::sorted_round_scores(&self.scores);
        if let Some(winner) = provisional.first() {
            let winner_name = winner.user_name.clone();
            if let Some(score) = self
                .scores
                .iter_mut()
                .find(|s| s.user_name == winner_name)
            {
                score.victories += 1;
                score.latest_victory_timestamp = now;
            }
        }

        let round_scores = scoring::sorted_round_scores(&self.scores);
        let game_scores = scoring::sorted_game_scores(&self.scores);
        self.game_over = scoring::is_game_over(&game_scores, self.settings.rounds);
        self.phase = GamePhase::RoundEnd;
        self.set_session_states(SessionState::EndRound);

        info!(
            "Game {}: round {} over after {} ms, winner {}, game_over={}",
            self.id,
            self.round_id,
            elapsed,
            round_scores
                .first()
                .map(|s| s.user_name.as_str())
                .unwrap_or("-"),
            self.game_over
        );

        let dead = match self.settings.mode {
            GameMode::Capture => self.broadcast(
                &Notification::Scores {
                    round_scores: round_scores.clone(),
                    game_scores: game_scores.clone(),
                    manager: self.manager.clone(),
                    round_duration: elapsed,
                    game_over: self.game_over,
                    words: self.words.clone(),
                },
                Delivery::Critical,
            ),
            GameMode::Race => {
                // Scores are shared; the revealed words are each player's
                // own board.
                let mut dead = Vec::new();
                for (session_id, outbound) in self.player_outbounds() {
                    let notification = Notification::Scores {
                        round_scores: round_scores.clone(),
                        game_scores: game_scores.clone(),
                        manager: self.manager.clone(),
                        round_duration: elapsed,
                        game_over: self.game_over,
                        words: self.boards.get(&session_id).cloned().unwrap_or_default(),
                    };
                    if !broadcast::send_one(&outbound, &notification) {
                        dead.push(session_id);
                    }
                }
                dead
            }
        };

        if let Err(err) = self.ctx.top_scores.record(
            self.settings.style,
            self.settings.language,
            self.settings.difficulty,
            &round_scores,
            self.effective_words_count,
        ) {
            warn!("Game {}: top-score sink failed: {}", self.id, err);
        }

        self.drain_dead(dead)
    }

    /// Removes one player. `disconnected` decides whether the session entry
    /// is destroyed (socket gone) or returned to the lobby (quit). Dead
    /// sessions discovered while broadcasting the manager change are pushed
    /// onto `pending`.
    fn remove_player(
        &mut self,
        session_id: SessionId,
        disconnected: bool,
        pending: &mut Vec<SessionId>,
    ) -> Removal {
        let Some(index) = self.players.iter().position(|(id, _)| *id == session_id) else {
            return Removal::NotPresent;
        };
        let (_, name) = self.players.remove(index);
        self.scores.remove(index);
        self.boards.remove(&session_id);

        {
            let mut registry = self.ctx.registry.write();
            if disconnected {
                registry.remove(session_id);
            } else {
                registry.set_state(session_id, SessionState::Identified);
                registry.set_game(session_id, 0);
            }
        }
        info!(
            "Game {}: {} left ({} remain)",
            self.id,
            name,
            self.players.len()
        );

        if self.players.is_empty() {
            self.destroy();
            return Removal::Empty;
        }

        if name == self.manager {
            self.manager = self.players[0].1.clone();
            info!("Game {}: manager is now {}", self.id, self.manager);
            let dead = self.broadcast(
                &Notification::Manager {
                    manager: self.manager.clone(),
                },
                Delivery::Critical,
            );
            pending.extend(dead);
        }

        Removal::Removed
    }

    /// Processes sessions whose outbound queue rejected a critical frame.
    /// They are treated exactly like disconnects.
    fn drain_dead(&mut self, mut pending: Vec<SessionId>) -> bool {
        while let Some(session_id) = pending.pop() {
            if let Removal::Empty = self.remove_player(session_id, true, &mut pending) {
                return false;
            }
        }
        true
    }

    /// Last player gone: retire any in-flight timers and hand the id back to
    /// the lobby.
    fn destroy(&mut self) {
        self.round_epoch += 1;
        info!("Game {} destroyed", self.id);
        self.notify_lobby(LobbyCommand::GameEnded { game_id: self.id });
    }

    fn notify_lobby(&self, command: LobbyCommand) {
        let tx = self.ctx.lobby_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(command).await;
        });
    }

    fn name_of(&self, session_id: SessionId) -> Option<String> {
        self.players
            .iter()
            .find(|(id, _)| *id == session_id)
            .map(|(_, name)| name.clone())
    }

    fn set_session_states(&self, state: SessionState) {
        let mut registry = self.ctx.registry.write();
        for (session_id, _) in &self.players {
            registry.set_state(*session_id, state);
        }
    }

    fn broadcast(&self, notification: &Notification, delivery: Delivery) -> Vec<SessionId> {
        let targets = self.player_outbounds();
        broadcast::send_to_many(&targets, notification, delivery)
    }

    /// Sends every player their current view of the round's words: the
    /// shared pool in Capture (one frame for everyone), their private board
    /// in Race (one frame per player).
    fn broadcast_words(&self, delivery: Delivery) -> Vec<SessionId> {
        match self.settings.mode {
            GameMode::Capture => self.broadcast(
                &Notification::WordsList {
                    words: self.words.clone(),
                },
                delivery,
            ),
            GameMode::Race => {
                let mut dead = Vec::new();
                for (session_id, outbound) in self.player_outbounds() {
                    let notification = Notification::WordsList {
                        words: self.boards.get(&session_id).cloned().unwrap_or_default(),
                    };
                    if !broadcast::send_one(&outbound, &notification)
                        && delivery == Delivery::Critical
                    {
                        dead.push(session_id);
                    }
                }
                dead
            }
        }
    }

    fn player_outbounds(&self) -> Vec<(SessionId, OutboundSender)> {
        let registry = self.ctx.registry.read();
        self.players
            .iter()
            .filter_map(|(id, _)| registry.outbound_of(*id).map(|out| (*id, out)))
            .collect()
    }
}

/// Worker loop. Runs the first countdown immediately, then serializes every
/// command until the game destroys itself.
pub async fn run(mut game: Game, mut rx: mpsc::Receiver<GameCommand>) {
    if !game.start_countdown() {
        return;
    }
    while let Some(command) = rx.recv().await {
        let alive = match command {
            GameCommand::StartRound { session_id } => game.on_start_round(session_id),
            GameCommand::Claim { session_id, label } => game.on_claim(session_id, &label),
            GameCommand::Quit { session_id } => game.on_quit(session_id),
            GameCommand::Disconnect { session_id } => game.on_disconnect(session_id),
            GameCommand::CountdownElapsed { epoch } => game.on_countdown_elapsed(epoch),
            GameCommand::RoundExpired { epoch } => game.on_round_expired(epoch),
        };
        if !alive {
            break;
        }
    }
}
