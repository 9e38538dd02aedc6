//! # Shared Protocol Library
//!
//! This crate contains the wire protocol spoken between the typing-competition
//! server and its clients, and nothing else. Both sides depend on it so that
//! the command grammar, the notification schemas, and the protocol enums can
//! never drift apart.
//!
//! ## Wire Format
//!
//! The protocol is asymmetric by design:
//!
//! - **Inbound** (client → server): one ASCII line per frame, a verb followed
//!   by space-separated arguments, e.g. `create-game capture regular 3 10 en easy`.
//!   Lines are tokenized into a [`Command`]; anything that does not tokenize
//!   cleanly is not a command and the server ignores it.
//! - **Outbound** (server → client): one JSON object per frame, discriminated
//!   by a `type` field, e.g. `{"type":"games-list","games":[…]}`. These are
//!   modeled by [`Notification`] and serialized with `serde_json`.
//!
//! The `type` discriminators (`incorrect-name`, `too-long-name`, `used-name`,
//! `games-list`, `game-start`, `words-list`, `scores`, `manager`) are part of
//! the frontend contract and must not change spelling.
//!
//! ## Protocol Enums
//!
//! [`GameMode`], [`WordStyle`], [`Language`] and [`Difficulty`] appear both in
//! inbound arguments (lowercase tokens, parsed case-insensitively) and in
//! outbound JSON (lowercase strings). `GameMode` also carries the one piece
//! of mode semantics both sides must agree on: how the declared word count
//! scales with the player count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two ways a round can be played.
///
/// - `Capture`: one shared pool of words; every word can be claimed by any
///   player and the round ends when the pool is exhausted.
/// - `Race`: the generated list is multiplied by the player count and every
///   player receives a private copy of it; the same word can be claimed once
///   per player, and the round ends when one player finishes their copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Capture,
    Race,
}

impl GameMode {
    /// Number of words actually generated for a round, given the count the
    /// creator declared and the number of players at game start.
    pub fn effective_words_count(&self, declared: u32, players: usize) -> u32 {
        match self {
            GameMode::Capture => declared,
            GameMode::Race => declared.saturating_mul(players.max(1) as u32),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Capture => "capture",
            GameMode::Race => "race",
        }
    }
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "capture" => Ok(GameMode::Capture),
            "race" => Ok(GameMode::Race),
            _ => Err(()),
        }
    }
}

/// What the players are typing: plain words, masked words, or the answers to
/// small arithmetic expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordStyle {
    Regular,
    Hidden,
    Calculus,
}

impl WordStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordStyle::Regular => "regular",
            WordStyle::Hidden => "hidden",
            WordStyle::Calculus => "calculus",
        }
    }
}

impl FromStr for WordStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "regular" => Ok(WordStyle::Regular),
            "hidden" => Ok(WordStyle::Hidden),
            "calculus" => Ok(WordStyle::Calculus),
            _ => Err(()),
        }
    }
}

/// Dictionary language for word generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
        }
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "fr" => Ok(Language::Fr),
            _ => Err(()),
        }
    }
}

/// Difficulty selector passed through to the word providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WordStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One word of a round.
///
/// `label` is what a player has to type to claim it, `display` is what the
/// clients render. The two differ for the hidden style (masked letters) and
/// the calculus style (the expression is shown, the numeric answer is typed).
/// `claimed_by` is the claimant's display name, or empty while the word is
/// still free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub label: String,
    pub display: String,
    pub claimed_by: String,
}

impl Word {
    pub fn new(label: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            display: display.into(),
            claimed_by: String::new(),
        }
    }

    pub fn is_claimed(&self) -> bool {
        !self.claimed_by.is_empty()
    }
}

/// Per-player score, both the per-round part (`points`, `speed`) and the
/// per-game part (`victories`, `best_speed`, `latest_victory_timestamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub user_name: String,
    pub points: u32,
    /// Words per minute for the current round.
    pub speed: f64,
    /// Best words-per-minute across all rounds of this game.
    pub best_speed: f64,
    pub victories: u32,
    /// Millisecond timestamp of the latest round victory, 0 if none.
    pub latest_victory_timestamp: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub awards: Vec<String>,
}

impl Score {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            points: 0,
            speed: 0.0,
            best_speed: 0.0,
            victories: 0,
            latest_victory_timestamp: 0,
            awards: Vec::new(),
        }
    }

    /// Clears the per-round fields between rounds. Victories and best speed
    /// accumulate for the whole game and are left untouched.
    pub fn reset_points(&mut self) {
        self.points = 0;
        self.speed = 0.0;
    }
}

/// One entry of the `games-list` notification: a pending game as shown in the
/// lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub id: u64,
    pub creator: String,
    pub mode: GameMode,
    pub style: WordStyle,
    pub rounds: u32,
    pub words_count: u32,
    pub language: Language,
    pub difficulty: Difficulty,
    pub players: Vec<String>,
}

/// Inbound command, one per received line.
///
/// Parsing is purely syntactic: a `Command` value only means the line had a
/// known verb with well-formed arguments. Whether it is legal in the
/// session's current protocol state is the server's decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect {
        name: String,
    },
    CreateGame {
        mode: GameMode,
        style: WordStyle,
        rounds: u32,
        words_count: u32,
        language: Language,
        difficulty: Difficulty,
    },
    DeleteGame,
    JoinGame {
        id: u64,
    },
    LeaveGame,
    StartGame,
    StartRound,
    ClaimWord {
        label: String,
    },
    QuitGame,
}

impl Command {
    /// Tokenizes one inbound line. Returns `None` for unknown verbs, wrong
    /// arity, or arguments that do not parse; the caller treats all of those
    /// as protocol violations and stays silent.
    ///
    /// `connect` takes the rest of the line verbatim so that a name with
    /// embedded whitespace still reaches the semantic check and earns its
    /// `incorrect-name` reply instead of vanishing as a parse error.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let verb = tokens.next()?;

        match verb {
            "connect" => {
                let name = line["connect".len()..].trim().to_string();
                Some(Command::Connect { name })
            }
            "create-game" => {
                let mode = tokens.next()?.parse().ok()?;
                let style = tokens.next()?.parse().ok()?;
                let rounds = tokens.next()?.parse().ok()?;
                let words_count = tokens.next()?.parse().ok()?;
                let language = tokens.next()?.parse().ok()?;
                let difficulty = tokens.next()?.parse().ok()?;
                if tokens.next().is_some() {
                    return None;
                }
                Some(Command::CreateGame {
                    mode,
                    style,
                    rounds,
                    words_count,
                    language,
                    difficulty,
                })
            }
            "delete-game" => no_args(tokens, Command::DeleteGame),
            "join-game" => {
                let id = tokens.next()?.parse().ok()?;
                if tokens.next().is_some() {
                    return None;
                }
                Some(Command::JoinGame { id })
            }
            "leave-game" => no_args(tokens, Command::LeaveGame),
            "start-game" => no_args(tokens, Command::StartGame),
            "start-round" => no_args(tokens, Command::StartRound),
            "claim-word" => {
                let label = tokens.next()?.to_string();
                if tokens.next().is_some() {
                    return None;
                }
                Some(Command::ClaimWord { label })
            }
            "quit-game" => no_args(tokens, Command::QuitGame),
            _ => None,
        }
    }
}

fn no_args<'a>(mut tokens: impl Iterator<Item = &'a str>, cmd: Command) -> Option<Command> {
    if tokens.next().is_some() {
        None
    } else {
        Some(cmd)
    }
}

/// Outbound notification, one per sent frame.
///
/// Serialized as a JSON object tagged by `type`. The discriminator spellings
/// are fixed by the frontend contract; payload fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Notification {
    /// The requested display name is empty or contains whitespace.
    IncorrectName,
    /// The requested display name exceeds the server's length limit.
    TooLongName,
    /// The requested display name is taken by a live session.
    UsedName,
    /// Current pending games, sent to every session in a lobby state.
    GamesList { games: Vec<GameSummary> },
    /// A round countdown has begun for the receiving player's game.
    GameStart {
        id: u64,
        mode: GameMode,
        style: WordStyle,
        rounds: u32,
        round_id: u32,
        words_count: u32,
        language: Language,
        difficulty: Difficulty,
        players: Vec<String>,
        manager: String,
        countdown_seconds: u64,
    },
    /// The words of the running round, re-sent after every successful claim.
    WordsList { words: Vec<Word> },
    /// Round results. `game_over` marks the last broadcast of the game.
    Scores {
        round_scores: Vec<Score>,
        game_scores: Vec<Score>,
        manager: String,
        /// Milliseconds the round lasted.
        round_duration: u64,
        game_over: bool,
        words: Vec<Word>,
    },
    /// A new manager was elected after the previous one disconnected.
    Manager { manager: String },
}

impl Notification {
    /// Serializes to the single-frame JSON form.
    pub fn to_json(&self) -> String {
        // Serialization of these types cannot fail; the map keys are strings.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect_keeps_rest_of_line() {
        assert_eq!(
            Command::parse("connect alice"),
            Some(Command::Connect {
                name: "alice".to_string()
            })
        );
        // Whitespace inside the name survives parsing; the semantic check
        // rejects it with incorrect-name later.
        assert_eq!(
            Command::parse("connect two words"),
            Some(Command::Connect {
                name: "two words".to_string()
            })
        );
        assert_eq!(
            Command::parse("connect"),
            Some(Command::Connect {
                name: String::new()
            })
        );
    }

    #[test]
    fn test_parse_create_game() {
        let cmd = Command::parse("create-game capture regular 3 10 en easy").unwrap();
        assert_eq!(
            cmd,
            Command::CreateGame {
                mode: GameMode::Capture,
                style: WordStyle::Regular,
                rounds: 3,
                words_count: 10,
                language: Language::En,
                difficulty: Difficulty::Easy,
            }
        );
        // Tokens are case-insensitive.
        assert!(Command::parse("create-game RACE Hidden 1 5 FR hard").is_some());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("frobnicate"), None);
        assert_eq!(Command::parse("create-game capture regular"), None);
        assert_eq!(Command::parse("create-game capture regular x 10 en easy"), None);
        assert_eq!(Command::parse("create-game capture regular 3 10 en easy extra"), None);
        assert_eq!(Command::parse("join-game notanumber"), None);
        assert_eq!(Command::parse("claim-word"), None);
        assert_eq!(Command::parse("claim-word two words"), None);
        assert_eq!(Command::parse("start-game now"), None);
    }

    #[test]
    fn test_parse_simple_verbs() {
        assert_eq!(Command::parse("delete-game"), Some(Command::DeleteGame));
        assert_eq!(Command::parse("leave-game"), Some(Command::LeaveGame));
        assert_eq!(Command::parse("start-game"), Some(Command::StartGame));
        assert_eq!(Command::parse("start-round"), Some(Command::StartRound));
        assert_eq!(Command::parse("quit-game"), Some(Command::QuitGame));
        assert_eq!(Command::parse("join-game 7"), Some(Command::JoinGame { id: 7 }));
        assert_eq!(
            Command::parse("  claim-word cat  "),
            Some(Command::ClaimWord {
                label: "cat".to_string()
            })
        );
    }

    #[test]
    fn test_notification_discriminators() {
        let cases = vec![
            (Notification::IncorrectName, "incorrect-name"),
            (Notification::TooLongName, "too-long-name"),
            (Notification::UsedName, "used-name"),
            (Notification::GamesList { games: vec![] }, "games-list"),
            (Notification::WordsList { words: vec![] }, "words-list"),
            (
                Notification::Manager {
                    manager: "alice".to_string(),
                },
                "manager",
            ),
        ];

        for (notification, expected) in cases {
            let value: serde_json::Value =
                serde_json::from_str(&notification.to_json()).unwrap();
            assert_eq!(value["type"], expected);
        }
    }

    #[test]
    fn test_scores_payload_shape() {
        let mut score = Score::new("bob");
        score.points = 4;
        score.speed = 32.5;
        score.best_speed = 40.0;
        score.victories = 1;
        score.latest_victory_timestamp = 1234;

        let notification = Notification::Scores {
            round_scores: vec![score.clone()],
            game_scores: vec![score],
            manager: "alice".to_string(),
            round_duration: 30000,
            game_over: true,
            words: vec![Word::new("cat", "cat")],
        };

        let value: serde_json::Value = serde_json::from_str(&notification.to_json()).unwrap();
        assert_eq!(value["type"], "scores");
        assert_eq!(value["gameOver"], true);
        assert_eq!(value["roundDuration"], 30000);
        assert_eq!(value["roundScores"][0]["userName"], "bob");
        assert_eq!(value["roundScores"][0]["bestSpeed"], 40.0);
        assert_eq!(value["roundScores"][0]["latestVictoryTimestamp"], 1234);
        // Empty awards are omitted entirely.
        assert!(value["roundScores"][0].get("awards").is_none());
        assert_eq!(value["words"][0]["claimedBy"], "");
    }

    #[test]
    fn test_game_start_payload_shape() {
        let notification = Notification::GameStart {
            id: 3,
            mode: GameMode::Race,
            style: WordStyle::Calculus,
            rounds: 2,
            round_id: 1,
            words_count: 5,
            language: Language::Fr,
            difficulty: Difficulty::Hard,
            players: vec!["alice".to_string(), "bob".to_string()],
            manager: "alice".to_string(),
            countdown_seconds: 5,
        };

        let value: serde_json::Value = serde_json::from_str(&notification.to_json()).unwrap();
        assert_eq!(value["type"], "game-start");
        assert_eq!(value["mode"], "race");
        assert_eq!(value["style"], "calculus");
        assert_eq!(value["language"], "fr");
        assert_eq!(value["difficulty"], "hard");
        assert_eq!(value["roundId"], 1);
        assert_eq!(value["wordsCount"], 5);
        assert_eq!(value["countdownSeconds"], 5);
    }

    #[test]
    fn test_effective_words_count() {
        assert_eq!(GameMode::Capture.effective_words_count(10, 4), 10);
        assert_eq!(GameMode::Race.effective_words_count(10, 4), 40);
        assert_eq!(GameMode::Race.effective_words_count(10, 0), 10);
    }

    #[test]
    fn test_score_reset_points() {
        let mut score = Score::new("carol");
        score.points = 5;
        score.speed = 21.0;
        score.best_speed = 21.0;
        score.victories = 2;

        score.reset_points();

        assert_eq!(score.points, 0);
        assert_eq!(score.speed, 0.0);
        assert_eq!(score.best_speed, 21.0);
        assert_eq!(score.victories, 2);
    }
}
