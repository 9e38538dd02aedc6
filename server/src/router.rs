//! Per-session protocol FSM: the (state × verb) legality table.
//!
//! Every inbound frame is parsed, checked against the session's current
//! state, and dispatched to the lobby worker or the owning game worker.
//! Anything that falls through the table (unknown verbs, malformed
//! arguments, verbs that are legal somewhere else but not here) is ignored
//! without a reply. Workers re-validate what matters to them (manager
//! identity, game phase, word presence), so a stale route can never corrupt
//! a game.

use crate::game::{GameCommand, GameSettings, SharedGameTable};
use crate::lobby::LobbyCommand;
use crate::session::{SessionId, SessionState, SharedRegistry};
use log::debug;
use shared::Command;
use tokio::sync::mpsc;

/// Where a parsed command goes, per the legality table.
pub enum Route {
    Lobby(LobbyCommand),
    Game(GameCommand),
    Ignore,
}

/// The FSM table. Pure so it can be audited and tested exhaustively.
pub fn route(session_id: SessionId, state: SessionState, command: Command) -> Route {
    use SessionState::*;

    match (command, state) {
        (Command::Connect { name }, Unidentified) => {
            Route::Lobby(LobbyCommand::Connect { session_id, name })
        }
        (
            Command::CreateGame {
                mode,
                style,
                rounds,
                words_count,
                language,
                difficulty,
            },
            Identified,
        ) => Route::Lobby(LobbyCommand::CreateGame {
            session_id,
            settings: GameSettings {
                mode,
                style,
                rounds,
                words_count,
                language,
                difficulty,
            },
        }),
        (Command::DeleteGame, Created) => Route::Lobby(LobbyCommand::DeleteGame { session_id }),
        (Command::JoinGame { id }, Identified) => Route::Lobby(LobbyCommand::JoinGame {
            session_id,
            game_id: id,
        }),
        (Command::LeaveGame, Joined) => Route::Lobby(LobbyCommand::LeaveGame { session_id }),
        (Command::StartGame, Created) => Route::Lobby(LobbyCommand::StartGame { session_id }),
        // The game worker additionally checks that the sender is the manager.
        (Command::StartRound, EndRound | Scores) => {
            Route::Game(GameCommand::StartRound { session_id })
        }
        (Command::ClaimWord { label }, Running) => {
            Route::Game(GameCommand::Claim { session_id, label })
        }
        // quit-game is legal from Running too for the game-over race; the
        // worker only honors it once the game is actually over.
        (Command::QuitGame, Running | EndRound | Scores) => {
            Route::Game(GameCommand::Quit { session_id })
        }
        _ => Route::Ignore,
    }
}

/// Parses and dispatches one inbound frame from a connection task.
pub async fn dispatch(
    session_id: SessionId,
    line: &str,
    registry: &SharedRegistry,
    games: &SharedGameTable,
    lobby_tx: &mpsc::Sender<LobbyCommand>,
) {
    let Some(command) = Command::parse(line) else {
        debug!("Session {}: unparseable frame {:?}", session_id, line);
        return;
    };
    let info = registry.read().route_info(session_id);
    let Some((state, game_id)) = info else {
        return;
    };

    match route(session_id, state, command) {
        Route::Ignore => {
            debug!("Session {}: illegal command in {:?}", session_id, state);
        }
        Route::Lobby(cmd) => {
            let _ = lobby_tx.send(cmd).await;
        }
        Route::Game(cmd) => {
            let handle = games.read().get(&game_id).cloned();
            if let Some(handle) = handle {
                let _ = handle.tx.send(cmd).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Difficulty, GameMode, Language, WordStyle};

    fn create_game_command() -> Command {
        Command::CreateGame {
            mode: GameMode::Capture,
            style: WordStyle::Regular,
            rounds: 1,
            words_count: 5,
            language: Language::En,
            difficulty: Difficulty::Easy,
        }
    }

    fn is_ignored(state: SessionState, command: Command) -> bool {
        matches!(route(1, state, command), Route::Ignore)
    }

    #[test]
    fn test_legal_routes() {
        use SessionState::*;

        assert!(matches!(
            route(1, Unidentified, Command::Connect { name: "a".into() }),
            Route::Lobby(LobbyCommand::Connect { .. })
        ));
        assert!(matches!(
            route(1, Identified, create_game_command()),
            Route::Lobby(LobbyCommand::CreateGame { .. })
        ));
        assert!(matches!(
            route(1, Created, Command::DeleteGame),
            Route::Lobby(LobbyCommand::DeleteGame { .. })
        ));
        assert!(matches!(
            route(1, Identified, Command::JoinGame { id: 3 }),
            Route::Lobby(LobbyCommand::JoinGame { game_id: 3, .. })
        ));
        assert!(matches!(
            route(1, Joined, Command::LeaveGame),
            Route::Lobby(LobbyCommand::LeaveGame { .. })
        ));
        assert!(matches!(
            route(1, Created, Command::StartGame),
            Route::Lobby(LobbyCommand::StartGame { .. })
        ));
        assert!(matches!(
            route(1, EndRound, Command::StartRound),
            Route::Game(GameCommand::StartRound { .. })
        ));
        assert!(matches!(
            route(1, Scores, Command::StartRound),
            Route::Game(GameCommand::StartRound { .. })
        ));
        assert!(matches!(
            route(1, Running, Command::ClaimWord { label: "cat".into() }),
            Route::Game(GameCommand::Claim { .. })
        ));
        for state in [Running, EndRound, Scores] {
            assert!(matches!(
                route(1, state, Command::QuitGame),
                Route::Game(GameCommand::Quit { .. })
            ));
        }
    }

    #[test]
    fn test_illegal_routes_fall_through() {
        use SessionState::*;

        // A named session cannot rename itself.
        assert!(is_ignored(Identified, Command::Connect { name: "b".into() }));
        // Claims only make sense while a round runs.
        for state in [Unidentified, Identified, Created, Joined, Started, EndRound, Scores] {
            assert!(is_ignored(state, Command::ClaimWord { label: "x".into() }));
        }
        // Nothing but connect is legal before identification.
        assert!(is_ignored(Unidentified, create_game_command()));
        assert!(is_ignored(Unidentified, Command::StartGame));
        // Game management requires the matching role state.
        assert!(is_ignored(Joined, Command::DeleteGame));
        assert!(is_ignored(Joined, Command::StartGame));
        assert!(is_ignored(Created, Command::LeaveGame));
        assert!(is_ignored(Created, Command::JoinGame { id: 1 }));
        // No round controls during countdown or play.
        assert!(is_ignored(Started, Command::StartRound));
        assert!(is_ignored(Running, Command::StartRound));
        assert!(is_ignored(Started, Command::QuitGame));
    }
}
