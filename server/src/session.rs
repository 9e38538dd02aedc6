//! Session metadata and the process-wide session registry.
//!
//! A session is created when a socket connects and destroyed when it closes.
//! The registry is the single authority for display-name uniqueness and for
//! each session's protocol state; it is read from connection tasks (to route
//! commands) and written by the lobby and game workers. Lock scopes are kept
//! short and never cross an await point.

use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque session handle, allocated by the registry on connect.
pub type SessionId = u64;

/// Sender half of a connection's bounded outbound queue. Payloads are
/// already-serialized JSON frames.
pub type OutboundSender = mpsc::Sender<String>;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_QUEUE: usize = 64;

/// Server-tracked protocol states of a session.
///
/// Clients additionally flow through transient mirrors (CREATING, JOINING, …)
/// that the server does not track; commands arriving from such stale client
/// states simply fail the legality check and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no accepted name yet.
    Unidentified,
    /// Named, in the lobby.
    Identified,
    /// Creator of a pending game.
    Created,
    /// Joiner of a pending game.
    Joined,
    /// In a running game, countdown visible.
    Started,
    /// In a running round, claims accepted.
    Running,
    /// Round finished, waiting for the manager or quitting.
    EndRound,
    /// Client-side cumulative-scores view; commands legal from EndRound are
    /// legal here too. The server never sets this state itself.
    Scores,
}

/// Everything the server knows about one connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Accepted display name, empty until `connect` succeeds.
    pub name: String,
    pub state: SessionState,
    /// Id of the pending or running game this session is part of, 0 if none.
    pub game_id: u64,
    pub outbound: OutboundSender,
}

/// Process-wide session table. Invariant: no two live sessions with a
/// nonempty name share that name.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_session_id: SessionId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Registers a new connection in the `Unidentified` state and returns its
    /// handle.
    pub fn add_session(&mut self, outbound: OutboundSender) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            Session {
                id,
                name: String::new(),
                state: SessionState::Unidentified,
                game_id: 0,
                outbound,
            },
        );
        info!("Session {} opened", id);
        id
    }

    /// Removes a session, releasing its name. Returns the removed entry.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if let Some(ref s) = session {
            if s.name.is_empty() {
                info!("Session {} closed", id);
            } else {
                info!("Session {} ({}) closed", id, s.name);
            }
        }
        session
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Case-sensitive check against every live session's accepted name.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.sessions.values().any(|s| s.name == name)
    }

    /// Marks a name as accepted and moves the session to `Identified`.
    pub fn set_identified(&mut self, id: SessionId, name: String) {
        if let Some(session) = self.sessions.get_mut(&id) {
            info!("Session {} identified as {}", id, name);
            session.name = name;
            session.state = SessionState::Identified;
        }
    }

    pub fn set_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = state;
        }
    }

    pub fn set_game(&mut self, id: SessionId, game_id: u64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.game_id = game_id;
        }
    }

    /// Snapshot of (state, game id) for command routing.
    pub fn route_info(&self, id: SessionId) -> Option<(SessionState, u64)> {
        self.sessions.get(&id).map(|s| (s.state, s.game_id))
    }

    pub fn name_of(&self, id: SessionId) -> Option<String> {
        self.sessions.get(&id).map(|s| s.name.clone())
    }

    pub fn outbound_of(&self, id: SessionId) -> Option<OutboundSender> {
        self.sessions.get(&id).map(|s| s.outbound.clone())
    }

    /// Outbound handles of every session that sees the lobby: states
    /// Identified, Created, and Joined. Sessions inside running games are
    /// excluded by construction.
    pub fn lobby_targets(&self) -> Vec<(SessionId, OutboundSender)> {
        self.sessions
            .values()
            .filter(|s| {
                matches!(
                    s.state,
                    SessionState::Identified | SessionState::Created | SessionState::Joined
                )
            })
            .map(|s| (s.id, s.outbound.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry handle shared between the transport, lobby, and game workers.
pub type SharedRegistry = Arc<RwLock<SessionRegistry>>;

pub fn shared_registry() -> SharedRegistry {
    Arc::new(RwLock::new(SessionRegistry::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> OutboundSender {
        mpsc::channel(OUTBOUND_QUEUE).0
    }

    #[test]
    fn test_add_session_starts_unidentified() {
        let mut registry = SessionRegistry::new();
        let id = registry.add_session(outbound());

        let session = registry.get(id).unwrap();
        assert_eq!(session.state, SessionState::Unidentified);
        assert!(session.name.is_empty());
        assert_eq!(session.game_id, 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let mut registry = SessionRegistry::new();
        let a = registry.add_session(outbound());
        let b = registry.add_session(outbound());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_name_uniqueness_released_on_remove() {
        let mut registry = SessionRegistry::new();
        let a = registry.add_session(outbound());
        registry.set_identified(a, "alice".to_string());

        assert!(registry.name_in_use("alice"));
        // Case-sensitive: "Alice" is a different name.
        assert!(!registry.name_in_use("Alice"));

        registry.remove(a);
        assert!(!registry.name_in_use("alice"));
    }

    #[test]
    fn test_empty_name_matches_unnamed_sessions() {
        let mut registry = SessionRegistry::new();
        registry.add_session(outbound());
        // Unidentified sessions carry the empty name, so the uniqueness
        // check must only ever run after the empty-name rejection.
        assert!(registry.name_in_use(""));
    }

    #[test]
    fn test_lobby_targets_filter_by_state() {
        let mut registry = SessionRegistry::new();
        let a = registry.add_session(outbound());
        let b = registry.add_session(outbound());
        let c = registry.add_session(outbound());
        let d = registry.add_session(outbound());

        registry.set_identified(a, "a".to_string());
        registry.set_identified(b, "b".to_string());
        registry.set_state(b, SessionState::Created);
        registry.set_identified(c, "c".to_string());
        registry.set_state(c, SessionState::Running);
        // d stays Unidentified.
        let _ = d;

        let targets: Vec<SessionId> = registry
            .lobby_targets()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert!(targets.contains(&a));
        assert!(targets.contains(&b));
        assert!(!targets.contains(&c));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_route_info() {
        let mut registry = SessionRegistry::new();
        let a = registry.add_session(outbound());
        registry.set_identified(a, "a".to_string());
        registry.set_state(a, SessionState::Joined);
        registry.set_game(a, 7);

        assert_eq!(registry.route_info(a), Some((SessionState::Joined, 7)));
        assert_eq!(registry.route_info(999), None);
    }
}
