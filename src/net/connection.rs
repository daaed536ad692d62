//! Connection identity and the per-session state machine.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track a session's progress: Reading → Querying → Fetching → Streaming → Closed
//! - Refuse backwards or post-terminal transitions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{RelayError, RelayResult};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the request line.
    Reading,
    /// Search request in flight.
    Querying,
    /// Image request in flight, no bytes yet.
    Fetching,
    /// Image bytes flowing to the client.
    Streaming,
    /// Finished normally.
    Closed,
    /// Finished with an error.
    Failed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Reading => 0,
            SessionState::Querying => 1,
            SessionState::Fetching => 2,
            SessionState::Streaming => 3,
            SessionState::Closed | SessionState::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Reading => "reading",
            SessionState::Querying => "querying",
            SessionState::Fetching => "fetching",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client's relay session. Owned by its handler.
#[derive(Debug)]
pub struct RelaySession {
    id: ConnectionId,
    started_at: Instant,
    state: SessionState,
    bytes_sent: u64,
}

impl RelaySession {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            state: SessionState::Reading,
            bytes_sent: 0,
        }
    }

    /// Move to `next`. States only move forward and terminal states are final.
    pub fn advance(&mut self, next: SessionState) -> RelayResult<()> {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return Err(RelayError::Internal(format!(
                "invalid session transition {} -> {}",
                self.state, next
            )));
        }
        tracing::trace!(connection_id = %self.id, from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }

    pub fn add_bytes_sent(&mut self, n: usize) {
        self.bytes_sent += n as u64;
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn full_happy_path() {
        let mut session = RelaySession::new(ConnectionId::new());
        for next in [
            SessionState::Querying,
            SessionState::Fetching,
            SessionState::Streaming,
            SessionState::Closed,
        ] {
            session.advance(next).unwrap();
        }
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn any_live_state_can_fail() {
        let mut session = RelaySession::new(ConnectionId::new());
        session.advance(SessionState::Querying).unwrap();
        session.advance(SessionState::Failed).unwrap();
        assert!(session.state().is_terminal());
    }

    #[test]
    fn no_state_is_revisited() {
        let mut session = RelaySession::new(ConnectionId::new());
        session.advance(SessionState::Fetching).unwrap();
        assert!(session.advance(SessionState::Querying).is_err());
        assert!(session.advance(SessionState::Fetching).is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut session = RelaySession::new(ConnectionId::new());
        session.advance(SessionState::Closed).unwrap();
        assert!(session.advance(SessionState::Failed).is_err());
    }

    #[test]
    fn counts_bytes() {
        let mut session = RelaySession::new(ConnectionId::new());
        session.add_bytes_sent(10);
        session.add_bytes_sent(5);
        assert_eq!(session.bytes_sent(), 15);
    }
}
