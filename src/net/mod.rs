//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection slot budget)
//!     → connection.rs (connection ID, session state machine)
//!     → Hand off to the relay handler
//!
//! Session States:
//!     Reading → Querying → Fetching → Streaming → Closed
//!                 (any live state) → Failed
//! ```
//!
//! # Design Decisions
//! - Bounded slot budget prevents resource exhaustion
//! - A connection holds its slot (permit) for exactly its lifetime

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, RelaySession, SessionState};
pub use listener::{Admission, ConnectionPermit, Listener, ListenerError};
