//! Relay protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (admission, one task per connection, shutdown drain)
//!     → handler.rs (session state machine)
//!     → request.rs (one search-term line)
//!     → upstream client (search, then fetch the first image)
//!     → response.rs (image bytes, or exactly one sentinel line)
//! ```
//!
//! # Design Decisions
//! - The wire protocol has no framing beyond the request newline; the reply
//!   ends when the relay closes the connection
//! - A handler never writes a sentinel after image bytes went out

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{ConnectionHandler, SessionOutcome};
pub use request::SearchRequest;
pub use response::Sentinel;
pub use server::RelayServer;
