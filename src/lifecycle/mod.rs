//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop exits → idle readers close
//!             → drain in-flight handlers (bounded) → abort the rest
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, force-close
//! - Shutdown has a deadline: remaining handlers are aborted after it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
