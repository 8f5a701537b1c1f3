//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_shutdown returns
//!
//! Shutdown (shutdown.rs):
//!     trigger → broadcast to subscribers → server stops accepting
//!     → drain within grace period → abort leftovers → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced abort after the grace period
//! - Config reload is driven by file changes, not SIGHUP

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown;
