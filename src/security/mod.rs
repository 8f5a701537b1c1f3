//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Routed request:
//!     → limits.rs (reject declared oversize bodies, cap the body stream)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-* / X-Real-IP)
//!     → Dispatch to backend
//!
//! Backend response:
//!     → headers.rs (strip hop-by-hop)
//!     → Relay to client
//! ```
//!
//! # Design Decisions
//! - No trust in client input: X-Real-IP and X-Forwarded-Proto are overwritten
//! - Limits apply while streaming, never by buffering

pub mod headers;
pub mod limits;

pub use limits::{CappedBody, LimitTrip};
