//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, /health, connection drain)
//!     → request.rs (request ID, capture facts for the record)
//!     → forward.rs (route, prepare, dispatch under deadline)
//!         └─ error.rs (classify failure → 404/413/502/504)
//!     → response.rs (strip hop-by-hop, stream, count bytes)
//!     → Send to client, emit one completion record
//! ```

pub mod error;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use error::ForwardError;
pub use forward::{ForwardLimits, ForwardOutcome, ForwardingEngine};
pub use request::ProxyRequest;
pub use server::HttpServer;
