//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine:
//!     → access_log.rs (one CompletionRecord per proxied request)
//!     → metrics.rs (counters, histograms derived from each record)
//!
//! Everything else:
//!     → logging.rs (structured tracing events)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The engine never formats logs; it hands records to an `AccessLog`
//! - Request ID flows through the completion record and span

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessLog, CompletionRecord, TracingAccessLog};
