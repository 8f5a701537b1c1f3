//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → path.rs (percent-decode)
//!     → source.rs (RouteSource: static table or swappable snapshot)
//!     → router.rs (longest-prefix lookup)
//!     → matcher.rs (boundary-safe prefix check)
//!     → Return: RouteMatch { prefix, backend, remainder } or no match
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Sort by prefix length, longest first
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; reload swaps a whole table atomically
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod path;
pub mod router;
pub mod source;

pub use router::{Route, RouteMatch, RouteTable, RouteTableError};
pub use source::{RouteSource, SharedRouteTable};
