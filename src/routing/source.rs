//! Route sources consumed by the forwarding engine.
//!
//! The engine only sees [`RouteSource`]; whether the table is fixed at
//! startup or swapped by a config reload is invisible to it.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::routing::router::{RouteMatch, RouteTable};

/// Resolves a request path to a backend.
pub trait RouteSource: Send + Sync {
    fn resolve(&self, path: &str) -> Option<RouteMatch>;
}

impl RouteSource for RouteTable {
    fn resolve(&self, path: &str) -> Option<RouteMatch> {
        RouteTable::resolve(self, path)
    }
}

/// A route table that can be replaced while requests are in flight.
///
/// Each resolve works on one snapshot; the returned match is owned, so a
/// request keeps its backend even if the table is swapped right after.
#[derive(Debug)]
pub struct SharedRouteTable {
    current: ArcSwap<RouteTable>,
}

impl SharedRouteTable {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// Atomically install a new table.
    pub fn replace(&self, table: RouteTable) {
        self.current.store(Arc::new(table));
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }
}

impl RouteSource for SharedRouteTable {
    fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.current.load().resolve(path)
    }
}
