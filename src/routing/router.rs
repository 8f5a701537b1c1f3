//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve a request path to a backend and remaining suffix
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes kept sorted longest prefix first, so the first hit wins
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Explicit no-match rather than silent default

use crate::config::RouteConfig;
use crate::routing::matcher::PrefixMatcher;

/// Error building a route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteTableError {
    #[error("route prefix {0:?} is configured more than once")]
    DuplicatePrefix(String),
}

/// A configured route.
#[derive(Debug, Clone)]
pub struct Route {
    matcher: PrefixMatcher,
    backend: String,
}

impl Route {
    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The prefix that matched.
    pub prefix: String,
    /// Backend base URL.
    pub backend: String,
    /// Path left after removing the prefix; empty or starting with `/`.
    pub remainder: String,
}

/// Immutable prefix → backend table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from route definitions.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteTableError> {
        let mut routes: Vec<Route> = Vec::with_capacity(configs.len());
        for config in configs {
            if routes.iter().any(|r| r.prefix() == config.prefix) {
                return Err(RouteTableError::DuplicatePrefix(config.prefix.clone()));
            }
            routes.push(Route {
                matcher: PrefixMatcher::new(config.prefix.clone()),
                backend: config.backend.clone(),
            });
        }

        // Longest first; distinct prefixes of equal length can never both
        // match one path, so the order among them is irrelevant.
        routes.sort_by(|a, b| b.matcher.len().cmp(&a.matcher.len()));

        Ok(Self { routes })
    }

    /// Find the longest boundary-safe prefix matching `path`.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            route.matcher.strip(path).map(|remainder| RouteMatch {
                prefix: route.prefix().to_string(),
                backend: route.backend.clone(),
                remainder: remainder.to_string(),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
