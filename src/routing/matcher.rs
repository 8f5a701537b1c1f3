//! Path prefix matching.
//!
//! # Responsibilities
//! - Match a request path against a configured prefix
//! - Only match on a path-segment boundary
//! - Split off the remainder that is appended to the backend base URL
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/service1` matches `/service1` and `/service1/...`, never `/service1extra`
//! - No regex to guarantee O(n) matching

/// A boundary-safe path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Length used to rank competing matches.
    pub(crate) fn len(&self) -> usize {
        self.prefix.len()
    }

    /// Returns the remainder of `path` after the prefix, if it matches.
    ///
    /// The remainder is either empty (exact match) or starts with `/`.
    pub fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}
