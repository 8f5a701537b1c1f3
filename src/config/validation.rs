//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and timeouts > 0, bind address parses)
//! - Detect duplicate route prefixes
//! - Reject backend base URLs the forwarder cannot dial
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{ProxyConfig, RouteConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("route prefix {0:?} must start with '/'")]
    Prefix(String),

    #[error("route prefix {0:?} is configured more than once")]
    DuplicatePrefix(String),

    #[error("backend {backend:?} for prefix {prefix:?}: {reason}")]
    Backend {
        prefix: String,
        backend: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_body_bytes"));
    }
    if config.timeouts.dispatch_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.dispatch_secs"));
    }
    if config.timeouts.shutdown_grace_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.shutdown_grace_secs"));
    }

    errors.extend(validate_routes(&config.routes));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate route definitions on their own (also used on reload).
pub fn validate_routes(routes: &[RouteConfig]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for route in routes {
        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::Prefix(route.prefix.clone()));
        }
        if !seen.insert(route.prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix(route.prefix.clone()));
        }
        if let Err(reason) = check_backend(&route.backend) {
            errors.push(ValidationError::Backend {
                prefix: route.prefix.clone(),
                backend: route.backend.clone(),
                reason,
            });
        }
    }

    errors
}

fn check_backend(backend: &str) -> Result<(), String> {
    let url = Url::parse(backend).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("base URL must not carry a query or fragment".to_string());
    }
    Ok(())
}
