//! Prefix-routing HTTP reverse proxy library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{ForwardingEngine, HttpServer};
pub use lifecycle::Shutdown;
