//! Header manipulation for forwarded requests and relayed responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (fixed set plus anything named in `Connection`)
//! - Add X-Real-IP, X-Forwarded-Proto and extend X-Forwarded-For
//! - Keep the client's original Host header
//!
//! # Design Decisions
//! - The inbound header map is never modified; outbound headers are a copy
//! - X-Real-IP and X-Forwarded-Proto are always overwritten, never appended
//! - X-Forwarded-Proto is fixed to `http`: this proxy does not terminate TLS

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};

pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Scheme reported to backends.
pub const FORWARDED_PROTO: &str = "http";

/// Headers that only apply to a single transport connection.
pub const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers in place. Applying it twice equals applying it once.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| HeaderName::from_bytes(token.as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Client IP from a remote address: the host part of `host:port`, or the
/// raw address when there is no port.
pub fn client_ip(remote_addr: &str) -> String {
    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if let Some(rest) = remote_addr.strip_prefix('[') {
        if let Some((host, _port)) = rest.split_once("]:") {
            return host.to_string();
        }
    }
    match remote_addr.rsplit_once(':') {
        Some((host, _port)) if !host.contains(':') => host.to_string(),
        _ => remote_addr.to_string(),
    }
}

/// Build the header map sent to the backend.
///
/// `host` is the Host the client addressed; it is kept as-is so backends
/// see the public name rather than their own address.
pub fn outbound_headers(
    inbound: &HeaderMap,
    remote_addr: &str,
    host: Option<&HeaderValue>,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);

    let ip = client_ip(remote_addr);
    let ip_value = HeaderValue::from_str(&ip)?;

    let forwarded_for = match forwarded_chain(&headers) {
        Some(mut chain) => {
            chain.extend_from_slice(b", ");
            chain.extend_from_slice(ip.as_bytes());
            HeaderValue::from_bytes(&chain)?
        }
        None => ip_value.clone(),
    };

    headers.insert(X_REAL_IP, ip_value);
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(FORWARDED_PROTO));
    headers.insert(X_FORWARDED_FOR, forwarded_for);

    if let Some(host) = host {
        headers.insert(header::HOST, host.clone());
    }

    Ok(headers)
}

/// Existing X-Forwarded-For entries joined into one list.
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<u8>> {
    let mut chain: Option<Vec<u8>> = None;
    for value in headers.get_all(&X_FORWARDED_FOR) {
        let bytes = value.as_bytes();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match chain.as_mut() {
            Some(existing) => {
                existing.extend_from_slice(b", ");
                existing.extend_from_slice(bytes);
            }
            None => chain = Some(bytes.to_vec()),
        }
    }
    chain
}
