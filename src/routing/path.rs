//! Request path decoding for route lookup.
//!
//! Routes are matched against the percent-decoded path, so `/service%31/x`
//! and `/service1/x` reach the same backend. `%2F` decodes to `/` like any
//! other escape and therefore acts as a segment separator. The remainder
//! handed to the backend is re-encoded.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when a decoded remainder is put back into a URI path.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Decode a raw request path. Paths that do not decode to UTF-8 are
/// returned unchanged.
pub fn decode(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(raw))
}

/// Encode a decoded path for use in an outbound URI.
pub fn encode(path: &str) -> Cow<'_, str> {
    utf8_percent_encode(path, PATH).into()
}
