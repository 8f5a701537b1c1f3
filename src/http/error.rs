//! Forwarding failures and their client-visible form.
//!
//! | Failure        | Status | Body                    |
//! |----------------|--------|-------------------------|
//! | RouteMiss      | 404    | `no route for <path>`   |
//! | BodyTooLarge   | 413    | `request body too large`|
//! | Timeout        | 504    | `backend timeout`       |
//! | Unreachable    | 502    | `backend unavailable`   |
//! | Prepare        | 502    | `backend unavailable`   |

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use http_body_util::LengthLimitError;

use crate::security::limits::LimitTrip;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Terminal failure of one forwarding operation. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no route for {path}")]
    RouteMiss { path: String },

    #[error("request body too large")]
    BodyTooLarge,

    #[error("backend timeout")]
    Timeout,

    #[error("backend unreachable: {0}")]
    Unreachable(#[source] BoxError),

    #[error("cannot build backend request for {target}: {reason}")]
    Prepare { target: String, reason: String },
}

impl ForwardError {
    /// Classify an error returned while sending to the backend.
    ///
    /// Depending on which side of the exchange notices first, an oversize
    /// body surfaces either as the body's own error somewhere down the
    /// source chain or as a plain broken connection; the trip flag covers
    /// the latter.
    pub fn from_dispatch<E>(err: E, trip: &LimitTrip) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        if trip.is_tripped() || causes(&err).any(|e| e.is::<LengthLimitError>()) {
            return ForwardError::BodyTooLarge;
        }
        let timed_out = causes(&err).any(|e| {
            e.downcast_ref::<io::Error>()
                .is_some_and(|io| io.kind() == io::ErrorKind::TimedOut)
        });
        if timed_out {
            return ForwardError::Timeout;
        }
        ForwardError::Unreachable(Box::new(err))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::RouteMiss { .. } => StatusCode::NOT_FOUND,
            ForwardError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Unreachable(_) | ForwardError::Prepare { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message shown to the client. Backend details stay in the logs.
    pub fn client_message(&self) -> Cow<'static, str> {
        match self {
            ForwardError::RouteMiss { path } => Cow::Owned(format!("no route for {path}")),
            ForwardError::BodyTooLarge => Cow::Borrowed("request body too large"),
            ForwardError::Timeout => Cow::Borrowed("backend timeout"),
            ForwardError::Unreachable(_) | ForwardError::Prepare { .. } => {
                Cow::Borrowed("backend unavailable")
            }
        }
    }

    /// Plain-text error response.
    pub fn into_response(self) -> Response<Body> {
        let mut body = self.client_message().into_owned();
        body.push('\n');

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }
}

/// The error and everything it wraps, outermost first.
///
/// `io::Error` hides a custom payload from `source()`, so it is unwrapped
/// explicitly.
fn causes<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| next_cause(*e))
}

fn next_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    match err.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
        Some(inner) => Some(inner as &(dyn StdError + 'static)),
        None => err.source(),
    }
}
