//! Request body limits.
//!
//! # Responsibilities
//! - Enforce maximum request body size while the body streams to the backend
//! - Reject declared oversize bodies before any backend is contacted
//!
//! # Design Decisions
//! - Counting is `http_body_util::Limited`: exactly `max` bytes is allowed,
//!   `max + 1` fails with `LengthLimitError`
//! - [`CappedBody`] only adds a shared trip flag, so an oversize body can be
//!   told apart from a connection failure when the client loses the
//!   original error

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::http::{header, HeaderMap};
use http_body::{Body, Frame, SizeHint};
use http_body_util::{LengthLimitError, Limited};
use pin_project_lite::pin_project;

/// Records whether a [`CappedBody`] hit its ceiling.
#[derive(Debug, Clone, Default)]
pub struct LimitTrip(Arc<AtomicBool>);

impl LimitTrip {
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Declared `Content-Length`, if present and well-formed.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pin_project! {
    /// [`Limited`] body that raises its [`LimitTrip`] when the limit is hit.
    pub struct CappedBody<B> {
        #[pin]
        inner: Limited<B>,
        trip: LimitTrip,
    }
}

impl<B> CappedBody<B> {
    pub fn new(inner: B, limit: u64) -> (Self, LimitTrip) {
        let trip = LimitTrip::default();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let body = Self {
            inner: Limited::new(inner, limit),
            trip: trip.clone(),
        };
        (body, trip)
    }
}

impl<B> Body for CappedBody<B>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = B::Data;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        let frame = ready!(this.inner.poll_frame(cx));
        if let Some(Err(e)) = &frame {
            if e.is::<LengthLimitError>() {
                this.trip.trip();
            }
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
