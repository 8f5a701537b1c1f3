//! Response relay and completion accounting.
//!
//! # Responsibilities
//! - Relay the backend status, headers and body to the client
//! - Strip hop-by-hop headers from what the backend sent
//! - Count body bytes delivered to the client
//! - Hand exactly one completion record to the access log
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body; every frame is passed
//!   on as soon as the backend yields it, so event streams are not held back
//! - A frame counts as delivered once the connection asks for the next one
//!   or the stream ends; a frame lost to a disconnect is not counted
//! - The record is emitted when the response body is dropped, which happens
//!   exactly once whether the transfer finished, failed or was abandoned

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use bytes::Buf;
use http_body::{Frame, SizeHint};
use hyper::body::Incoming;
use pin_project_lite::pin_project;

use crate::observability::{AccessLog, CompletionRecord};
use crate::security::headers::strip_hop_by_hop;

/// Turn a backend response into the client response.
pub fn relay(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Owns the completion record of one request until it is emitted on drop.
pub struct Completion {
    record: Option<CompletionRecord>,
    started: Instant,
    sink: Arc<dyn AccessLog>,
    delivered: u64,
    in_flight: u64,
    ended: bool,
}

impl Completion {
    pub fn begin(record: CompletionRecord, sink: Arc<dyn AccessLog>) -> Self {
        Self {
            record: Some(record),
            started: Instant::now(),
            sink,
            delivered: 0,
            in_flight: 0,
            ended: false,
        }
    }

    pub fn set_backend(&mut self, backend: &str) {
        if let Some(record) = self.record.as_mut() {
            record.backend = backend.to_string();
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if let Some(record) = self.record.as_mut() {
            record.status = status.as_u16();
        }
    }

    fn commit_in_flight(&mut self) {
        self.delivered += std::mem::take(&mut self.in_flight);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.ended {
            self.commit_in_flight();
        }
        if let Some(mut record) = self.record.take() {
            record.latency = self.started.elapsed();
            record.response_size = self.delivered;
            self.sink.record(record);
        }
    }
}

pin_project! {
    /// Response body that reports delivered bytes to its [`Completion`].
    pub struct ObservedBody<B> {
        #[pin]
        inner: B,
        completion: Completion,
    }
}

/// Attach `completion` to the response; its status is taken from the response.
pub fn observe(response: Response<Body>, mut completion: Completion) -> Response<Body> {
    completion.set_status(response.status());
    response.map(|inner| Body::new(ObservedBody { inner, completion }))
}

impl<B> http_body::Body for ObservedBody<B>
where
    B: http_body::Body,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        // Being polled again means the previous frame was taken.
        this.completion.commit_in_flight();

        let polled = ready!(this.inner.as_mut().poll_frame(cx));
        match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.completion.in_flight = data.remaining() as u64;
                }
                if this.inner.is_end_stream() {
                    this.completion.ended = true;
                }
            }
            Some(Err(_)) => {}
            None => this.completion.ended = true,
        }
        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
