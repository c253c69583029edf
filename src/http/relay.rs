//! Relay of a denied auth response to the client.
//!
//! # Data Flow
//! ```text
//! backend response
//!     → declared trailer names read from `Trailer`
//!     → hop-by-hop headers stripped
//!     → `Trailer` re-announced, status copied
//!     → RelayBody: data frames in ≤ 32 KiB chunks, then trailers
//! ```
//!
//! The status line and headers go out when the response is returned to
//! hyper, before the body is polled for the first time. The body is never
//! buffered.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response};
use axum::BoxError;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::http::cancel::CancelScope;
use crate::http::error::RelayError;
use crate::security::headers;

/// Largest data frame handed to the client.
pub const RELAY_CHUNK_SIZE: usize = 32 * 1024;

/// Turn the backend's denial into the client response.
///
/// `scope` is kept alive by the body and released when relaying ends.
pub fn relay<B>(response: Response<B>, scope: CancelScope) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = response.into_parts();

    let trailers = declared_trailers(&parts.headers);
    let sanitized = match headers::strip_hop_headers(&parts.headers) {
        Cow::Owned(sanitized) => Some(sanitized),
        Cow::Borrowed(_) => None,
    };
    if let Some(sanitized) = sanitized {
        parts.headers = sanitized;
    }
    if let Some(announce) = announce_trailers(&trailers) {
        parts.headers.insert(header::TRAILER, announce);
    }

    Response::from_parts(parts, Body::new(RelayBody::new(body, scope)))
}

/// Trailer field names the backend declared up front.
fn declared_trailers(headers: &HeaderMap) -> Vec<HeaderName> {
    let mut names: Vec<HeaderName> = Vec::new();
    let declared = headers
        .get_all(header::TRAILER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok());
    for name in declared {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn announce_trailers(names: &[HeaderName]) -> Option<HeaderValue> {
    if names.is_empty() {
        return None;
    }
    let joined = names
        .iter()
        .map(HeaderName::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    HeaderValue::from_str(&joined).ok()
}

/// Streams the backend body to the client.
///
/// The backend body and the cancellation scope are dropped together, once,
/// as soon as the stream ends, fails, is cancelled or yields its trailers.
pub struct RelayBody<B> {
    backend: Option<B>,
    pending: Bytes,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    scope: Option<CancelScope>,
}

impl<B> RelayBody<B> {
    pub fn new(backend: B, scope: CancelScope) -> Self {
        let cancelled = Box::pin(scope.token().clone().cancelled_owned());
        Self {
            backend: Some(backend),
            pending: Bytes::new(),
            cancelled,
            scope: Some(scope),
        }
    }

    fn next_chunk(&mut self) -> Bytes {
        let len = self.pending.len().min(RELAY_CHUNK_SIZE);
        self.pending.split_to(len)
    }

    fn finish(&mut self) {
        self.backend = None;
        self.scope = None;
    }
}

impl<B> HttpBody for RelayBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = RelayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if !this.pending.is_empty() {
            return Poll::Ready(Some(Ok(Frame::data(this.next_chunk()))));
        }
        if this.backend.is_none() {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finish();
            return Poll::Ready(Some(Err(RelayError::Cancelled)));
        }

        loop {
            let Some(backend) = this.backend.as_mut() else {
                return Poll::Ready(None);
            };
            let frame = match Pin::new(backend).poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(RelayError::Backend(err.into()))));
                }
                Poll::Ready(Some(Ok(frame))) => frame,
            };

            match frame.into_data() {
                Ok(data) if data.is_empty() => continue,
                Ok(data) => {
                    this.pending = data;
                    return Poll::Ready(Some(Ok(Frame::data(this.next_chunk()))));
                }
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        this.finish();
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_empty() && self.backend.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let pending = self.pending.len() as u64;
        let Some(backend) = self.backend.as_ref() else {
            return SizeHint::with_exact(pending);
        };
        let inner = backend.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(inner.lower() + pending);
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper + pending);
        }
        hint
    }
}
