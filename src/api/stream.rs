//! Streaming response body for chat fragments.
//!
//! Fragments are delivered as raw text chunks; the response ends when the
//! session actor drops its side of the channel. No framing, no end marker.

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub fn fragment_response(rx: mpsc::UnboundedReceiver<String>) -> Response {
    let body = Body::from_stream(
        UnboundedReceiverStream::new(rx)
            .map(|fragment| Ok::<Bytes, Infallible>(Bytes::from(fragment))),
    );

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
