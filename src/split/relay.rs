//! Primary response relay.
//!
//! # Responsibilities
//! - Hand the primary's status and headers to the waiting HTTP handler
//! - Stream the body to the client in chunks of at most `chunk_bytes`
//! - Capture a copy of the body up to the configured cap
//!
//! # Design Decisions
//! - The body travels through a bounded channel, so a slow client slows the
//!   upstream read instead of growing memory
//! - Once the head is handed over the status is committed; a later read error
//!   is forwarded as a stream error (the client sees a cut-off response) and
//!   reported to the caller
//! - The upstream body is owned here and dropped on every return path

use std::io;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::split::capture::{CaptureBuffer, CaptureLimits, Captured};
use crate::upstream::{UpstreamError, UpstreamResponse};

/// Client-bound body chunks.
pub type RelayBody = mpsc::Receiver<Result<Bytes, io::Error>>;

/// What the HTTP handler needs to start answering the client.
#[derive(Debug)]
pub struct RelayHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

/// Delivers the primary's head (or its failure) to the HTTP handler.
pub type HeadSender = oneshot::Sender<Result<RelayHead, UpstreamError>>;

/// Relay `response` to the client behind `head_tx`, returning the captured copy.
pub async fn relay(
    response: UpstreamResponse,
    head_tx: HeadSender,
    limits: CaptureLimits,
) -> Result<Captured, UpstreamError> {
    let UpstreamResponse {
        status,
        headers,
        mut body,
    } = response;

    let (body_tx, body_rx) = mpsc::channel(limits.relay_buffer_chunks);
    let head = RelayHead {
        status,
        headers,
        body: body_rx,
    };
    if head_tx.send(Ok(head)).is_err() {
        return Err(UpstreamError::ClientGone);
    }

    let mut capture = CaptureBuffer::new(limits.max_body_bytes);
    while let Some(next) = body.next().await {
        let mut chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = body_tx.send(Err(io::Error::other(err.to_string()))).await;
                return Err(err);
            }
        };

        while !chunk.is_empty() {
            let piece = chunk.split_to(limits.chunk_bytes.min(chunk.len()));
            capture.push(&piece);
            if body_tx.send(Ok(piece)).await.is_err() {
                return Err(UpstreamError::ClientGone);
            }
        }
    }

    Ok(capture.finish())
}
