//! Shadow response drain.
//!
//! Reads a shadow upstream's body to the end so the connection is released
//! and the upstream finishes its work. Nothing is written to the client; only
//! a capped copy is kept for observers.

use futures_util::StreamExt;

use crate::split::capture::{CaptureBuffer, CaptureLimits, Captured};
use crate::upstream::{UpstreamError, UpstreamResponse};

/// Consume the whole body of `response`.
pub async fn drain(response: UpstreamResponse, limits: CaptureLimits) -> Result<Captured, UpstreamError> {
    let mut body = response.body;
    let mut capture = CaptureBuffer::new(limits.max_body_bytes);
    while let Some(chunk) = body.next().await {
        capture.push(&chunk?);
    }
    Ok(capture.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn limits(max_body_bytes: usize) -> CaptureLimits {
        CaptureLimits {
            max_body_bytes,
            chunk_bytes: 1024,
            relay_buffer_chunks: 1,
        }
    }

    #[tokio::test]
    async fn reads_past_the_cap() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let body = stream::iter(0..10)
            .map(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from_static(b"0123456789"))
            })
            .boxed();
        let response = UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        };

        let captured = drain(response, limits(25)).await.unwrap();
        assert_eq!(polled.load(Ordering::SeqCst), 10);
        assert_eq!(captured.body.len(), 25);
        assert_eq!(captured.total_bytes, 100);
        assert!(captured.truncated);
    }

    #[tokio::test]
    async fn read_error_is_returned() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(UpstreamError::Timeout),
        ])
        .boxed();
        let response = UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        };
        assert_eq!(drain(response, limits(10)).await, Err(UpstreamError::Timeout));
    }
}
