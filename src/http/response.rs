//! Client-facing responses.
//!
//! # Responsibilities
//! - Turn the primary's relay head into the client response
//! - Map primary failures to gateway status codes
//!
//! # Design Decisions
//! - Upstream headers are relayed verbatim (all values), minus hop-by-hop
//!   headers since the server re-frames the body
//! - The body is a stream over the relay channel; nothing is buffered here
//! - Upstream timeouts become 504, every other pre-commit failure 502

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream;

use crate::http::request::is_hop_by_hop;
use crate::split::relay::RelayHead;
use crate::upstream::UpstreamError;

/// Build the client response from the primary's head.
pub fn relay_response(head: RelayHead) -> Response {
    let RelayHead {
        status,
        headers,
        body,
    } = head;

    let chunks = stream::unfold(body, |mut body| async move {
        body.recv().await.map(|chunk| (chunk, body))
    });

    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() = status;
    let out = response.headers_mut();
    for (name, value) in &headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    response
}

/// Status the client sees when the primary fails before its head arrives.
pub fn status_for(err: &UpstreamError) -> StatusCode {
    match err {
        UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub fn upstream_error(err: &UpstreamError) -> Response {
    (status_for(err), format!("Upstream request failed: {}", err)).into_response()
}

pub fn no_upstreams() -> Response {
    (StatusCode::BAD_GATEWAY, "No upstreams configured").into_response()
}

pub fn body_too_large(limit: usize) -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("Request body exceeds {} bytes", limit),
    )
        .into_response()
}

pub fn unreadable_body() -> Response {
    (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{header, HeaderMap, HeaderValue};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn relays_status_headers_and_body() {
        let (tx, rx) = mpsc::channel(4);
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static("/elsewhere"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.append("vary", HeaderValue::from_static("accept"));
        headers.append("vary", HeaderValue::from_static("origin"));

        tx.send(Ok(Bytes::from_static(b"moved "))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"here"))).await.unwrap();
        drop(tx);

        let response = relay_response(RelayHead {
            status: StatusCode::FOUND,
            headers,
            body: rx,
        });

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(response.headers().get_all("vary").iter().count(), 2);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"moved here"));
    }

    #[test]
    fn timeouts_map_to_504() {
        assert_eq!(status_for(&UpstreamError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&UpstreamError::Connect("refused".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
