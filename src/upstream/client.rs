//! Shared transport client for outbound calls.
//!
//! # Responsibilities
//! - Own the single HTTP client used for every upstream call
//! - Skip certificate verification (upstreams are often self-signed/internal)
//! - Never follow redirects: the raw 3xx is what gets relayed
//! - Bound each call with connect and total timeouts
//!
//! # Design Decisions
//! - Built once at startup and injected; clones share one connection pool
//! - A failed call is reported for that upstream only

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use url::Url;

use crate::config::TimeoutConfig;
use crate::upstream::error::UpstreamError;

/// Streaming upstream response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// One fully-prepared outbound call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Status and headers of an upstream response, with its body still unread.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The shared outbound HTTP client.
#[derive(Debug, Clone)]
pub struct TransportClient {
    inner: reqwest::Client,
}

impl TransportClient {
    /// Build the client. Call once and clone the result.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .no_proxy()
            .build()?;

        tracing::debug!(
            connect_timeout_secs = timeouts.connect_secs,
            upstream_timeout_secs = timeouts.upstream_secs,
            "Transport client initialized"
        );

        Ok(Self { inner })
    }

    /// Perform one call and return as soon as the response head arrives.
    pub async fn send(&self, outbound: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .inner
            .request(outbound.method, outbound.url)
            .headers(outbound.headers)
            .body(outbound.body)
            .send()
            .await
            .map_err(UpstreamError::from_send)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(UpstreamError::from_body)
            .boxed();

        Ok(UpstreamResponse { status, headers, body })
    }
}
