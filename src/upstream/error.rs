//! Errors raised while calling a single upstream.

use std::error::Error as StdError;

use thiserror::Error;

/// Failure of one upstream call.
///
/// Cloneable and string-backed so it can be recorded in a captured snapshot
/// and handed across tasks without sharing the underlying transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Upstream base URL could not be combined with the inbound path.
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// TCP connect or TLS handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The call exceeded its configured deadline.
    #[error("upstream timed out")]
    Timeout,

    /// Any other failure before the response head arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// Reading the response body failed part way through.
    #[error("body read failed: {0}")]
    Body(String),

    /// The caller went away while the primary response was being relayed.
    #[error("client disconnected")]
    ClientGone,

    /// The call was abandoned because the inbound request was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Classify a transport error raised before the response head arrived.
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_connect() {
            UpstreamError::Connect(error_chain(&err))
        } else {
            UpstreamError::Request(error_chain(&err))
        }
    }

    /// Classify a transport error raised while streaming the body.
    pub fn from_body(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Body(error_chain(&err))
        }
    }
}

/// Render an error and all of its sources as one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn chain_includes_sources() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(error_chain(&err), "outer: refused");
    }
}
