//! Size-bounded copy of a body for observability.

use axum::body::Bytes;

use crate::config::CaptureConfig;

/// Limits shared by the relay and the shadow drain.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Bytes retained per response.
    pub max_body_bytes: usize,
    /// Largest chunk written to the client.
    pub chunk_bytes: usize,
    /// Chunks buffered between upstream and client.
    pub relay_buffer_chunks: usize,
}

impl From<&CaptureConfig> for CaptureLimits {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            max_body_bytes: usize::try_from(config.max_body_bytes).unwrap_or(usize::MAX),
            chunk_bytes: config.chunk_bytes.max(1),
            relay_buffer_chunks: config.relay_buffer_chunks.max(1),
        }
    }
}

/// Accumulates up to `limit` bytes and counts the rest.
#[derive(Debug)]
pub struct CaptureBuffer {
    buf: Vec<u8>,
    limit: usize,
    seen: u64,
}

/// Result of a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub body: Bytes,
    /// Every byte read, including those past the cap.
    pub total_bytes: u64,
    pub truncated: bool,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            seen: 0,
        }
    }

    /// Record a chunk; only the part that fits under the cap is kept.
    pub fn push(&mut self, chunk: &[u8]) {
        self.seen += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.buf.len());
        if room > 0 {
            let take = room.min(chunk.len());
            self.buf.extend_from_slice(&chunk[..take]);
        }
    }

    pub fn finish(self) -> Captured {
        let truncated = self.seen > self.buf.len() as u64;
        Captured {
            body: Bytes::from(self.buf),
            total_bytes: self.seen,
            truncated,
        }
    }
}
