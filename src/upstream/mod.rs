//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! config.upstreams
//!     → registry.rs (ordered snapshot, index 0 = primary)
//!     → dispatcher takes one snapshot per request
//!     → client.rs (one shared reqwest client, no redirects, no cert checks)
//!     → UpstreamResponse (head + streaming body) or UpstreamError
//! ```

pub mod client;
pub mod error;
pub mod registry;

pub use client::{BodyStream, OutboundRequest, TransportClient, UpstreamResponse};
pub use error::UpstreamError;
pub use registry::{Upstream, UpstreamRegistry};
