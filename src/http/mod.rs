//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → split::Dispatcher (fan-out)
//!         → request.rs (one outbound request per upstream)
//!     → response.rs (primary head + streamed body, or gateway error)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::{ServerError, SplitterServer};
