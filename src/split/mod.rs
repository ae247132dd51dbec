//! Traffic splitting subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → dispatcher.rs (buffer body, publish pending HandleResult)
//!     → one unit per upstream, all concurrent
//!         index 0 → relay.rs  (head to handler, body streamed to client, capped capture)
//!         index n → drain.rs  (body read to the end, capped capture)
//!     → fan-in channel, arrival order
//!     → dispatcher marks entry finished → event bus
//! ```
//!
//! # Design Decisions
//! - capture.rs bounds what is retained, never what is relayed
//! - A failing unit only ever affects its own entry

pub mod capture;
pub mod dispatcher;
pub mod drain;
pub mod relay;

pub use capture::{CaptureBuffer, CaptureLimits, Captured};
pub use dispatcher::{DispatchSettings, Dispatcher};
