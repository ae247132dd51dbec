//! Observability side-channel for request lifecycles.
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → HandleResult created (all entries pending) → bus.publish
//!     → each upstream finishes → entry finished → bus.publish
//!
//! bus.rs
//!     → latest snapshot per id (bounded retention) → admin /requests
//!     → broadcast to live subscribers            → admin /events
//! ```

pub mod bus;
pub mod types;

pub use bus::EventBus;
pub use types::{
    header_list, CaptureStatus, CapturedBody, CapturedRequest, Completion, HandleResult, HeaderList,
};
