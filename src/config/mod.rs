//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SplitterConfig (validated, immutable)
//!     → handed to the server at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the upstream registry snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the upstream list reloads live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CaptureConfig, EventConfig, ListenerConfig, ObservabilityConfig, SplitterConfig,
    TimeoutConfig,
};
