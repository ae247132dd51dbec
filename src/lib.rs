//! HTTP traffic splitter library.

pub mod admin;
pub mod config;
pub mod event;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod split;
pub mod upstream;

pub use config::schema::SplitterConfig;
pub use http::SplitterServer;
pub use lifecycle::Shutdown;
