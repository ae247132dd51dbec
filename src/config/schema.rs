//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the splitter.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the traffic splitter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Proxy listener settings.
    pub listener: ListenerConfig,

    /// Host name sent upstream when `rewrite_host` is enabled.
    pub origin_host_name: String,

    /// Replace the outbound Host header with `origin_host_name`.
    pub rewrite_host: bool,

    /// Upstream base URLs. Index 0 is the primary, the rest are shadows.
    pub upstreams: Vec<String>,

    /// Inbound headers that are never forwarded upstream.
    pub strip_request_headers: Vec<String>,

    /// Outbound call timeouts.
    pub timeouts: TimeoutConfig,

    /// Response capture limits.
    pub capture: CaptureConfig,

    /// Event retention settings.
    pub events: EventConfig,

    /// Introspection surface settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            origin_host_name: String::new(),
            rewrite_host: false,
            upstreams: Vec::new(),
            strip_request_headers: vec!["x-forwarded-host".to_string()],
            timeouts: TimeoutConfig::default(),
            capture: CaptureConfig::default(),
            events: EventConfig::default(),
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// Proxy port.
    pub port: u16,

    /// Largest inbound request body buffered for replay.
    pub max_body_bytes: usize,
}

impl ListenerConfig {
    /// `host:port` suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1234,
            max_body_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one upstream call, body included, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
        }
    }
}

/// Response capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bytes retained per upstream response. Anything past this is still
    /// relayed to the client but dropped from the captured copy.
    pub max_body_bytes: u64,

    /// Size of the chunks written to the client.
    pub chunk_bytes: usize,

    /// Chunks buffered between the upstream read and the client write.
    pub relay_buffer_chunks: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            chunk_bytes: 64 * 1024,
            relay_buffer_chunks: 8,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    /// Number of HandleResult snapshots kept for polling.
    pub retention: usize,

    /// Capacity of the live subscriber channel.
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            retention: 100,
            channel_capacity: 256,
        }
    }
}

/// Admin (introspection) surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the introspection endpoints.
    pub enabled: bool,

    /// Interface to bind.
    pub host: String,

    /// Admin port.
    pub port: u16,

    /// Optional API key (Bearer token). Unset means no authentication.
    pub api_key: Option<String>,
}

impl AdminConfig {
    /// `host:port` suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8888,
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
