//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Upstream URLs must be absolute http(s) URLs
//! - Host rewriting needs a usable origin host name
//! - Validate value ranges (sizes and timeouts > 0, ports distinct)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SplitterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - An empty upstream list is allowed; requests are answered with 502

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::SplitterConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &SplitterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (index, raw) in config.upstreams.iter().enumerate() {
        if let Err(message) = check_upstream_url(raw) {
            errors.push(ValidationError::new(format!("upstreams[{}]", index), message));
        }
    }

    if config.rewrite_host {
        if config.origin_host_name.trim().is_empty() {
            errors.push(ValidationError::new(
                "origin_host_name",
                "must be set when rewrite_host is enabled",
            ));
        } else if HeaderValue::from_str(&config.origin_host_name).is_err() {
            errors.push(ValidationError::new(
                "origin_host_name",
                "is not a valid Host header value",
            ));
        }
    }

    for (index, name) in config.strip_request_headers.iter().enumerate() {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("strip_request_headers[{}]", index),
                format!("'{}' is not a valid header name", name),
            ));
        }
    }

    if config.capture.chunk_bytes == 0 {
        errors.push(ValidationError::new("capture.chunk_bytes", "must be greater than 0"));
    }
    if config.capture.relay_buffer_chunks == 0 {
        errors.push(ValidationError::new("capture.relay_buffer_chunks", "must be greater than 0"));
    }
    if config.events.retention == 0 {
        errors.push(ValidationError::new("events.retention", "must be greater than 0"));
    }
    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::new("events.channel_capacity", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    }

    if config.admin.enabled && config.admin.port == config.listener.port && config.listener.port != 0 {
        errors.push(ValidationError::new(
            "admin.port",
            format!("conflicts with listener.port {}", config.listener.port),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("'{}' is not a valid URL: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", raw));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SplitterConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = SplitterConfig::default();
        config.upstreams = vec![
            "http://primary:8080".into(),
            "ftp://shadow".into(),
            "not a url".into(),
        ];
        config.rewrite_host = true;
        config.capture.chunk_bytes = 0;
        config.admin.port = config.listener.port;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "upstreams[1]",
                "upstreams[2]",
                "origin_host_name",
                "capture.chunk_bytes",
                "admin.port",
            ]
        );
    }

    #[test]
    fn rejects_bad_strip_header() {
        let mut config = SplitterConfig::default();
        config.strip_request_headers.push("bad header".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "strip_request_headers[1]");
    }

    #[test]
    fn admin_port_clash_ignored_when_disabled() {
        let mut config = SplitterConfig::default();
        config.admin.enabled = false;
        config.admin.port = config.listener.port;
        assert!(validate_config(&config).is_ok());
    }
}
