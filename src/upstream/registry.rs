//! Upstream registry.
//!
//! # Responsibilities
//! - Hold the ordered list of upstream base URLs (index 0 = primary)
//! - Hand out cheap, consistent snapshots to the dispatcher and admin surface
//! - Swap the whole list atomically on config reload
//!
//! # Design Decisions
//! - Order is preserved and duplicates are kept; position carries meaning
//! - Readers never lock: each request loads one `Arc` snapshot via `ArcSwap`

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use url::Url;

use crate::upstream::error::UpstreamError;

/// A single upstream origin, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upstream {
    url: Url,
}

impl Upstream {
    /// Parse an upstream base URL.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let url = Url::parse(raw).map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", raw, e)))?;
        Ok(Self { url })
    }

    /// The configured base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Process-wide, read-mostly list of upstreams.
#[derive(Debug)]
pub struct UpstreamRegistry {
    upstreams: ArcSwap<Vec<Upstream>>,
}

impl UpstreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            upstreams: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Build a registry from configured URLs, in order.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self, UpstreamError> {
        let upstreams = parse_all(urls)?;
        Ok(Self {
            upstreams: ArcSwap::from_pointee(upstreams),
        })
    }

    /// Append an upstream. No de-duplication is performed.
    pub fn register(&self, upstream: Upstream) {
        self.upstreams.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(upstream.clone());
            next
        });
        tracing::debug!(upstream = %upstream, "Upstream registered");
    }

    /// Current ordered snapshot.
    pub fn list(&self) -> Arc<Vec<Upstream>> {
        self.upstreams.load_full()
    }

    /// Replace every upstream at once. Requests already holding a snapshot keep it.
    pub fn replace<S: AsRef<str>>(&self, urls: &[S]) -> Result<(), UpstreamError> {
        let upstreams = parse_all(urls)?;
        tracing::info!(count = upstreams.len(), "Upstream list replaced");
        self.upstreams.store(Arc::new(upstreams));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.upstreams.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UpstreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_all<S: AsRef<str>>(urls: &[S]) -> Result<Vec<Upstream>, UpstreamError> {
    urls.iter().map(|raw| Upstream::parse(raw.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_preserves_order_and_duplicates() {
        let registry = UpstreamRegistry::new();
        assert!(registry.is_empty());

        registry.register(Upstream::parse("http://a.local").unwrap());
        registry.register(Upstream::parse("http://b.local").unwrap());
        registry.register(Upstream::parse("http://a.local").unwrap());

        let list = registry.list();
        let hosts: Vec<_> = list.iter().map(|u| u.url().host_str().unwrap()).collect();
        assert_eq!(hosts, vec!["a.local", "b.local", "a.local"]);
    }

    #[test]
    fn snapshot_survives_replace() {
        let registry = UpstreamRegistry::from_urls(&["http://old.local"]).unwrap();
        let before = registry.list();

        registry.replace(&["http://new-1.local", "http://new-2.local"]).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].url().host_str(), Some("new-1.local"));
    }

    #[test]
    fn replace_with_invalid_url_keeps_old_list() {
        let registry = UpstreamRegistry::from_urls(&["http://old.local"]).unwrap();
        let err = registry.replace(&["http://fine.local", "::nope::"]).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidUrl(_)));
        assert_eq!(registry.list()[0].url().host_str(), Some("old.local"));
    }

    #[test]
    fn serializes_as_url_object() {
        let upstream = Upstream::parse("http://a.local/base").unwrap();
        let json = serde_json::to_value(&upstream).unwrap();
        assert_eq!(json, serde_json::json!({ "url": "http://a.local/base" }));
    }
}
