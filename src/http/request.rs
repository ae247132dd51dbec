//! Outbound request construction.
//!
//! # Responsibilities
//! - Snapshot the inbound request once so it can be replayed to every upstream
//! - Join the inbound path onto each upstream's base path
//! - Merge query parameters (inbound pairs appended after the upstream's own)
//! - Copy headers, minus hop-by-hop and routing-leak headers
//! - Optionally rewrite Host to the configured origin
//!
//! # Design Decisions
//! - Upstream-configured query values are never replaced, only added to
//! - Host and Content-Length are always recomputed by the transport

use axum::body::Bytes;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method, Uri};
use url::Url;

use crate::upstream::{OutboundRequest, Upstream, UpstreamError};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True for connection-scoped headers.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// The inbound request, body fully buffered, shared by every upstream unit.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Header policy applied to every outbound call.
#[derive(Debug, Clone, Default)]
pub struct HeaderPolicy {
    /// Inbound headers dropped before forwarding.
    pub strip: Vec<HeaderName>,
    /// Host sent upstream instead of the upstream's own authority.
    pub host_override: Option<HeaderValue>,
}

impl HeaderPolicy {
    /// Build the policy from configured names. Invalid names are skipped with a warning.
    pub fn new<S: AsRef<str>>(strip: &[S], rewrite_host: bool, origin_host_name: &str) -> Self {
        let strip = strip
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.as_ref().as_bytes()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %name.as_ref(), "Ignoring invalid header name");
                    None
                }
            })
            .collect();

        let host_override = if rewrite_host {
            match HeaderValue::from_str(origin_host_name) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin_host_name = %origin_host_name, "Invalid origin host name, Host rewrite disabled");
                    None
                }
            }
        } else {
            None
        };

        Self { strip, host_override }
    }

    fn forwards(&self, name: &HeaderName) -> bool {
        !(is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || self.strip.contains(name))
    }
}

/// `<upstream base path><inbound path>?<upstream query>&<inbound query>`.
pub fn upstream_url(base: &Url, inbound: &Uri) -> Url {
    let mut url = base.clone();

    let path = inbound.path();
    if !path.is_empty() {
        let joined = format!("{}{}", base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
    }

    if let Some(query) = inbound.query().filter(|q| !q.is_empty()) {
        url.query_pairs_mut()
            .extend_pairs(url::form_urlencoded::parse(query.as_bytes()));
    }

    url
}

/// Copy inbound headers according to `policy`, keeping every value.
pub fn forwarded_headers(inbound: &HeaderMap, policy: &HeaderPolicy) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if policy.forwards(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    if let Some(host) = &policy.host_override {
        headers.insert(header::HOST, host.clone());
    }
    headers
}

/// Build the call for one upstream.
pub fn build_outbound(
    inbound: &InboundRequest,
    upstream: &Upstream,
    policy: &HeaderPolicy,
) -> Result<OutboundRequest, UpstreamError> {
    let url = upstream_url(upstream.url(), &inbound.uri);
    if url.cannot_be_a_base() {
        return Err(UpstreamError::InvalidUrl(url.to_string()));
    }

    Ok(OutboundRequest {
        method: inbound.method.clone(),
        url,
        headers: forwarded_headers(&inbound.headers, policy),
        body: inbound.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn uri(raw: &str) -> Uri {
        raw.parse().unwrap()
    }

    #[test]
    fn path_is_appended_to_base_path() {
        assert_eq!(
            upstream_url(&url("http://a.local"), &uri("/items/1")).as_str(),
            "http://a.local/items/1"
        );
        assert_eq!(
            upstream_url(&url("http://a.local/api/"), &uri("/items")).as_str(),
            "http://a.local/api/items"
        );
        assert_eq!(
            upstream_url(&url("http://a.local/api"), &uri("/")).as_str(),
            "http://a.local/api/"
        );
        assert_eq!(
            upstream_url(&url("http://a.local/api/"), &uri("/v1/")).as_str(),
            "http://a.local/api/v1/"
        );
    }

    #[test]
    fn query_merge_is_additive() {
        let merged = upstream_url(&url("http://a.local/base?env=prod"), &uri("/items?id=5"));
        let pairs: Vec<(String, String)> = merged.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("id".to_string(), "5".to_string()),
            ]
        );
        assert_eq!(merged.path(), "/base/items");
    }

    #[test]
    fn query_merge_keeps_duplicate_keys() {
        let merged = upstream_url(&url("http://a.local?tag=a"), &uri("/?tag=b&tag=c"));
        let tags: Vec<String> = merged
            .query_pairs()
            .filter(|(k, _)| k == "tag")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn no_inbound_query_leaves_base_untouched() {
        let merged = upstream_url(&url("http://a.local/?env=prod"), &uri("/x"));
        assert_eq!(merged.as_str(), "http://a.local/x?env=prod");
    }

    #[test]
    fn headers_filtered_and_multi_values_kept() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("edge.example.com"));
        inbound.insert("x-forwarded-host", HeaderValue::from_static("edge.example.com"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        inbound.append("x-trace", HeaderValue::from_static("one"));
        inbound.append("x-trace", HeaderValue::from_static("two"));

        let policy = HeaderPolicy::new(&["x-forwarded-host"], false, "");
        let headers = forwarded_headers(&inbound, &policy);

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get("x-forwarded-host").is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        let traces: Vec<_> = headers.get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["one", "two"]);
    }

    #[test]
    fn host_rewrite_only_when_enabled() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("edge.example.com"));

        let on = HeaderPolicy::new::<&str>(&[], true, "origin.example.com");
        assert_eq!(forwarded_headers(&inbound, &on)[header::HOST], "origin.example.com");

        let off = HeaderPolicy::new::<&str>(&[], false, "origin.example.com");
        assert!(forwarded_headers(&inbound, &off).get(header::HOST).is_none());
    }

    #[test]
    fn outbound_replays_method_and_body() {
        let inbound = InboundRequest {
            method: Method::PUT,
            uri: uri("/things?id=5"),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{\"a\":1}"),
        };
        let upstream = Upstream::parse("https://shadow.local/v2?env=prod").unwrap();
        let outbound = build_outbound(&inbound, &upstream, &HeaderPolicy::default()).unwrap();

        assert_eq!(outbound.method, Method::PUT);
        assert_eq!(outbound.url.as_str(), "https://shadow.local/v2/things?env=prod&id=5");
        assert_eq!(outbound.body, inbound.body);
    }
}
