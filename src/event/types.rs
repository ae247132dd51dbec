//! Per-request lifecycle records published to the event bus.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::upstream::{Upstream, UpstreamError};

/// Header map flattened for observers: name → values, in arrival order.
pub type HeaderList = BTreeMap<String, Vec<String>>;

/// Flatten a header map, keeping every value of multi-value headers.
pub fn header_list(headers: &HeaderMap) -> HeaderList {
    let mut list = HeaderList::new();
    for (name, value) in headers {
        list.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    list
}

fn body_as_text<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

/// Lifecycle state of one upstream's capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Pending,
    Finished,
}

/// The inbound request as received.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedRequest {
    pub headers: HeaderList,
    #[serde(serialize_with = "body_as_text")]
    pub body: Bytes,
}

/// What a finished upstream unit hands back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub status_code: Option<u16>,
    pub headers: HeaderList,
    pub body: Bytes,
    pub body_bytes: u64,
    pub truncated: bool,
    pub error: Option<UpstreamError>,
    pub elapsed: Duration,
}

/// One upstream's response as seen by observers.
///
/// Headers and body never change once `status` is `Finished`.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedBody {
    pub upstream: String,
    pub status: CaptureStatus,
    pub status_code: Option<u16>,
    pub headers: HeaderList,
    #[serde(serialize_with = "body_as_text")]
    pub body: Bytes,
    /// Total body bytes read from the upstream, captured or not.
    pub body_bytes: u64,
    pub truncated: bool,
    pub error: Option<String>,
    pub elapsed_ms: Option<u64>,
}

impl CapturedBody {
    /// Placeholder created before any network call is made.
    pub fn pending(upstream: &Upstream) -> Self {
        Self {
            upstream: upstream.to_string(),
            status: CaptureStatus::Pending,
            status_code: None,
            headers: HeaderList::new(),
            body: Bytes::new(),
            body_bytes: 0,
            truncated: false,
            error: None,
            elapsed_ms: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == CaptureStatus::Finished
    }

    fn finish(&mut self, completion: Completion) {
        self.status = CaptureStatus::Finished;
        self.status_code = completion.status_code;
        self.headers = completion.headers;
        self.body = completion.body;
        self.body_bytes = completion.body_bytes;
        self.truncated = completion.truncated;
        self.error = completion.error.map(|e| e.to_string());
        self.elapsed_ms = Some(completion.elapsed.as_millis() as u64);
    }
}

/// Lifecycle record for one inbound request.
///
/// Serializes with an extra `response` field holding the primary's entry.
#[derive(Debug, Clone)]
pub struct HandleResult {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub received_at_ms: u64,
    pub request: CapturedRequest,
    /// One entry per upstream, keyed by upstream index.
    pub responses: BTreeMap<usize, CapturedBody>,
}

impl Serialize for HandleResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HandleResult", 7)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("method", &self.method)?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("received_at_ms", &self.received_at_ms)?;
        state.serialize_field("request", &self.request)?;
        state.serialize_field("response", &self.primary())?;
        state.serialize_field("responses", &self.responses)?;
        state.end()
    }
}

impl HandleResult {
    /// Create the record with a pending entry for every upstream.
    pub fn new(method: &Method, uri: &Uri, headers: &HeaderMap, body: Bytes, upstreams: &[Upstream]) -> Self {
        let received_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            url: uri.to_string(),
            received_at_ms,
            request: CapturedRequest {
                headers: header_list(headers),
                body,
            },
            responses: upstreams
                .iter()
                .enumerate()
                .map(|(index, upstream)| (index, CapturedBody::pending(upstream)))
                .collect(),
        }
    }

    /// The primary upstream's entry.
    pub fn primary(&self) -> Option<&CapturedBody> {
        self.responses.get(&0)
    }

    /// True once every upstream entry is finished.
    pub fn is_finished(&self) -> bool {
        self.responses.values().all(CapturedBody::is_finished)
    }

    /// Record the outcome for one upstream.
    ///
    /// Returns false (and changes nothing) for an unknown index or an entry
    /// that is already finished.
    pub fn finish(&mut self, index: usize, completion: Completion) -> bool {
        match self.responses.get_mut(&index) {
            Some(entry) if !entry.is_finished() => {
                entry.finish(completion);
                true
            }
            _ => false,
        }
    }

    /// Finish every still-pending entry with `error`. Returns how many changed.
    pub fn abandon_pending(&mut self, error: UpstreamError) -> usize {
        let mut changed = 0;
        for entry in self.responses.values_mut().filter(|e| !e.is_finished()) {
            entry.finish(Completion {
                error: Some(error.clone()),
                ..Completion::default()
            });
            changed += 1;
        }
        changed
    }
}
