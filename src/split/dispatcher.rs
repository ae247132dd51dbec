//! Request fan-out engine.
//!
//! # Responsibilities
//! - Buffer the inbound body once and replay it to every upstream
//! - Publish a HandleResult with one pending entry per upstream before any call
//! - Run one concurrent unit per upstream; the primary relays, shadows drain
//! - Apply each unit's outcome as it arrives and re-publish
//! - Propagate caller cancellation to every outstanding unit
//!
//! # Design Decisions
//! - The HTTP handler returns as soon as the primary's head is ready; the
//!   per-request dispatch task keeps running until every unit has finished
//! - Only the dispatch task touches the HandleResult; units report over a
//!   fan-in channel that closes when the last unit drops its sender
//! - Arrival order is irrelevant: the primary is identified by index 0

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::SplitterConfig;
use crate::event::{header_list, Completion, EventBus, HandleResult};
use crate::http::request::{build_outbound, HeaderPolicy, InboundRequest};
use crate::http::response;
use crate::lifecycle::inflight::InflightGuard;
use crate::lifecycle::InflightTracker;
use crate::observability::metrics;
use crate::split::capture::CaptureLimits;
use crate::split::drain::drain;
use crate::split::relay::{relay, HeadSender};
use crate::upstream::{TransportClient, Upstream, UpstreamError, UpstreamRegistry};

/// Per-process settings applied to every dispatch.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub headers: HeaderPolicy,
    pub limits: CaptureLimits,
    /// Largest inbound body accepted for replay.
    pub max_request_body: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &SplitterConfig) -> Self {
        Self {
            headers: HeaderPolicy::new(
                &config.strip_request_headers,
                config.rewrite_host,
                &config.origin_host_name,
            ),
            limits: CaptureLimits::from(&config.capture),
            max_request_body: config.listener.max_body_bytes,
        }
    }
}

/// Fans each inbound request out to every registered upstream.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<UpstreamRegistry>,
    client: TransportClient,
    events: Arc<EventBus>,
    inflight: InflightTracker,
    settings: Arc<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        client: TransportClient,
        events: Arc<EventBus>,
        inflight: InflightTracker,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            client,
            events,
            inflight,
            settings: Arc::new(settings),
        }
    }

    /// Handle one inbound request and produce the client response.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.to_string();

        let limit = self.settings.max_request_body;
        let declared_len = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > limit) {
            tracing::warn!(method = %method, uri = %parts.uri, limit, "Inbound body too large");
            let response = response::body_too_large(limit);
            metrics::record_request(&method, response.status().as_u16(), start);
            return response;
        }

        // Chunked bodies carry no Content-Length, so the limit is enforced while reading too.
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                tracing::warn!(method = %method, uri = %parts.uri, limit, "Inbound body too large");
                let response = response::body_too_large(limit);
                metrics::record_request(&method, response.status().as_u16(), start);
                return response;
            }
            Err(e) => {
                tracing::warn!(method = %method, uri = %parts.uri, error = %e, "Failed to read inbound body");
                let response = response::unreadable_body();
                metrics::record_request(&method, response.status().as_u16(), start);
                return response;
            }
        };

        let upstreams = self.registry.list();
        if upstreams.is_empty() {
            tracing::warn!(method = %method, uri = %parts.uri, "No upstreams configured");
            let response = response::no_upstreams();
            metrics::record_request(&method, response.status().as_u16(), start);
            return response;
        }

        let inbound = InboundRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };
        let result = HandleResult::new(
            &inbound.method,
            &inbound.uri,
            &inbound.headers,
            inbound.body.clone(),
            &upstreams,
        );
        self.events.publish(&result);

        let request_id = inbound
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let span = tracing::debug_span!("dispatch", id = %result.id, request_id = %request_id);
        span.in_scope(|| {
            tracing::debug!(
                method = %inbound.method,
                uri = %inbound.uri,
                upstreams = upstreams.len(),
                "Dispatching request"
            );
        });

        let cancel = Cancellation::new();
        let (head_tx, head_rx) = oneshot::channel();
        // Tracked before the spawn so a shutdown racing this request still waits for it.
        let inflight = self.inflight.track();
        let fanout = Fanout {
            dispatcher: self.clone(),
            inbound: Arc::new(inbound),
            upstreams,
            result,
            cancel: cancel.clone(),
            _inflight: inflight,
        };
        tokio::spawn(fanout.run(head_tx).instrument(span.clone()));

        // Dropping this future (client gone) before the head arrives cancels every unit.
        let guard = cancel.guard();
        let head = head_rx.await;
        guard.disarm();

        let response = match head {
            Ok(Ok(head)) => response::relay_response(head),
            Ok(Err(err)) => {
                span.in_scope(|| tracing::warn!(error = %err, "Primary upstream failed"));
                response::upstream_error(&err)
            }
            Err(_) => {
                let err = UpstreamError::Request("primary upstream task ended unexpectedly".into());
                span.in_scope(|| tracing::error!(error = %err, "Primary upstream failed"));
                response::upstream_error(&err)
            }
        };

        metrics::record_request(&method, response.status().as_u16(), start);
        response
    }
}

/// Per-request cancellation flag shared by the handler and every unit.
#[derive(Debug, Clone)]
struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    fn cancel(&self) {
        self.tx.send_replace(true);
    }

    async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            cancel: Some(self.clone()),
        }
    }
}

/// Cancels on drop unless disarmed.
struct CancelOnDrop {
    cancel: Option<Cancellation>,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.cancel = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            tracing::debug!("Client went away before the response head, cancelling upstream calls");
            cancel.cancel();
        }
    }
}

/// The per-request dispatch task. Sole owner of the HandleResult.
struct Fanout {
    dispatcher: Dispatcher,
    inbound: Arc<InboundRequest>,
    upstreams: Arc<Vec<Upstream>>,
    result: HandleResult,
    cancel: Cancellation,
    _inflight: InflightGuard,
}

impl Fanout {
    async fn run(mut self, head_tx: HeadSender) {
        let (done_tx, mut done_rx) = mpsc::channel(self.upstreams.len());
        let mut units = JoinSet::new();
        let mut head_tx = Some(head_tx);

        for (index, upstream) in self.upstreams.iter().enumerate() {
            let unit = Unit {
                index,
                upstream: upstream.clone(),
                inbound: Arc::clone(&self.inbound),
                client: self.dispatcher.client.clone(),
                settings: Arc::clone(&self.dispatcher.settings),
                head_tx: if index == 0 { head_tx.take() } else { None },
            };
            let cancel = self.cancel.clone();
            let done_tx = done_tx.clone();
            units.spawn(
                async move {
                    let outcome = unit.run(cancel).await;
                    let _ = done_tx.send(outcome).await;
                }
                .in_current_span(),
            );
        }
        drop(done_tx);

        while let Some((index, completion)) = done_rx.recv().await {
            if self.result.finish(index, completion) {
                self.dispatcher.events.publish(&self.result);
            }
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Upstream task failed");
            }
        }
        let orphaned = self
            .result
            .abandon_pending(UpstreamError::Request("upstream task ended unexpectedly".into()));
        if orphaned > 0 {
            self.dispatcher.events.publish(&self.result);
        }

        tracing::debug!("All upstreams finished");
    }
}

/// One (request, upstream) call.
struct Unit {
    index: usize,
    upstream: Upstream,
    inbound: Arc<InboundRequest>,
    client: TransportClient,
    settings: Arc<DispatchSettings>,
    /// Only the primary carries a head sender.
    head_tx: Option<HeadSender>,
}

impl Unit {
    async fn run(self, cancel: Cancellation) -> (usize, Completion) {
        let index = self.index;
        let upstream = self.upstream.to_string();
        let started = Instant::now();

        let mut completion = tokio::select! {
            biased;
            completion = self.call(&cancel) => completion,
            _ = cancel.cancelled() => Completion {
                error: Some(UpstreamError::Cancelled),
                ..Completion::default()
            },
        };
        completion.elapsed = started.elapsed();

        metrics::record_upstream_call(index, completion.error.is_none(), completion.elapsed);
        if completion.truncated {
            metrics::record_truncated(index);
        }

        let elapsed_ms = completion.elapsed.as_millis() as u64;
        match &completion.error {
            None => tracing::debug!(
                index,
                upstream = %upstream,
                status = ?completion.status_code,
                bytes = completion.body_bytes,
                elapsed_ms,
                "Upstream finished"
            ),
            Some(err @ (UpstreamError::ClientGone | UpstreamError::Cancelled)) => {
                tracing::debug!(index, upstream = %upstream, error = %err, elapsed_ms, "Upstream abandoned")
            }
            Some(err) if index == 0 => {
                tracing::warn!(index, upstream = %upstream, error = %err, elapsed_ms, "Primary upstream error")
            }
            Some(err) => {
                tracing::warn!(index, upstream = %upstream, error = %err, elapsed_ms, "Shadow upstream error")
            }
        }

        (index, completion)
    }

    async fn call(self, cancel: &Cancellation) -> Completion {
        let Unit {
            upstream,
            inbound,
            client,
            settings,
            head_tx,
            ..
        } = self;

        let outbound = match build_outbound(&inbound, &upstream, &settings.headers) {
            Ok(outbound) => outbound,
            Err(err) => return failed(head_tx, err),
        };

        let response = match client.send(outbound).await {
            Ok(response) => response,
            Err(err) => return failed(head_tx, err),
        };

        let status_code = Some(response.status.as_u16());
        let headers = header_list(&response.headers);
        let captured = match head_tx {
            Some(head_tx) => relay(response, head_tx, settings.limits).await,
            None => drain(response, settings.limits).await,
        };

        match captured {
            Ok(captured) => Completion {
                status_code,
                headers,
                body: captured.body,
                body_bytes: captured.total_bytes,
                truncated: captured.truncated,
                error: None,
                elapsed: Duration::ZERO,
            },
            Err(err) => {
                if err == UpstreamError::ClientGone {
                    cancel.cancel();
                }
                Completion {
                    status_code,
                    headers,
                    error: Some(err),
                    ..Completion::default()
                }
            }
        }
    }
}

/// Record a failure before any response head, telling the handler if this is the primary.
fn failed(head_tx: Option<HeadSender>, err: UpstreamError) -> Completion {
    if let Some(head_tx) = head_tx {
        let _ = head_tx.send(Err(err.clone()));
    }
    Completion {
        error: Some(err),
        ..Completion::default()
    }
}
