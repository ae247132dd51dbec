//! Process-wide sink for HandleResult snapshots.
//!
//! # Responsibilities
//! - Keep the latest snapshot per request id
//! - Evict the oldest requests beyond the retention limit
//! - Fan published snapshots out to live subscribers
//!
//! # Design Decisions
//! - Publishing a known id replaces its snapshot; no history is kept
//! - Updates for an evicted id are broadcast but never stored again
//! - Snapshots are immutable `Arc`s, so readers never block publishers
//! - Subscribers that lag lose intermediate snapshots, never the latest state

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EventConfig;
use crate::event::types::{CapturedBody, HandleResult};
use crate::observability::metrics;

/// Shared event bus.
#[derive(Debug)]
pub struct EventBus {
    snapshots: DashMap<Uuid, Arc<HandleResult>>,
    /// Request ids in first-publish order, oldest at the front.
    order: Mutex<VecDeque<Uuid>>,
    retention: usize,
    live: broadcast::Sender<Arc<HandleResult>>,
}

impl EventBus {
    /// Create a bus with the given retention and subscriber channel capacity.
    pub fn new(config: &EventConfig) -> Self {
        let (live, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            snapshots: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            retention: config.retention.max(1),
            live,
        }
    }

    /// Store a copy of `result` and notify subscribers.
    pub fn publish(&self, result: &HandleResult) {
        let snapshot = Arc::new(result.clone());
        // Only the first publish has every entry pending.
        let first_publish = !result.responses.values().any(CapturedBody::is_finished);
        let fresh = match self.snapshots.entry(snapshot.id) {
            Entry::Occupied(mut stored) => {
                stored.insert(Arc::clone(&snapshot));
                false
            }
            Entry::Vacant(slot) if first_publish => {
                slot.insert(Arc::clone(&snapshot));
                true
            }
            // Evicted already; later updates only reach live subscribers.
            Entry::Vacant(_) => false,
        };

        if fresh {
            let mut order = self.order.lock().expect("event order mutex poisoned");
            order.push_back(snapshot.id);
            while order.len() > self.retention {
                if let Some(evicted) = order.pop_front() {
                    self.snapshots.remove(&evicted);
                }
            }
            metrics::record_events_retained(order.len());
        }

        // No subscribers is not an error.
        let _ = self.live.send(snapshot);
    }

    /// Latest snapshot for one request, if still retained.
    pub fn get(&self, id: &Uuid) -> Option<Arc<HandleResult>> {
        self.snapshots.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Retained snapshots, newest first.
    pub fn recent(&self) -> Vec<Arc<HandleResult>> {
        let order = self.order.lock().expect("event order mutex poisoned");
        order
            .iter()
            .rev()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HandleResult>> {
        self.live.subscribe()
    }

    /// Number of retained requests.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&EventConfig::default())
    }
}
