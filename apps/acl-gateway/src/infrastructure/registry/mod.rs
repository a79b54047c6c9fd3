//! Subscriber Registries
//!
//! Dynamic sets of admin subscribers that receive a copy of every admitted
//! call.
//!
//! # Architecture
//!
//! The `ObserverHub` owns two independent registries, one for log
//! subscribers and one for statistics subscribers. Each registry is an arena
//! of slots keyed by registration order:
//!
//! - **register** takes the write lock and appends a slot
//! - **broadcast** takes the read lock and hands the event to every slot with
//!   a non-blocking `try_send`, so a stalled subscriber never holds the lock
//!   or delays the call being observed
//! - **close_all** takes the write lock, marks the registry closed and
//!   cancels every slot's close signal exactly once
//!
//! Each slot buffers up to `capacity` events. When a subscriber falls that
//! far behind, further events are dropped for that subscriber only; they are
//! never retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::domain::events::{CallRecord, LogEvent, StatEvent};
use crate::infrastructure::metrics::{self, SubscriberKind};

// =============================================================================
// Subscription Handles
// =============================================================================

/// Registration-order identifier of a subscriber.
pub type SubscriberId = u64;

/// Receiving side of one registration.
///
/// Owned by the streaming call that registered it. The registry keeps only
/// the sending half and the close signal.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriberId,
    events: mpsc::Receiver<T>,
    close: CancellationToken,
}

impl<T> Subscription<T> {
    /// Identifier assigned at registration.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next event, or `None` once the registry dropped the slot.
    pub async fn recv(&mut self) -> Option<T> {
        self.events.recv().await
    }

    /// Whether the close signal has fired.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Split into the event receiver and the close signal, for use in
    /// `tokio::select!` loops.
    #[must_use]
    pub fn into_parts(self) -> (SubscriberId, mpsc::Receiver<T>, CancellationToken) {
        (self.id, self.events, self.close)
    }
}

/// Sending side kept by the registry.
#[derive(Debug)]
struct Slot<T> {
    events: mpsc::Sender<T>,
    close: CancellationToken,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers whose buffer was full.
    pub dropped: usize,
    /// Subscribers whose receiver is already gone.
    pub stale: usize,
}

/// The registry no longer accepts subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} registry is closed")]
pub struct RegistryClosed(pub SubscriberKind);

// =============================================================================
// Subscriber Registry
// =============================================================================

#[derive(Debug)]
struct RegistryState<T> {
    closed: bool,
    slots: BTreeMap<SubscriberId, Slot<T>>,
}

/// A dynamic set of subscribers of one kind.
#[derive(Debug)]
pub struct SubscriberRegistry<T> {
    kind: SubscriberKind,
    capacity: usize,
    next_id: AtomicU64,
    state: RwLock<RegistryState<T>>,
}

impl<T: Clone> SubscriberRegistry<T> {
    /// Create an empty registry whose slots buffer `capacity` events each.
    #[must_use]
    pub fn new(kind: SubscriberKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            state: RwLock::new(RegistryState {
                closed: false,
                slots: BTreeMap::new(),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// # Errors
    ///
    /// Returns `RegistryClosed` once `close_all` has run.
    pub fn register(&self) -> Result<Subscription<T>, RegistryClosed> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let close = CancellationToken::new();

        let id = {
            let mut state = self.state.write();
            if state.closed {
                return Err(RegistryClosed(self.kind));
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            state.slots.insert(
                id,
                Slot {
                    events: tx,
                    close: close.clone(),
                },
            );
            metrics::set_subscribers(self.kind, state.slots.len());
            id
        };

        tracing::debug!(kind = self.kind.as_str(), subscriber_id = id, "Subscriber registered");

        Ok(Subscription {
            id,
            events: rx,
            close,
        })
    }

    /// Hand a copy of `event` to every current subscriber without blocking.
    pub fn broadcast(&self, event: &T) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let state = self.state.read();

        for (id, slot) in &state.slots {
            match slot.events.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::debug!(
                        kind = self.kind.as_str(),
                        subscriber_id = id,
                        "Subscriber buffer full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => report.stale += 1,
            }
        }

        report
    }

    /// Remove one subscriber. Unknown ids are ignored.
    pub fn deregister(&self, id: SubscriberId) {
        let removed = {
            let mut state = self.state.write();
            let removed = state.slots.remove(&id);
            metrics::set_subscribers(self.kind, state.slots.len());
            removed
        };

        if let Some(slot) = removed {
            slot.close.cancel();
            tracing::debug!(kind = self.kind.as_str(), subscriber_id = id, "Subscriber removed");
        }
    }

    /// Close the registry and signal every subscriber to finish.
    ///
    /// Returns how many subscribers were closed. Later calls close nothing
    /// and return 0.
    pub fn close_all(&self) -> usize {
        let slots = {
            let mut state = self.state.write();
            state.closed = true;
            std::mem::take(&mut state.slots)
        };
        metrics::set_subscribers(self.kind, 0);

        for slot in slots.values() {
            slot.close.cancel();
        }
        slots.len()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().slots.len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().slots.is_empty()
    }

    /// Whether `close_all` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

// =============================================================================
// Observer Hub
// =============================================================================

/// Buffer sizes for subscriber slots.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Events buffered per log subscriber.
    pub log_capacity: usize,
    /// Events buffered per statistics subscriber.
    pub stat_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_capacity: 1_024,
            stat_capacity: 1_024,
        }
    }
}

/// Both subscriber registries, fed by the interceptor.
#[derive(Debug)]
pub struct ObserverHub {
    log: SubscriberRegistry<LogEvent>,
    stat: SubscriberRegistry<StatEvent>,
}

impl ObserverHub {
    /// Create a hub with the given buffer sizes.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            log: SubscriberRegistry::new(SubscriberKind::Log, config.log_capacity),
            stat: SubscriberRegistry::new(SubscriberKind::Stat, config.stat_capacity),
        }
    }

    /// Create a hub with default buffer sizes.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HubConfig::default())
    }

    /// Log subscriber registry.
    #[must_use]
    pub const fn log(&self) -> &SubscriberRegistry<LogEvent> {
        &self.log
    }

    /// Statistics subscriber registry.
    #[must_use]
    pub const fn stat(&self) -> &SubscriberRegistry<StatEvent> {
        &self.stat
    }

    /// Fan one admitted call out to every log and statistics subscriber.
    pub fn notify(&self, call: &CallRecord) {
        let log_report = self.log.broadcast(&call.log_event());
        let stat_report = self.stat.broadcast(&call.stat_event());

        metrics::record_delivery(SubscriberKind::Log, log_report);
        metrics::record_delivery(SubscriberKind::Stat, stat_report);
    }

    /// Close both registries. Safe to call more than once.
    pub fn close_all(&self) -> usize {
        let closed = self.log.close_all() + self.stat.close_all();
        if closed > 0 {
            tracing::info!(subscribers = closed, "Closed admin subscribers");
        }
        closed
    }

    /// Whether the hub no longer accepts subscribers.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.log.is_closed() && self.stat.is_closed()
    }

    /// Current subscriber counts.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            log_subscribers: self.log.len(),
            stat_subscribers: self.stat.len(),
        }
    }
}

/// Shared observer hub reference.
pub type SharedObserverHub = Arc<ObserverHub>;

/// Subscriber counts per registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Registered log subscribers.
    pub log_subscribers: usize,
    /// Registered statistics subscribers.
    pub stat_subscribers: usize,
}

impl HubStats {
    /// Total subscribers across both registries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.log_subscribers + self.stat_subscribers
    }
}

// =============================================================================
// Tests
// =============================================================================
