//! Call Observation Events
//!
//! Records produced for every admitted call and the per-subscriber window
//! that turns stat events into periodic snapshots.
//!
//! # Lifecycle
//!
//! The interceptor builds one `CallRecord` per admitted call, immediately
//! before the handler runs. From it, one `LogEvent` and one `StatEvent` are
//! cloned into every subscriber registered at that moment. Each statistics
//! subscriber folds its `StatEvent`s into its own `StatWindow`, which is
//! flushed into a `StatSnapshot` and reset on every tick.

use std::collections::HashMap;

use chrono::Utc;

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Saturates at `i64::MAX` for dates past 2262.
#[must_use]
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// =============================================================================
// Call Record
// =============================================================================

/// An admitted call, captured once at admission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Admission time, nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    /// Consumer identity from the call metadata.
    pub consumer: String,
    /// Full method name, `/<service>/<method>`.
    pub method: String,
    /// Remote address of the caller.
    pub origin_host: String,
}

impl CallRecord {
    /// Capture an admitted call, stamping it with the current time.
    #[must_use]
    pub fn admitted(
        consumer: impl Into<String>,
        method: impl Into<String>,
        origin_host: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_nanos: now_nanos(),
            consumer: consumer.into(),
            method: method.into(),
            origin_host: origin_host.into(),
        }
    }

    /// The log subscriber view of this call.
    #[must_use]
    pub fn log_event(&self) -> LogEvent {
        LogEvent {
            timestamp_nanos: self.timestamp_nanos,
            consumer: self.consumer.clone(),
            method: self.method.clone(),
            origin_host: self.origin_host.clone(),
        }
    }

    /// The statistics subscriber view of this call.
    #[must_use]
    pub fn stat_event(&self) -> StatEvent {
        StatEvent {
            consumer: self.consumer.clone(),
            method: self.method.clone(),
        }
    }
}

/// One admitted call as delivered to a log subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Admission time, nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    /// Consumer identity.
    pub consumer: String,
    /// Full method name.
    pub method: String,
    /// Remote address of the caller.
    pub origin_host: String,
}

/// One admitted call as delivered to a statistics subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    /// Consumer identity.
    pub consumer: String,
    /// Full method name.
    pub method: String,
}

// =============================================================================
// Statistics Window
// =============================================================================

/// Counts emitted at the end of one statistics window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Flush time, nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    /// Calls per full method name.
    pub by_method: HashMap<String, u64>,
    /// Calls per consumer.
    pub by_consumer: HashMap<String, u64>,
}

impl StatSnapshot {
    /// Total calls covered by this snapshot.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_method.values().sum()
    }
}

/// Accumulates stat events between two ticks.
///
/// Windows never overlap: `flush` hands out everything recorded so far and
/// starts the next window empty.
#[derive(Debug, Default)]
pub struct StatWindow {
    by_method: HashMap<String, u64>,
    by_consumer: HashMap<String, u64>,
}

impl StatWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call.
    pub fn record(&mut self, event: &StatEvent) {
        *self.by_method.entry(event.method.clone()).or_insert(0) += 1;
        *self.by_consumer.entry(event.consumer.clone()).or_insert(0) += 1;
    }

    /// Close the current window and start a new, empty one.
    pub fn flush(&mut self, timestamp_nanos: i64) -> StatSnapshot {
        StatSnapshot {
            timestamp_nanos,
            by_method: std::mem::take(&mut self.by_method),
            by_consumer: std::mem::take(&mut self.by_consumer),
        }
    }

    /// Calls recorded in the current window.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_method.values().sum()
    }

    /// Whether nothing was recorded since the last flush.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(consumer: &str, method: &str) -> StatEvent {
        StatEvent {
            consumer: consumer.to_string(),
            method: method.to_string(),
        }
    }

    #[test]
    fn call_record_views_share_fields() {
        let record = CallRecord::admitted("alice", "/Biz/Check", "127.0.0.1:5000");
        assert!(record.timestamp_nanos > 0);

        let log = record.log_event();
        assert_eq!(log.timestamp_nanos, record.timestamp_nanos);
        assert_eq!(log.consumer, "alice");
        assert_eq!(log.method, "/Biz/Check");
        assert_eq!(log.origin_host, "127.0.0.1:5000");

        assert_eq!(record.stat_event(), stat("alice", "/Biz/Check"));
    }

    #[test]
    fn window_counts_by_method_and_consumer() {
        let mut window = StatWindow::new();
        window.record(&stat("x", "/Biz/Check"));
        window.record(&stat("y", "/Biz/Check"));
        window.record(&stat("x", "/Biz/Add"));

        assert_eq!(window.total(), 3);
        let snapshot = window.flush(42);
        assert_eq!(snapshot.timestamp_nanos, 42);
        assert_eq!(snapshot.by_method["/Biz/Check"], 2);
        assert_eq!(snapshot.by_method["/Biz/Add"], 1);
        assert_eq!(snapshot.by_consumer["x"], 2);
        assert_eq!(snapshot.by_consumer["y"], 1);
        assert_eq!(snapshot.total(), 3);
    }

    #[test]
    fn flush_resets_the_window() {
        let mut window = StatWindow::new();
        for _ in 0..3 {
            window.record(&stat("x", "/Biz/Check"));
        }

        let first = window.flush(1);
        assert_eq!(first.by_method["/Biz/Check"], 3);
        assert!(window.is_empty());

        let second = window.flush(2);
        assert!(second.by_method.is_empty());
        assert!(second.by_consumer.is_empty());
        assert_eq!(second.total(), 0);
    }

    #[test]
    fn consecutive_windows_partition_events() {
        let mut window = StatWindow::new();
        let mut snapshots = Vec::new();
        let mut recorded = 0_u64;

        for round in 0..5_u64 {
            for _ in 0..round {
                window.record(&stat("x", "/Biz/Check"));
                recorded += 1;
            }
            snapshots.push(window.flush(i64::try_from(round).unwrap()));
        }

        let summed: u64 = snapshots.iter().map(StatSnapshot::total).sum();
        assert_eq!(summed, recorded);
        assert_eq!(snapshots[4].total(), 4);
    }
}
