//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Calls**: Admitted and denied calls
//! - **Events**: Log and stat events delivered to or dropped for subscribers
//! - **Subscribers**: Active admin subscribers per registry
//! - **Snapshots**: Statistics snapshots sent
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Until
//! `init_metrics` runs, recording is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::infrastructure::registry::DeliveryReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "acl_gateway_calls_admitted_total",
        "Calls that passed the access policy"
    );
    describe_counter!(
        "acl_gateway_calls_denied_total",
        "Calls rejected by the access policy"
    );
    describe_counter!(
        "acl_gateway_events_delivered_total",
        "Events handed to admin subscribers"
    );
    describe_counter!(
        "acl_gateway_events_dropped_total",
        "Events dropped because a subscriber buffer was full"
    );
    describe_gauge!(
        "acl_gateway_subscribers",
        "Registered admin subscribers"
    );
    describe_counter!(
        "acl_gateway_stat_snapshots_total",
        "Statistics snapshots sent to subscribers"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Kind of admin subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKind {
    /// Call log subscriber.
    Log,
    /// Call statistics subscriber.
    Stat,
}

impl SubscriberKind {
    /// Label value for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Stat => "stat",
        }
    }
}

impl std::fmt::Display for SubscriberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a call that passed the access policy.
pub fn record_call_admitted(method: &str) {
    counter!(
        "acl_gateway_calls_admitted_total",
        "method" => method.to_string()
    )
    .increment(1);
}

/// Record a call rejected by the access policy.
pub fn record_call_denied(reason: &'static str) {
    counter!(
        "acl_gateway_calls_denied_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record the outcome of one fan-out.
pub fn record_delivery(kind: SubscriberKind, report: DeliveryReport) {
    if report.delivered > 0 {
        counter!(
            "acl_gateway_events_delivered_total",
            "kind" => kind.as_str()
        )
        .increment(report.delivered as u64);
    }
    if report.dropped > 0 {
        counter!(
            "acl_gateway_events_dropped_total",
            "kind" => kind.as_str()
        )
        .increment(report.dropped as u64);
    }
}

/// Update the subscriber gauge for a registry.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(kind: SubscriberKind, count: usize) {
    gauge!(
        "acl_gateway_subscribers",
        "kind" => kind.as_str()
    )
    .set(count as f64);
}

/// Record a statistics snapshot sent to a subscriber.
pub fn record_snapshot_sent() {
    counter!("acl_gateway_stat_snapshots_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
