//! Admin Streaming Service
//!
//! Implements the `Admin` gRPC service: live call logs and windowed call
//! statistics.
//!
//! Each streaming call registers a subscription with the `ObserverHub` and
//! spawns one forwarding task that owns it. The task ends, and the
//! subscription is removed, when either:
//!
//! 1. the subscription's close signal fires (gateway shutdown), ending the
//!    stream cleanly, or
//! 2. the client goes away, detected when the outbound channel closes.

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use super::proto::gateway::v1::{Event, Nothing, Stat, StatInterval, admin_server::Admin};
use crate::domain::events::{LogEvent, StatEvent, StatSnapshot, StatWindow, now_nanos};
use crate::infrastructure::metrics;
use crate::infrastructure::registry::{RegistryClosed, SharedObserverHub};

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Service Configuration
// =============================================================================

/// Configuration for the admin service.
#[derive(Debug, Clone, Copy)]
pub struct AdminServiceConfig {
    /// Outbound messages buffered per streaming client.
    pub stream_buffer: usize,
}

impl Default for AdminServiceConfig {
    fn default() -> Self {
        Self { stream_buffer: 256 }
    }
}

// =============================================================================
// Service Implementation
// =============================================================================

/// gRPC admin service streaming call logs and statistics.
#[derive(Debug, Clone)]
pub struct AdminService {
    config: AdminServiceConfig,
    hub: SharedObserverHub,
}

impl AdminService {
    /// Create an admin service reading from `hub`.
    #[must_use]
    pub const fn new(config: AdminServiceConfig, hub: SharedObserverHub) -> Self {
        Self { config, hub }
    }
}

#[tonic::async_trait]
impl Admin for AdminService {
    type LoggingStream = BoxedStream<Event>;
    type StatisticsStream = BoxedStream<Stat>;

    async fn logging(&self, _request: Request<Nothing>) -> StreamResult<Self::LoggingStream> {
        let subscription = self.hub.log().register().map_err(shutting_down)?;
        let (id, events, close) = subscription.into_parts();
        let (tx, grpc_rx) = mpsc::channel(self.config.stream_buffer);
        let hub = SharedObserverHub::clone(&self.hub);

        tracing::info!(subscriber_id = id, "Log subscriber connected");

        tokio::spawn(async move {
            forward_log_events(events, &close, &tx).await;
            hub.log().deregister(id);
            tracing::info!(subscriber_id = id, "Log subscriber finished");
        });

        let stream = ReceiverStream::new(grpc_rx);
        Ok(Response::new(Box::pin(stream) as Self::LoggingStream))
    }

    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> StreamResult<Self::StatisticsStream> {
        let period = tick_period(request.into_inner().interval_seconds)?;

        let subscription = self.hub.stat().register().map_err(shutting_down)?;
        let (id, events, close) = subscription.into_parts();
        let (tx, grpc_rx) = mpsc::channel(self.config.stream_buffer);
        let hub = SharedObserverHub::clone(&self.hub);

        tracing::info!(
            subscriber_id = id,
            interval_secs = period.as_secs(),
            "Stat subscriber connected"
        );

        tokio::spawn(async move {
            aggregate_stat_events(events, &close, &tx, period).await;
            hub.stat().deregister(id);
            tracing::info!(subscriber_id = id, "Stat subscriber finished");
        });

        let stream = ReceiverStream::new(grpc_rx);
        Ok(Response::new(Box::pin(stream) as Self::StatisticsStream))
    }
}

fn shutting_down(err: RegistryClosed) -> Status {
    tracing::debug!(error = %err, "Subscription refused");
    Status::unavailable("gateway is shutting down")
}

fn tick_period(interval_seconds: i64) -> Result<Duration, Status> {
    u64::try_from(interval_seconds)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            Status::invalid_argument(format!(
                "interval_seconds must be greater than zero, got {interval_seconds}"
            ))
        })
}

// =============================================================================
// Forwarding Loops
// =============================================================================

/// Send one message unless the subscription closes first.
///
/// Returns `false` when the loop should stop.
async fn send_or_close<T>(
    tx: &mpsc::Sender<Result<T, Status>>,
    close: &CancellationToken,
    message: T,
) -> bool {
    tokio::select! {
        biased;
        () = close.cancelled() => false,
        sent = tx.send(Ok(message)) => sent.is_ok(),
    }
}

/// Forward every log event to the client until closed or disconnected.
async fn forward_log_events(
    mut events: mpsc::Receiver<LogEvent>,
    close: &CancellationToken,
    tx: &mpsc::Sender<Result<Event, Status>>,
) {
    loop {
        tokio::select! {
            biased;
            () = close.cancelled() => break,
            () = tx.closed() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                if !send_or_close(tx, close, log_event_to_proto(event)).await {
                    break;
                }
            }
        }
    }
}

/// Fold stat events into a window and flush it to the client every `period`.
///
/// The first window starts at registration and the first snapshot is sent
/// one full period later, even if it is empty.
async fn aggregate_stat_events(
    mut events: mpsc::Receiver<StatEvent>,
    close: &CancellationToken,
    tx: &mpsc::Sender<Result<Stat, Status>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut window = StatWindow::new();

    loop {
        tokio::select! {
            biased;
            () = close.cancelled() => break,
            () = tx.closed() => break,
            Some(event) = events.recv() => window.record(&event),
            _ = ticker.tick() => {
                let snapshot = window.flush(now_nanos());
                if !send_or_close(tx, close, snapshot_to_proto(snapshot)).await {
                    break;
                }
                metrics::record_snapshot_sent();
            }
        }
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn log_event_to_proto(event: LogEvent) -> Event {
    Event {
        timestamp: event.timestamp_nanos,
        consumer: event.consumer,
        method: event.method,
        host: event.origin_host,
    }
}

fn snapshot_to_proto(snapshot: StatSnapshot) -> Stat {
    Stat {
        timestamp: snapshot.timestamp_nanos,
        by_method: snapshot.by_method,
        by_consumer: snapshot.by_consumer,
    }
}

// =============================================================================
// Tests
// =============================================================================
