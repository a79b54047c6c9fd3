//! Infrastructure Layer - Adapters and runtime plumbing.
//!
//! Everything that touches the network, the clock or process-wide state
//! lives here; the policy and event types it moves around come from the
//! domain layer.

/// Configuration loading.
pub mod config;

/// Gateway lifecycle: server startup and shutdown.
pub mod gateway;

/// gRPC service implementations and generated types.
pub mod grpc;

/// Health check HTTP endpoint.
pub mod health;

/// Access control layer in front of every gRPC service.
pub mod interceptor;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Admin subscriber registries.
pub mod registry;

/// OpenTelemetry tracing integration.
pub mod telemetry;
