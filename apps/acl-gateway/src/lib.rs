#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! ACL Gateway - Access-Controlled RPC Gateway
//!
//! A gRPC server that admits or refuses every call according to a
//! per-consumer access policy, and streams a live call log and windowed call
//! statistics to any number of admin subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Policy and event types
//!   - `acl`: Consumer → method pattern policy and the access check
//!   - `events`: Call records, log/stat events, statistics windows
//!
//! - **Infrastructure**: Runtime plumbing
//!   - `interceptor`: Tower layer enforcing the policy on every call
//!   - `registry`: Log and stat subscriber registries (`ObserverHub`)
//!   - `grpc`: `Admin` and `Biz` service implementations
//!   - `gateway`: Server startup and graceful shutdown
//!   - `config`, `telemetry`, `metrics`, `health`: ambient services
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────────┐  admitted  ┌─────────────┐
//! client call ──►│   AclLayer   │───────────►│ Admin / Biz │
//!                └──────┬───────┘            └─────────────┘
//!                       │ notify (non-blocking)
//!                       ▼
//!                ┌──────────────┐──► Logging stream 1..N
//!                │ ObserverHub  │
//!                └──────────────┘──► Statistics stream 1..N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Policy and event types with no transport dependencies.
pub mod domain;

/// Infrastructure layer - Server, interceptor, subscribers and ambient services.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::acl::{AccessDenied, AccessPolicy, MethodPattern, PolicyError};
pub use domain::events::{CallRecord, LogEvent, StatEvent, StatSnapshot, StatWindow};

// Gateway lifecycle
pub use infrastructure::gateway::{Gateway, GatewayError, GatewayOptions};

// Configuration
pub use infrastructure::config::{AclSource, ConfigError, GatewayConfig};

// Subscriber registries (for integration tests)
pub use infrastructure::registry::{
    HubConfig, HubStats, ObserverHub, RegistryClosed, SharedObserverHub,
};

// gRPC services and generated types (for integration tests)
pub use infrastructure::grpc::{
    AdminService, AdminServiceConfig, BizService, ServedMethods, proto::gateway::v1 as proto,
};

// Interceptor
pub use infrastructure::interceptor::{AclLayer, CONSUMER_METADATA_KEY};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{SubscriberKind, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
