//! ACL Gateway Binary
//!
//! Starts the access-controlled gateway.
//!
//! # Usage
//!
//! ```bash
//! GATEWAY_ACL='{"biz_user": ["/gateway.v1.Biz/Check"]}' cargo run --bin acl-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required (one of)
//! - `GATEWAY_ACL`: ACL as inline JSON
//! - `GATEWAY_ACL_FILE`: path to an ACL JSON file
//!
//! ## Optional
//! - `GATEWAY_LISTEN_ADDR`: gRPC listen address (default: 127.0.0.1:8082)
//! - `GATEWAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `GATEWAY_SUBSCRIBER_BUFFER`: Events buffered per admin subscriber (default: 1024)
//! - `GATEWAY_STREAM_BUFFER`: Messages buffered per admin stream (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: acl-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use acl_gateway::infrastructure::health::{HealthServer, HealthServerState};
use acl_gateway::{Gateway, GatewayConfig, GatewayOptions, init_metrics, init_telemetry};
use anyhow::Context;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let telemetry_guard = init_telemetry();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        otlp_export = telemetry_guard.is_exporting(),
        "Starting ACL gateway"
    );

    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let acl = config.acl.read().context("failed to load ACL")?;
    let options = GatewayOptions {
        hub: config.subscribers.into(),
        admin: config.subscribers.into(),
    };
    let gateway = Gateway::from_acl_json(&acl, options).context("failed to load ACL")?;
    tracing::info!(consumers = ?gateway.policy().consumers(), "Access policy loaded");

    if config.server.health_port != 0 {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            gateway.policy().len(),
            Arc::clone(gateway.hub()),
            gateway.shutdown_token(),
        ));
        let health_server =
            HealthServer::new(config.server.health_port, state, gateway.shutdown_token());

        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let server = gateway.clone();
    let listen_addr = config.server.listen_addr;
    let mut serve_task = tokio::spawn(async move { server.serve_addr(listen_addr).await });

    tokio::select! {
        () = await_shutdown_signal() => {
            gateway.shutdown();
            serve_task.await.context("gateway task panicked")??;
        }
        result = &mut serve_task => {
            gateway.shutdown();
            result.context("gateway task panicked")??;
        }
    }

    tracing::info!("ACL gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        listen_addr = %config.server.listen_addr,
        health_port = config.server.health_port,
        event_buffer = config.subscribers.event_buffer,
        stream_buffer = config.subscribers.stream_buffer,
        "Configuration loaded"
    );
    tracing::debug!(acl = ?config.acl, "ACL source");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
