//! Gateway Lifecycle
//!
//! Owns the access policy, the observer hub and the shutdown token, and runs
//! the tonic server with the ACL layer in front of the `Admin` and `Biz`
//! services.
//!
//! # Shutdown
//!
//! Cancelling the shutdown token (directly or via [`Gateway::shutdown`])
//! first closes every admin subscription, so open `Logging` and `Statistics`
//! streams end cleanly, then lets tonic stop accepting connections and drain
//! in-flight calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::domain::acl::{AccessPolicy, PolicyError};
use crate::infrastructure::grpc::proto::gateway::v1::{
    admin_server::AdminServer, biz_server::BizServer,
};
use crate::infrastructure::grpc::{AdminService, AdminServiceConfig, BizService, ServedMethods};
use crate::infrastructure::interceptor::AclLayer;
use crate::infrastructure::registry::{HubConfig, ObserverHub, SharedObserverHub};

// =============================================================================
// Options
// =============================================================================

/// Tunables for a gateway instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayOptions {
    /// Per-subscriber event buffers.
    pub hub: HubConfig,
    /// Admin stream buffers.
    pub admin: AdminServiceConfig,
}

// =============================================================================
// Gateway
// =============================================================================

/// An access-controlled gRPC gateway.
///
/// Cloning yields another handle to the same gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    policy: Arc<AccessPolicy>,
    hub: SharedObserverHub,
    options: GatewayOptions,
    shutdown: CancellationToken,
    started: Arc<AtomicBool>,
}

impl Gateway {
    /// Create a gateway enforcing `policy`.
    #[must_use]
    pub fn new(policy: AccessPolicy, options: GatewayOptions) -> Self {
        Self {
            policy: Arc::new(policy),
            hub: Arc::new(ObserverHub::new(options.hub)),
            options,
            shutdown: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a gateway from an ACL JSON document.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Policy` if the document is malformed.
    pub fn from_acl_json(text: &str, options: GatewayOptions) -> Result<Self, GatewayError> {
        let policy = AccessPolicy::from_json(text)?;
        Ok(Self::new(policy, options))
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AlreadyStarted` if this gateway was started
    /// before, `GatewayError::Descriptor` if the served method table cannot
    /// be built, or `GatewayError::Transport` if the server fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyStarted);
        }

        let local_addr = listener.local_addr().ok();
        tracing::info!(
            addr = ?local_addr,
            consumers = self.policy.len(),
            "Gateway listening"
        );

        let routes = Arc::new(ServedMethods::gateway()?);
        let admin = AdminService::new(self.options.admin, Arc::clone(&self.hub));
        let layer = AclLayer::new(Arc::clone(&self.policy), routes, Arc::clone(&self.hub));

        let hub = Arc::clone(&self.hub);
        let token = self.shutdown.clone();
        let signal = async move {
            token.cancelled().await;
            let _ = hub.close_all();
        };

        Server::builder()
            .layer(layer)
            .add_service(AdminServer::new(admin))
            .add_service(BizServer::new(BizService::new()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Bind `addr` and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Bind` if the address cannot be bound, otherwise
    /// the same errors as [`Gateway::serve`].
    pub async fn serve_addr(&self, addr: SocketAddr) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Stop the gateway.
    ///
    /// Closes every admin subscription and signals the server to stop.
    /// Calling it again has no further effect.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!("Gateway shutdown requested");
        let _ = self.hub.close_all();
        self.shutdown.cancel();
    }

    /// Token cancelled when the gateway shuts down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The observer hub fed by admitted calls.
    #[must_use]
    pub const fn hub(&self) -> &SharedObserverHub {
        &self.hub
    }

    /// The enforced access policy.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The ACL document could not be loaded.
    #[error("invalid access policy: {0}")]
    Policy(#[from] PolicyError),

    /// `serve` was called on a gateway that already started.
    #[error("gateway already started")]
    AlreadyStarted,

    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The embedded method descriptors could not be decoded.
    #[error("invalid service descriptors: {0}")]
    Descriptor(#[from] prost::DecodeError),

    /// The transport failed while serving.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

// =============================================================================
// Tests
// =============================================================================
