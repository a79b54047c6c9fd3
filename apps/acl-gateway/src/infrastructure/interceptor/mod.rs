//! Access Control Interceptor
//!
//! A `tower` layer installed in front of every gRPC service. It is the only
//! place where calls are admitted or refused, and the only producer of
//! admin events.
//!
//! # Flow
//!
//! ```text
//! request ──► consumer + method ──► AccessPolicy::check
//!                                      │
//!                    denied ◄──────────┴──────────► admitted
//!                       │                              │
//!         Unauthenticated status            ObserverHub::notify (non-blocking)
//!         (handler never runs)                         │
//!                                              inner service, result unchanged
//! ```
//!
//! Unary and streaming calls look the same at this level: the check runs
//! once, on the request head, before the handler is invoked.
//!
//! Paths that name no served method bypass the check entirely and reach
//! tonic's router, which answers `Unimplemented`. They are never observed,
//! so subscribers and metric labels only ever see real methods.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{Request, Response};
use tonic::Status;
use tonic::transport::server::TcpConnectInfo;
use tower::{Layer, Service};

use crate::domain::acl::{AccessDenied, AccessPolicy};
use crate::domain::events::CallRecord;
use crate::infrastructure::grpc::ServedMethods;
use crate::infrastructure::metrics;
use crate::infrastructure::registry::SharedObserverHub;

/// Metadata key carrying the caller's consumer identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

/// Origin host recorded when the transport exposes no peer address.
const UNKNOWN_HOST: &str = "unknown";

// =============================================================================
// Layer
// =============================================================================

/// Layer wrapping services in an `AclService`.
#[derive(Debug, Clone)]
pub struct AclLayer {
    policy: Arc<AccessPolicy>,
    routes: Arc<ServedMethods>,
    hub: SharedObserverHub,
}

impl AclLayer {
    /// Create a layer enforcing `policy` on the `routes` it guards and
    /// reporting admitted calls to `hub`.
    #[must_use]
    pub const fn new(
        policy: Arc<AccessPolicy>,
        routes: Arc<ServedMethods>,
        hub: SharedObserverHub,
    ) -> Self {
        Self {
            policy,
            routes,
            hub,
        }
    }
}

impl<S> Layer<S> for AclLayer {
    type Service = AclService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AclService {
            inner,
            policy: Arc::clone(&self.policy),
            routes: Arc::clone(&self.routes),
            hub: Arc::clone(&self.hub),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Service enforcing the access policy before delegating to `inner`.
#[derive(Debug, Clone)]
pub struct AclService<S> {
    inner: S,
    policy: Arc<AccessPolicy>,
    routes: Arc<ServedMethods>,
    hub: SharedObserverHub,
}

impl<S> AclService<S> {
    fn admit<B>(&self, req: &Request<B>) -> Result<CallRecord, AccessDenied> {
        let method = req.uri().path();
        let consumer = req
            .headers()
            .get(CONSUMER_METADATA_KEY)
            .and_then(|value| value.to_str().ok());

        self.policy.check(consumer, method)?;

        let origin_host = req
            .extensions()
            .get::<TcpConnectInfo>()
            .and_then(TcpConnectInfo::remote_addr)
            .map_or_else(|| UNKNOWN_HOST.to_string(), |addr| addr.to_string());

        Ok(CallRecord::admitted(
            consumer.unwrap_or_default(),
            method,
            origin_host,
        ))
    }

    /// Hand the request to the instance that was polled ready.
    fn forward<ReqBody, ResBody>(
        &mut self,
        req: Request<ReqBody>,
    ) -> BoxFuture<'static, Result<Response<ResBody>, S::Error>>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
        S::Future: Send + 'static,
    {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(inner.call(req))
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AclService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !self.routes.contains(req.uri().path()) {
            tracing::debug!(method = %req.uri().path(), "Unrouted call passed through");
            return self.forward(req);
        }

        match self.admit(&req) {
            Ok(call) => {
                tracing::debug!(
                    consumer = %call.consumer,
                    method = %call.method,
                    host = %call.origin_host,
                    "Call admitted"
                );
                metrics::record_call_admitted(&call.method);
                self.hub.notify(&call);
                self.forward(req)
            }
            Err(denied) => {
                tracing::warn!(
                    method = %req.uri().path(),
                    reason = denied.reason(),
                    error = %denied,
                    "Call denied"
                );
                metrics::record_call_denied(denied.reason());

                let response: Response<ResBody> =
                    Status::unauthenticated(denied.to_string()).into_http();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tonic::Code;
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::registry::ObserverHub;

    const POLICY: &str = r#"{
        "alice": ["/Biz/Check"],
        "admin": ["/Biz/*"]
    }"#;

    fn routes() -> Arc<ServedMethods> {
        Arc::new(["/Biz/Check", "/Biz/Add", "/Biz/Test"].into_iter().collect())
    }

    struct Harness {
        hub: SharedObserverHub,
        calls: Arc<AtomicUsize>,
        layer: AclLayer,
    }

    fn harness() -> Harness {
        let policy = Arc::new(AccessPolicy::from_json(POLICY).unwrap());
        let hub = Arc::new(ObserverHub::with_defaults());
        Harness {
            layer: AclLayer::new(policy, routes(), Arc::clone(&hub)),
            hub,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    impl Harness {
        async fn call(&self, method: &str, consumer: Option<&str>) -> Response<String> {
            let calls = Arc::clone(&self.calls);
            let inner = tower::service_fn(move |req: Request<()>| {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = format!("handled {}", req.uri().path());
                async move { Ok::<_, Infallible>(Response::new(body)) }
            });

            let mut builder = Request::builder().uri(method);
            if let Some(consumer) = consumer {
                builder = builder.header(CONSUMER_METADATA_KEY, consumer);
            }
            let request = builder.body(()).unwrap();

            self.layer.layer(inner).oneshot(request).await.unwrap()
        }
    }

    fn status_of(response: &Response<String>) -> Option<Status> {
        Status::from_header_map(response.headers())
    }

    #[tokio::test]
    async fn admitted_call_reaches_handler_unchanged() {
        let h = harness();
        let response = h.call("/Biz/Check", Some("alice")).await;

        assert_eq!(response.body(), "handled /Biz/Check");
        assert!(status_of(&response).is_none());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wildcard_consumer_reaches_every_method() {
        let h = harness();
        for method in ["/Biz/Check", "/Biz/Add", "/Biz/Test"] {
            let response = h.call(method, Some("admin")).await;
            assert_eq!(response.body(), &format!("handled {method}"));
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn denied_call_short_circuits() {
        let h = harness();
        let log = h.hub.log().register().unwrap();

        let response = h.call("/Biz/Add", Some("alice")).await;
        let status = status_of(&response).unwrap();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "not authorized: alice cannot call /Biz/Add");
        assert!(response.body().is_empty());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        // No event may have been produced for the refused call.
        let (_, mut events, _) = log.into_parts();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_consumer_is_unauthenticated() {
        let h = harness();
        let response = h.call("/Biz/Check", None).await;
        let status = status_of(&response).unwrap();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "missing consumer");
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_consumer_is_unauthenticated() {
        let h = harness();
        let response = h.call("/Biz/Check", Some("")).await;
        assert_eq!(status_of(&response).unwrap().message(), "missing consumer");
    }

    #[tokio::test]
    async fn unknown_consumer_is_unauthenticated() {
        let h = harness();
        let response = h.call("/Biz/Check", Some("mallory")).await;
        let status = status_of(&response).unwrap();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "unknown consumer: mallory");
    }

    #[tokio::test]
    async fn admitted_call_notifies_subscribers() {
        let h = harness();
        let mut log = h.hub.log().register().unwrap();
        let mut stat = h.hub.stat().register().unwrap();

        let _ = h.call("/Biz/Check", Some("alice")).await;

        let event = log.recv().await.unwrap();
        assert_eq!(event.consumer, "alice");
        assert_eq!(event.method, "/Biz/Check");
        assert_eq!(event.origin_host, UNKNOWN_HOST);
        assert!(event.timestamp_nanos > 0);

        let event = stat.recv().await.unwrap();
        assert_eq!(event.consumer, "alice");
        assert_eq!(event.method, "/Biz/Check");
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_the_call() {
        let policy = Arc::new(AccessPolicy::from_json(POLICY).unwrap());
        let hub = Arc::new(ObserverHub::new(crate::infrastructure::registry::HubConfig {
            log_capacity: 1,
            stat_capacity: 1,
        }));
        let h = Harness {
            layer: AclLayer::new(policy, routes(), Arc::clone(&hub)),
            hub,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let _never_read = h.hub.log().register().unwrap();

        for _ in 0..10 {
            let response = h.call("/Biz/Check", Some("alice")).await;
            assert_eq!(response.body(), "handled /Biz/Check");
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn unrouted_wildcard_call_is_not_observed() {
        let h = harness();
        let (_, mut log_events, _) = h.hub.log().register().unwrap().into_parts();
        let (_, mut stat_events, _) = h.hub.stat().register().unwrap().into_parts();

        // "/Biz/*" admits the name, but no handler serves it.
        let response = h.call("/Biz/DoesNotExist", Some("admin")).await;

        assert_eq!(response.body(), "handled /Biz/DoesNotExist");
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert!(log_events.try_recv().is_err());
        assert!(stat_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrouted_call_skips_the_policy() {
        let h = harness();
        let response = h.call("/Unknown/Method", None).await;

        assert!(status_of(&response).is_none());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }
}
