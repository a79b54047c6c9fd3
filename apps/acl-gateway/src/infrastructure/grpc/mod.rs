//! gRPC Services
//!
//! Wire adapters for the `gateway.v1` schema.
//!
//! # Services
//!
//! - `Admin`: server-streaming subscriptions to the call log and to windowed
//!   call statistics, fed by the `ObserverHub`
//! - `Biz`: pass-through business methods guarded by the interceptor
//!
//! Both services are mounted behind the `AclLayer`, so by the time a handler
//! here runs the call has already been admitted.

pub mod admin;
pub mod biz;
pub mod routes;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod gateway {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/gateway.v1.rs"));
        }
    }
}

pub use admin::{AdminService, AdminServiceConfig};
pub use biz::BizService;
pub use routes::ServedMethods;
