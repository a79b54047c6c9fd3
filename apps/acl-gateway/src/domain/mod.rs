//! Domain Layer - Access policy and call observation types.
//!
//! Pure types with no transport dependencies: the access policy consulted on
//! every call, and the events and windows produced for admin subscribers.

/// Consumer access control policy.
pub mod acl;

/// Call log and statistics events.
pub mod events;
