//! HTTP request gate for Bindgate
//!
//! Hosts the protected management endpoints behind LDAP search-and-bind
//! authentication.

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;

pub use metrics::MetricsRecorder;
pub use middleware::auth::AuthenticatedUser;
pub use server::{AppState, GateServer};
