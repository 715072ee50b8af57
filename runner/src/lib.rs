//! Forwarding of runner requests.
//!
//! The runner manages deployments on behalf of the gateway. Its API is
//! exposed through the gateway under `/v1/runner`, where each request is
//! authorized and passed through integration hooks before it is proxied.

pub mod api;
pub mod cluster;
pub mod errors;
pub mod forward;
pub mod logs;
pub mod metrics_defs;
pub mod routes;

pub use api::{RunnerApi, router};
pub use errors::RunnerError;
pub use forward::RunnerClient;
