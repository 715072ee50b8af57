//! Token handling for the gateway.
//!
//! `jwt` holds the low level signing and verification helpers, `admin`
//! decides whether a token may perform an operation on a resource.

pub mod admin;
pub mod errors;
pub mod jwt;
pub mod metrics_defs;
pub mod types;

pub use admin::{AdminManager, PermissionSource};
pub use errors::AuthError;
pub use jwt::JwtManager;
pub use types::{AuthSecret, JwtAlg, Permission};
