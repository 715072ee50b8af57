//! Integrations extend the gateway with hooks that observe or take over
//! requests to selected resources.

pub mod api;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod manager;
pub mod metrics_defs;
pub mod store;

pub use config::{HookKind, IntegrationConfig, IntegrationHook};
pub use errors::IntegrationError;
pub use hooks::HookResponse;
pub use manager::IntegrationManager;
pub use store::{ConfigStore, FileStore, MemoryStore};
