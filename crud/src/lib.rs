//! Batched reads for the database module.
//!
//! Concurrent reads against the same collection are coalesced by a
//! [`DataLoader`] into a single query, and the result is split back per
//! request with the where-clause [`matcher`].

mod errors;
mod loader;
pub mod matcher;
pub mod metrics_defs;
mod model;

pub use errors::CrudError;
pub use loader::{DataLoader, LoaderOptions};
pub use model::{Operation, QueryMeta, QueryResult, ReadOptions, ReadRequest, ReadRequestKey, Reader};
