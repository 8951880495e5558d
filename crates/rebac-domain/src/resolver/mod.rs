//! Graph resolution engine for permission checks.
//!
//! This module contains:
//! - `GraphResolver`, the Check primitive
//! - `ContextualOverlay`, request-scoped tuples layered over a reader
//! - The `TupleReader` and `ModelReader` seams to storage

mod config;
mod context;
mod graph_resolver;
mod overlay;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{ResolverConfig, DEFAULT_CHECK_TIMEOUT, DEFAULT_MAX_DEPTH};
pub(crate) use graph_resolver::CheckScope;
pub use graph_resolver::GraphResolver;
pub use overlay::ContextualOverlay;
pub use traits::{ModelReader, TupleReader};
pub use types::{CheckRequest, CheckResult, ContextualTuple, StoredTupleRef};
