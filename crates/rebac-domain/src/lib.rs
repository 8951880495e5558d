//! rebac-domain: Core authorization domain logic
//!
//! This crate contains the core authorization logic including:
//! - Authorization models and the cached type system
//! - Graph resolver for permission checks
//! - The ListObjects engine built on top of both
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rebac-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  model/       - Types & type system         │
//! │  resolver/    - Check graph resolution      │
//! │  listobjects/ - Reverse expansion & checks  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod listobjects;
pub mod model;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use listobjects::{
    ListObjectsOptions, ListObjectsQuery, ListObjectsRequest, ListObjectsResult,
    ListObjectsSink, ListObjectsStrategy, ListObjectsSummary,
};
