//! rebac-server: Request handlers and wiring
//!
//! This crate connects the storage layer to the domain engine:
//! - Storage adapters implementing the domain reader traits
//! - ListObjects handler with batch and streamed responses
//! - Read handler for filtered, paginated tuple queries
//! - Authorization model writes
//! - Configuration management and logging setup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rebac-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  adapters.rs    - DataStore → domain traits │
//! │  observability/ - Structured logging        │
//! │  handlers/      - Request handlers          │
//! │    list_objects.rs - ListObjects            │
//! │    read/           - Tuple reads            │
//! │    model.rs        - Model writes           │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod observability;

// Re-exports for convenience
pub use adapters::{DataStoreModelReader, DataStoreTupleReader};
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{ListObjectsHandler, ReadQuery, WriteModelCommand};
