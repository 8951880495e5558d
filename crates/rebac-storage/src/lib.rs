//! rebac-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for the rebac engine:
//! - DataStore trait for tuple and authorization-model storage
//! - In-memory implementation used by tests and single-node deployments
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rebac-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DataStore trait definition   │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - StorageError                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    DataStore, PaginatedResult, PaginationOptions, Store, StoredAuthorizationModel, StoredTuple,
    TupleFilter,
};
