//! Authorization model types.
//!
//! This module contains:
//! - Core type definitions (Object, UserRef, Tuple)
//! - Authorization model structures and the userset rewrite tree
//! - `TypeSystem` for cached lookups and structural analysis

mod type_system;
mod types;

pub use type_system::TypeSystem;
pub use types::*;
