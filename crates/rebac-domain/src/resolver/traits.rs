//! Traits for storage operations needed by the resolver.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::TypeSystem;

use super::types::StoredTupleRef;

/// Trait for tuple storage operations needed by the resolver.
#[async_trait]
pub trait TupleReader: Send + Sync {
    /// Reads the users of `object_type:object_id#relation`.
    async fn read_tuples(
        &self,
        store_id: &str,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTupleRef>>;

    /// Reverse lookup: returns the IDs of `object_type` objects holding
    /// `relation` for exactly `user` (`type:id`, `type:*` or `type:id#rel`).
    async fn read_starting_with_user(
        &self,
        store_id: &str,
        object_type: &str,
        relation: &str,
        user: &str,
    ) -> DomainResult<Vec<String>>;

    /// Checks if a store exists.
    async fn store_exists(&self, store_id: &str) -> DomainResult<bool>;

    /// Lists unique object IDs of a given type that appear in any tuple,
    /// returning at most `limit` IDs.
    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> DomainResult<Vec<String>>;
}

/// Trait for authorization model operations needed by the resolver.
#[async_trait]
pub trait ModelReader: Send + Sync {
    /// Resolves the type system for a model of a store.
    ///
    /// `model_id` of `None` selects the latest model.
    async fn get_type_system(
        &self,
        store_id: &str,
        model_id: Option<&str>,
    ) -> DomainResult<Arc<TypeSystem>>;
}
