//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (rebac-domain) defines abstract traits for data access:
//! - `TupleReader`: Read tuples for checks and reverse expansion
//! - `ModelReader`: Resolve authorization models into type systems
//!
//! The storage layer (rebac-storage) provides the `DataStore` trait.
//! These adapters implement the domain traits on top of any `DataStore`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use rebac_domain::error::{DomainError, DomainResult};
use rebac_domain::model::{AuthorizationModel, TypeSystem};
use rebac_domain::resolver::{ModelReader, StoredTupleRef, TupleReader};
use rebac_storage::{DataStore, StorageError, StoredAuthorizationModel, TupleFilter};

/// Converts a storage failure into its domain counterpart.
///
/// Missing stores and models keep their identity so callers can report them
/// as validation failures; everything else is a storage fault.
pub(crate) fn storage_error(err: StorageError) -> DomainError {
    match err {
        StorageError::StoreNotFound { store_id } => DomainError::StoreNotFound { store_id },
        StorageError::ModelNotFound { model_id } => DomainError::ModelNotFound { model_id },
        other => DomainError::StorageError {
            message: other.to_string(),
        },
    }
}

/// Adapter that implements `TupleReader` using a `DataStore`.
pub struct DataStoreTupleReader<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> DataStoreTupleReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore> TupleReader for DataStoreTupleReader<S> {
    async fn read_tuples(
        &self,
        store_id: &str,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTupleRef>> {
        let filter = TupleFilter {
            object_type: Some(object_type.to_string()),
            object_id: Some(object_id.to_string()),
            relation: Some(relation.to_string()),
            user: None,
        };

        let tuples = self
            .storage
            .read_tuples(store_id, &filter)
            .await
            .map_err(storage_error)?;

        Ok(tuples
            .into_iter()
            .map(|t| StoredTupleRef::new(t.user_type, t.user_id, t.user_relation))
            .collect())
    }

    async fn read_starting_with_user(
        &self,
        store_id: &str,
        object_type: &str,
        relation: &str,
        user: &str,
    ) -> DomainResult<Vec<String>> {
        let filter = TupleFilter {
            object_type: Some(object_type.to_string()),
            object_id: None,
            relation: Some(relation.to_string()),
            user: Some(user.to_string()),
        };

        let tuples = self
            .storage
            .read_tuples(store_id, &filter)
            .await
            .map_err(storage_error)?;

        Ok(tuples.into_iter().map(|t| t.object_id).collect())
    }

    async fn store_exists(&self, store_id: &str) -> DomainResult<bool> {
        match self.storage.get_store(store_id).await {
            Ok(_) => Ok(true),
            Err(StorageError::StoreNotFound { .. }) => Ok(false),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        self.storage
            .list_objects_by_type(store_id, object_type, limit)
            .await
            .map_err(storage_error)
    }
}

/// Adapter that implements `ModelReader` using a `DataStore`.
///
/// Stored models are immutable once written, so each parsed `TypeSystem` is
/// cached by `(store_id, model_id)` for the lifetime of the adapter. Reads of
/// the latest model still go to storage to pick up newly written models.
pub struct DataStoreModelReader<S: DataStore> {
    storage: Arc<S>,
    type_systems: DashMap<(String, String), Arc<TypeSystem>>,
}

impl<S: DataStore> DataStoreModelReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            type_systems: DashMap::new(),
        }
    }

    /// Number of parsed models currently cached.
    pub fn cached_models(&self) -> usize {
        self.type_systems.len()
    }

    fn parse(stored: &StoredAuthorizationModel) -> DomainResult<TypeSystem> {
        let mut model: AuthorizationModel =
            serde_json::from_str(&stored.model_json).map_err(|e| DomainError::ResolverError {
                message: format!("failed to parse model {}: {}", stored.id, e),
            })?;
        model.id = stored.id.clone();
        Ok(TypeSystem::new(model))
    }
}

#[async_trait]
impl<S: DataStore> ModelReader for DataStoreModelReader<S> {
    async fn get_type_system(
        &self,
        store_id: &str,
        model_id: Option<&str>,
    ) -> DomainResult<Arc<TypeSystem>> {
        if let Some(id) = model_id {
            let key = (store_id.to_string(), id.to_string());
            if let Some(cached) = self.type_systems.get(&key) {
                return Ok(Arc::clone(cached.value()));
            }
        }

        let stored = match model_id {
            Some(id) => self.storage.get_authorization_model(store_id, id).await,
            None => self.storage.get_latest_authorization_model(store_id).await,
        }
        .map_err(storage_error)?;

        let key = (store_id.to_string(), stored.id.clone());
        if let Some(cached) = self.type_systems.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        debug!(store_id, model_id = %stored.id, "parsing authorization model");
        let type_system = Arc::new(Self::parse(&stored)?);
        self.type_systems.insert(key, Arc::clone(&type_system));
        Ok(type_system)
    }
}
