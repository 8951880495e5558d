//! Shared helpers for rebac-server integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rebac_domain::model::AuthorizationModel;
use rebac_server::WriteModelCommand;
use rebac_storage::{
    DataStore, MemoryDataStore, PaginatedResult, PaginationOptions, Store,
    StoredAuthorizationModel, StoredTuple, StorageError, StorageResult, TupleFilter,
};

/// Creates a store with a fresh ULID id.
pub async fn create_test_store(storage: &MemoryDataStore) -> Result<String> {
    let store_id = ulid::Ulid::new().to_string();
    storage.create_store(&store_id, "integration").await?;
    Ok(store_id)
}

/// Writes a model given in its JSON form and returns the model id.
pub async fn create_authorization_model(
    storage: &Arc<MemoryDataStore>,
    store_id: &str,
    model: serde_json::Value,
) -> Result<String> {
    let model: AuthorizationModel = serde_json::from_value(model)?;
    let id = WriteModelCommand::new(Arc::clone(storage))
        .execute(store_id, &model)
        .await?;
    Ok(id)
}

/// Writes tuples given as `(object, relation, user)`.
pub async fn write_tuples(
    storage: &MemoryDataStore,
    store_id: &str,
    tuples: &[(&str, &str, &str)],
) -> Result<()> {
    let writes = tuples
        .iter()
        .map(|(object, relation, user)| StoredTuple::from_keys(object, relation, user))
        .collect::<Result<Vec<_>, _>>()?;
    storage.write_tuples(store_id, writes, vec![]).await?;
    Ok(())
}

/// Wraps a store so that every tuple read sleeps first.
///
/// Store and model lookups are only delayed after `delay_lookups`.
pub struct SlowDataStore {
    inner: Arc<MemoryDataStore>,
    delay: Duration,
    delay_lookups: bool,
}

impl SlowDataStore {
    pub fn new(inner: Arc<MemoryDataStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            delay_lookups: false,
        }
    }

    /// Delays `get_store` and model reads as well.
    pub fn delay_lookups(mut self) -> Self {
        self.delay_lookups = true;
        self
    }

    async fn lookup_delay(&self) {
        if self.delay_lookups {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl DataStore for SlowDataStore {
    async fn create_store(&self, id: &str, name: &str) -> StorageResult<Store> {
        self.inner.create_store(id, name).await
    }

    async fn get_store(&self, id: &str) -> StorageResult<Store> {
        self.lookup_delay().await;
        self.inner.get_store(id).await
    }

    async fn write_tuples(
        &self,
        store_id: &str,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        self.inner.write_tuples(store_id, writes, deletes).await
    }

    async fn read_tuples(
        &self,
        store_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>> {
        tokio::time::sleep(self.delay).await;
        self.inner.read_tuples(store_id, filter).await
    }

    async fn read_tuples_paginated(
        &self,
        store_id: &str,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .read_tuples_paginated(store_id, filter, pagination)
            .await
    }

    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .list_objects_by_type(store_id, object_type, limit)
            .await
    }

    async fn write_authorization_model(
        &self,
        model: StoredAuthorizationModel,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.inner.write_authorization_model(model).await
    }

    async fn get_authorization_model(
        &self,
        store_id: &str,
        model_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.lookup_delay().await;
        self.inner.get_authorization_model(store_id, model_id).await
    }

    async fn get_latest_authorization_model(
        &self,
        store_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.lookup_delay().await;
        self.inner.get_latest_authorization_model(store_id).await
    }
}

/// Wraps a store so that every tuple read fails.
pub struct FailingDataStore {
    inner: Arc<MemoryDataStore>,
}

impl FailingDataStore {
    pub fn new(inner: Arc<MemoryDataStore>) -> Self {
        Self { inner }
    }

    fn failure() -> StorageError {
        StorageError::QueryError {
            message: "connection reset".to_string(),
        }
    }
}

#[async_trait]
impl DataStore for FailingDataStore {
    async fn create_store(&self, id: &str, name: &str) -> StorageResult<Store> {
        self.inner.create_store(id, name).await
    }

    async fn get_store(&self, id: &str) -> StorageResult<Store> {
        self.inner.get_store(id).await
    }

    async fn write_tuples(
        &self,
        store_id: &str,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        self.inner.write_tuples(store_id, writes, deletes).await
    }

    async fn read_tuples(
        &self,
        _store_id: &str,
        _filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>> {
        Err(Self::failure())
    }

    async fn read_tuples_paginated(
        &self,
        _store_id: &str,
        _filter: &TupleFilter,
        _pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>> {
        Err(Self::failure())
    }

    async fn list_objects_by_type(
        &self,
        _store_id: &str,
        _object_type: &str,
        _limit: usize,
    ) -> StorageResult<Vec<String>> {
        Err(Self::failure())
    }

    async fn write_authorization_model(
        &self,
        model: StoredAuthorizationModel,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.inner.write_authorization_model(model).await
    }

    async fn get_authorization_model(
        &self,
        store_id: &str,
        model_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.inner.get_authorization_model(store_id, model_id).await
    }

    async fn get_latest_authorization_model(
        &self,
        store_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.inner.get_latest_authorization_model(store_id).await
    }
}
