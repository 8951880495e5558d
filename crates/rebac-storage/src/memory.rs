//! In-memory storage implementation for testing.
//!
//! Uses `HashSet<StoredTuple>` per store for O(1) write/delete operations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    parse_tuple_cursor, parse_user_filter, tuple_sort_key, validate_object_type,
    validate_store_id, validate_tuple, DataStore, PaginatedResult, PaginationOptions, Store,
    StoredAuthorizationModel, StoredTuple, TupleCursor, TupleFilter, DEFAULT_PAGE_SIZE,
};

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Write tuple**: O(1) average (HashSet insert)
/// - **Delete tuple**: O(1) average (HashSet remove)
/// - **Read tuples**: O(N) where N is total tuples in store (linear scan for filtering)
/// - **Store operations**: O(1) (DashMap lookup)
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    stores: DashMap<String, Store>,
    tuples: DashMap<String, HashSet<StoredTuple>>,
    /// Authorization models keyed by store_id, in insertion order.
    authorization_models: DashMap<String, Vec<StoredAuthorizationModel>>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn ensure_store(&self, store_id: &str) -> StorageResult<()> {
        if !self.stores.contains_key(store_id) {
            return Err(StorageError::StoreNotFound {
                store_id: store_id.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the tuples of a store that match `filter`, unsorted.
    fn filter_tuples(
        &self,
        store_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>> {
        // Parse and validate user filter upfront
        let user_filter = match filter.user {
            Some(ref user) => Some(parse_user_filter(user)?),
            None => None,
        };

        let filtered = self
            .tuples
            .get(store_id)
            .map(|tuples| {
                tuples
                    .iter()
                    .filter(|t| {
                        filter
                            .object_type
                            .as_ref()
                            .map_or(true, |ot| &t.object_type == ot)
                            && filter
                                .object_id
                                .as_ref()
                                .map_or(true, |oi| &t.object_id == oi)
                            && filter.relation.as_ref().map_or(true, |r| &t.relation == r)
                            && user_filter.as_ref().map_or(true, |(ut, ui, ur)| {
                                &t.user_type == ut && &t.user_id == ui && &t.user_relation == ur
                            })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(filtered)
    }
}

/// Sorts authorization models newest-first (created_at DESC, id DESC).
fn sort_models_newest_first(models: &mut [StoredAuthorizationModel]) {
    models.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn create_store(&self, id: &str, name: &str) -> StorageResult<Store> {
        validate_store_id(id)?;

        let now = chrono::Utc::now();
        let store = Store {
            id: id.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        // Atomic check-and-insert
        use dashmap::mapref::entry::Entry;
        match self.stores.entry(id.to_string()) {
            Entry::Occupied(_) => {
                return Err(StorageError::StoreAlreadyExists {
                    store_id: id.to_string(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(store.clone());
            }
        }

        self.tuples.entry(id.to_string()).or_default();

        Ok(store)
    }

    async fn get_store(&self, id: &str) -> StorageResult<Store> {
        self.stores
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| StorageError::StoreNotFound {
                store_id: id.to_string(),
            })
    }

    #[instrument(skip(self, writes, deletes), fields(writes = writes.len(), deletes = deletes.len()))]
    async fn write_tuples(
        &self,
        store_id: &str,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        validate_store_id(store_id)?;
        for tuple in writes.iter().chain(deletes.iter()) {
            validate_tuple(tuple)?;
        }
        self.ensure_store(store_id)?;

        let mut tuples = self.tuples.entry(store_id.to_string()).or_default();

        for tuple in deletes {
            tuples.remove(&tuple);
        }
        // HashSet::insert makes writes idempotent
        for tuple in writes {
            tuples.insert(tuple);
        }

        Ok(())
    }

    async fn read_tuples(
        &self,
        store_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>> {
        self.ensure_store(store_id)?;
        self.filter_tuples(store_id, filter)
    }

    async fn read_tuples_paginated(
        &self,
        store_id: &str,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>> {
        self.ensure_store(store_id)?;

        let cursor = parse_tuple_cursor(&pagination.continuation_token)?;
        let mut filtered = self.filter_tuples(store_id, filter)?;
        filtered.sort_by(|a, b| tuple_sort_key(a).cmp(&tuple_sort_key(b)));

        let page_size = pagination.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;

        // Binary search for the first tuple after the cursor
        let start_idx = match cursor {
            Some(ref cursor) => {
                let cursor_key = cursor.sort_key();
                filtered
                    .binary_search_by(|t| tuple_sort_key(t).cmp(&cursor_key))
                    .map(|i| i + 1)
                    .unwrap_or_else(|i| i)
            }
            None => 0,
        };

        let remaining = filtered.len().saturating_sub(start_idx);
        let items: Vec<StoredTuple> = filtered
            .into_iter()
            .skip(start_idx)
            .take(page_size)
            .collect();

        let continuation_token = if remaining > page_size {
            items.last().map(|t| TupleCursor::from_tuple(t).encode())
        } else {
            None
        };

        Ok(PaginatedResult {
            items,
            continuation_token,
        })
    }

    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        validate_store_id(store_id)?;
        validate_object_type(object_type)?;
        self.ensure_store(store_id)?;

        let mut unique_ids: Vec<String> = self
            .tuples
            .get(store_id)
            .map(|tuples| {
                tuples
                    .iter()
                    .filter(|t| t.object_type == object_type)
                    .map(|t| t.object_id.clone())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();

        unique_ids.sort();
        unique_ids.truncate(limit);

        Ok(unique_ids)
    }

    async fn write_authorization_model(
        &self,
        model: StoredAuthorizationModel,
    ) -> StorageResult<StoredAuthorizationModel> {
        validate_store_id(&model.store_id)?;
        self.ensure_store(&model.store_id)?;

        self.authorization_models
            .entry(model.store_id.clone())
            .or_default()
            .push(model.clone());

        Ok(model)
    }

    async fn get_authorization_model(
        &self,
        store_id: &str,
        model_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.ensure_store(store_id)?;

        self.authorization_models
            .get(store_id)
            .and_then(|models| models.iter().find(|m| m.id == model_id).cloned())
            .ok_or_else(|| StorageError::ModelNotFound {
                model_id: model_id.to_string(),
            })
    }

    async fn get_latest_authorization_model(
        &self,
        store_id: &str,
    ) -> StorageResult<StoredAuthorizationModel> {
        self.ensure_store(store_id)?;

        let mut models: Vec<StoredAuthorizationModel> = self
            .authorization_models
            .get(store_id)
            .map(|models| models.to_vec())
            .unwrap_or_default();

        sort_models_newest_first(&mut models);

        models
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::ModelNotFound {
                model_id: format!("latest (no models exist for store {store_id})"),
            })
    }
}
