//! DataStore trait definition and shared storage types.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Maximum length of a store identifier.
pub const MAX_STORE_ID_LENGTH: usize = 128;

/// Default page size for paginated reads.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Filter for reading tuples.
///
/// Every populated field must match. `user` accepts the full user string:
/// `type:id`, `type:*` or `type:id#relation`.
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    /// Filter by object type.
    pub object_type: Option<String>,
    /// Filter by object ID.
    pub object_id: Option<String>,
    /// Filter by relation.
    pub relation: Option<String>,
    /// Filter by user.
    pub user: Option<String>,
}

/// A stored tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredTuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
}

impl StoredTuple {
    /// Creates a new StoredTuple.
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        user_type: impl Into<String>,
        user_id: impl Into<String>,
        user_relation: Option<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            user_type: user_type.into(),
            user_id: user_id.into(),
            user_relation,
        }
    }

    /// Builds a tuple from its string keys, e.g.
    /// `("document:readme", "viewer", "group:eng#member")`.
    pub fn from_keys(object: &str, relation: &str, user: &str) -> StorageResult<Self> {
        let (object_type, object_id) =
            object
                .split_once(':')
                .ok_or_else(|| StorageError::InvalidInput {
                    message: format!("object must be in 'type:id' format: {object}"),
                })?;
        let (user_type, user_id, user_relation) = parse_user_filter(user)?;
        let tuple = Self::new(
            object_type,
            object_id,
            relation,
            user_type,
            user_id,
            user_relation,
        );
        validate_tuple(&tuple)?;
        Ok(tuple)
    }

    /// Returns the object as `type:id`.
    pub fn object(&self) -> String {
        format!("{}:{}", self.object_type, self.object_id)
    }

    /// Returns the user as `type:id` or `type:id#relation`.
    pub fn user(&self) -> String {
        match &self.user_relation {
            Some(rel) => format!("{}:{}#{}", self.user_type, self.user_id, rel),
            None => format!("{}:{}", self.user_type, self.user_id),
        }
    }
}

/// Store metadata.
#[derive(Debug, Clone)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// An authorization model as persisted by a store.
///
/// The model body is kept as JSON; the storage layer does not interpret it.
#[derive(Debug, Clone)]
pub struct StoredAuthorizationModel {
    pub id: String,
    pub store_id: String,
    pub schema_version: String,
    pub model_json: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl StoredAuthorizationModel {
    /// Creates a new stored model stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        store_id: impl Into<String>,
        schema_version: impl Into<String>,
        model_json: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            store_id: store_id.into(),
            schema_version: schema_version.into(),
            model_json: model_json.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Options for paginated reads.
#[derive(Debug, Clone, Default)]
pub struct PaginationOptions {
    /// Maximum number of items per page. Defaults to [`DEFAULT_PAGE_SIZE`].
    pub page_size: Option<u32>,
    /// Opaque token returned by the previous page.
    pub continuation_token: Option<String>,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// Set when more items may follow.
    pub continuation_token: Option<String>,
}

/// Position of the last tuple returned by a paginated read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleCursor {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
}

impl TupleCursor {
    pub fn from_tuple(tuple: &StoredTuple) -> Self {
        Self {
            object_type: tuple.object_type.clone(),
            object_id: tuple.object_id.clone(),
            relation: tuple.relation.clone(),
            user_type: tuple.user_type.clone(),
            user_id: tuple.user_id.clone(),
            user_relation: tuple.user_relation.clone(),
        }
    }

    /// Encodes the cursor as URL-safe base64 JSON.
    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> StorageResult<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| StorageError::InvalidContinuationToken)?;
        serde_json::from_slice(&bytes).map_err(|_| StorageError::InvalidContinuationToken)
    }

    /// Sort key matching the order used by paginated reads.
    pub fn sort_key(&self) -> (&str, &str, &str, &str, &str, &str) {
        (
            self.object_type.as_str(),
            self.object_id.as_str(),
            self.relation.as_str(),
            self.user_type.as_str(),
            self.user_id.as_str(),
            self.user_relation.as_deref().unwrap_or(""),
        )
    }
}

/// Sort key of a stored tuple, comparable with [`TupleCursor::sort_key`].
pub fn tuple_sort_key(t: &StoredTuple) -> (&str, &str, &str, &str, &str, &str) {
    (
        t.object_type.as_str(),
        t.object_id.as_str(),
        t.relation.as_str(),
        t.user_type.as_str(),
        t.user_id.as_str(),
        t.user_relation.as_deref().unwrap_or(""),
    )
}

/// Parses an optional continuation token into a cursor.
pub fn parse_tuple_cursor(token: &Option<String>) -> StorageResult<Option<TupleCursor>> {
    match token.as_deref() {
        None | Some("") => Ok(None),
        Some(token) => TupleCursor::decode(token).map(Some),
    }
}

/// Parses a user filter into `(type, id, relation)`.
///
/// Accepts `type:id`, `type:*` and `type:id#relation`.
pub fn parse_user_filter(user: &str) -> StorageResult<(String, String, Option<String>)> {
    let (object_part, relation) = match user.split_once('#') {
        Some((obj, rel)) if !rel.is_empty() => (obj, Some(rel.to_string())),
        Some(_) => {
            return Err(StorageError::InvalidFilter {
                message: format!("userset relation cannot be empty: {user}"),
            })
        }
        None => (user, None),
    };

    match object_part.split_once(':') {
        Some((user_type, user_id)) if !user_type.is_empty() && !user_id.is_empty() => {
            Ok((user_type.to_string(), user_id.to_string(), relation))
        }
        _ => Err(StorageError::InvalidFilter {
            message: format!("user must be in 'type:id' format: {user}"),
        }),
    }
}

/// Validates a store identifier.
pub fn validate_store_id(id: &str) -> StorageResult<()> {
    if id.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "store id cannot be empty".to_string(),
        });
    }
    if id.len() > MAX_STORE_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("store id exceeds {MAX_STORE_ID_LENGTH} characters"),
        });
    }
    Ok(())
}

/// Validates an object type name.
pub fn validate_object_type(object_type: &str) -> StorageResult<()> {
    if object_type.is_empty() || object_type.contains(':') || object_type.contains('#') {
        return Err(StorageError::InvalidInput {
            message: format!("invalid object type: '{object_type}'"),
        });
    }
    Ok(())
}

/// Validates that every component of a tuple is present.
pub fn validate_tuple(tuple: &StoredTuple) -> StorageResult<()> {
    validate_object_type(&tuple.object_type)?;
    let missing = if tuple.object_id.is_empty() {
        Some("object_id")
    } else if tuple.relation.is_empty() {
        Some("relation")
    } else if tuple.user_type.is_empty() {
        Some("user_type")
    } else if tuple.user_id.is_empty() {
        Some("user_id")
    } else if tuple.user_relation.as_deref() == Some("") {
        Some("user_relation")
    } else {
        None
    };
    match missing {
        Some(field) => Err(StorageError::InvalidInput {
            message: format!("tuple {field} cannot be empty"),
        }),
        None => Ok(()),
    }
}

/// Abstract storage interface for authorization data.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Store operations

    /// Creates a new store.
    async fn create_store(&self, id: &str, name: &str) -> StorageResult<Store>;

    /// Gets a store by ID.
    async fn get_store(&self, id: &str) -> StorageResult<Store>;

    // Tuple operations

    /// Writes tuples to storage (insert and delete).
    async fn write_tuples(
        &self,
        store_id: &str,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()>;

    /// Reads tuples matching the filter.
    async fn read_tuples(
        &self,
        store_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>>;

    /// Reads one page of tuples matching the filter, ordered by
    /// `(object_type, object_id, relation, user)`.
    async fn read_tuples_paginated(
        &self,
        store_id: &str,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>>;

    /// Lists unique object IDs of a type that appear in any tuple, sorted,
    /// returning at most `limit` IDs.
    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>>;

    // Authorization model operations

    /// Persists an authorization model.
    async fn write_authorization_model(
        &self,
        model: StoredAuthorizationModel,
    ) -> StorageResult<StoredAuthorizationModel>;

    /// Gets a model by ID.
    async fn get_authorization_model(
        &self,
        store_id: &str,
        model_id: &str,
    ) -> StorageResult<StoredAuthorizationModel>;

    /// Gets the most recently written model of a store.
    async fn get_latest_authorization_model(
        &self,
        store_id: &str,
    ) -> StorageResult<StoredAuthorizationModel>;
}
