//! Data types for tuple reads.

use rebac_storage::{StorageError, StoredTuple};

/// Page size used when a request does not set one.
pub const DEFAULT_READ_PAGE_SIZE: u32 = 50;

/// Request for a page of tuples.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// The store to read from.
    pub store_id: String,
    /// `type:id`, or `type:` to match every object of the type.
    pub object: Option<String>,
    pub relation: Option<String>,
    /// `type:id`, `type:*` or `type:id#relation`.
    pub user: Option<String>,
    pub page_size: Option<u32>,
    pub continuation_token: Option<String>,
}

impl ReadRequest {
    /// Creates a request that reads every tuple of a store.
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            ..Default::default()
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

/// One page of tuples.
#[derive(Debug, Clone)]
pub struct ReadResponse {
    pub tuples: Vec<StoredTuple>,
    /// Present when more tuples may follow.
    pub continuation_token: Option<String>,
}

/// Errors that can occur during reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The filter cannot be served.
    #[error("invalid read filter: {message}")]
    InvalidFilter { message: String },

    /// The continuation token was not issued by this store.
    #[error("invalid continuation token")]
    InvalidContinuationToken,

    #[error("store not found: {store_id}")]
    StoreNotFound { store_id: String },

    /// Storage failure while reading.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for ReadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidContinuationToken => ReadError::InvalidContinuationToken,
            StorageError::StoreNotFound { store_id } => ReadError::StoreNotFound { store_id },
            StorageError::InvalidFilter { message } | StorageError::InvalidInput { message } => {
                ReadError::InvalidFilter { message }
            }
            other => ReadError::Storage(other.to_string()),
        }
    }
}

/// Result type for read operations.
pub type ReadResult<T> = Result<T, ReadError>;
