//! Read handler implementation.

use std::sync::Arc;

use rebac_storage::{DataStore, PaginationOptions, TupleFilter};
use tracing::{debug, instrument};

use super::types::{ReadError, ReadRequest, ReadResponse, ReadResult, DEFAULT_READ_PAGE_SIZE};

/// Handler for tuple reads.
pub struct ReadQuery<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> ReadQuery<S> {
    /// Creates a new read handler over `storage`.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Validates a read request, returning the storage filter it maps to.
    pub fn validate(&self, request: &ReadRequest) -> ReadResult<TupleFilter> {
        let object = non_empty(&request.object);
        let relation = non_empty(&request.relation);
        let user = non_empty(&request.user);

        let Some(object) = object else {
            if relation.is_some() || user.is_some() {
                return Err(invalid("object type is required when filtering"));
            }
            return Ok(TupleFilter::default());
        };

        let (object_type, object_id) = object
            .split_once(':')
            .ok_or_else(|| invalid(format!("object must be 'type:id' or 'type:': {object}")))?;
        if object_type.is_empty() {
            return Err(invalid(format!("object has no type: {object}")));
        }
        if object_id.is_empty() && user.is_none() {
            return Err(invalid(format!(
                "reading every '{object_type}' object requires a user"
            )));
        }

        Ok(TupleFilter {
            object_type: Some(object_type.to_string()),
            object_id: (!object_id.is_empty()).then(|| object_id.to_string()),
            relation: relation.map(str::to_string),
            user: user.map(str::to_string),
        })
    }

    /// Executes a read request, returning one page of matching tuples.
    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn execute(&self, request: &ReadRequest) -> ReadResult<ReadResponse> {
        let filter = self.validate(request)?;
        let pagination = PaginationOptions {
            page_size: Some(request.page_size.unwrap_or(DEFAULT_READ_PAGE_SIZE)),
            continuation_token: non_empty(&request.continuation_token).map(str::to_string),
        };

        let page = self
            .storage
            .read_tuples_paginated(&request.store_id, &filter, &pagination)
            .await?;

        debug!(
            count = page.items.len(),
            more = page.continuation_token.is_some(),
            "read page"
        );

        Ok(ReadResponse {
            tuples: page.items,
            continuation_token: page.continuation_token,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn invalid(message: impl Into<String>) -> ReadError {
    ReadError::InvalidFilter {
        message: message.into(),
    }
}
