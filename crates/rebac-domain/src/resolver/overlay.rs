//! Read-through overlay of request-scoped contextual tuples.
//!
//! Every lookup consults the contextual set first and then the wrapped
//! reader. Persisted state is never touched.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DomainError, DomainResult};
use crate::model::{Object, UserRef};

use super::traits::TupleReader;
use super::types::{ContextualTuple, StoredTupleRef};

#[derive(Debug, Clone)]
struct OverlayTuple {
    object: Object,
    relation: String,
    user: StoredTupleRef,
    user_string: String,
}

impl OverlayTuple {
    fn parse(tuple: &ContextualTuple) -> DomainResult<Self> {
        let invalid = |reason: &str| DomainError::InvalidContextualTuple {
            tuple: tuple.to_tuple().to_string(),
            reason: reason.to_string(),
        };

        let object = Object::parse(&tuple.object).map_err(invalid)?;
        if tuple.relation.is_empty() || tuple.relation.contains(['#', ':']) {
            return Err(invalid("relation must be a plain name"));
        }
        let user = match UserRef::parse(&tuple.user).map_err(invalid)? {
            UserRef::Object(object) => {
                StoredTupleRef::new(object.object_type, object.object_id, None)
            }
            UserRef::Wildcard { user_type } => StoredTupleRef::new(user_type, "*", None),
            UserRef::Userset { object, relation } => {
                StoredTupleRef::new(object.object_type, object.object_id, Some(relation))
            }
        };

        Ok(Self {
            object,
            relation: tuple.relation.clone(),
            user_string: user.user(),
            user,
        })
    }
}

/// A `TupleReader` that layers contextual tuples over another reader.
pub struct ContextualOverlay<T: ?Sized> {
    inner: Arc<T>,
    tuples: Arc<Vec<OverlayTuple>>,
}

impl<T: ?Sized> Clone for ContextualOverlay<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            tuples: Arc::clone(&self.tuples),
        }
    }
}

impl<T: TupleReader + ?Sized> ContextualOverlay<T> {
    /// Wraps `inner`, parsing every contextual tuple up front.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidContextualTuple` for a malformed tuple.
    pub fn new(inner: Arc<T>, contextual_tuples: &[ContextualTuple]) -> DomainResult<Self> {
        let tuples = contextual_tuples
            .iter()
            .map(OverlayTuple::parse)
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            inner,
            tuples: Arc::new(tuples),
        })
    }

    /// Returns true if there are no contextual tuples.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Returns the number of contextual tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }
}

#[async_trait]
impl<T: TupleReader + ?Sized> TupleReader for ContextualOverlay<T> {
    async fn read_tuples(
        &self,
        store_id: &str,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTupleRef>> {
        let stored = self
            .inner
            .read_tuples(store_id, object_type, object_id, relation)
            .await?;
        if self.tuples.is_empty() {
            return Ok(stored);
        }

        let mut seen = HashSet::new();
        Ok(self
            .tuples
            .iter()
            .filter(|t| {
                t.object.object_type == object_type
                    && t.object.object_id == object_id
                    && t.relation == relation
            })
            .map(|t| t.user.clone())
            .chain(stored)
            .filter(|t| seen.insert(t.clone()))
            .collect())
    }

    async fn read_starting_with_user(
        &self,
        store_id: &str,
        object_type: &str,
        relation: &str,
        user: &str,
    ) -> DomainResult<Vec<String>> {
        let stored = self
            .inner
            .read_starting_with_user(store_id, object_type, relation, user)
            .await?;
        if self.tuples.is_empty() {
            return Ok(stored);
        }

        let mut seen = HashSet::new();
        Ok(self
            .tuples
            .iter()
            .filter(|t| {
                t.object.object_type == object_type
                    && t.relation == relation
                    && t.user_string == user
            })
            .map(|t| t.object.object_id.clone())
            .chain(stored)
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }

    async fn store_exists(&self, store_id: &str) -> DomainResult<bool> {
        self.inner.store_exists(store_id).await
    }

    async fn list_objects_by_type(
        &self,
        store_id: &str,
        object_type: &str,
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        let stored = self
            .inner
            .list_objects_by_type(store_id, object_type, limit)
            .await?;
        if self.tuples.is_empty() {
            return Ok(stored);
        }

        let mut seen = HashSet::new();
        Ok(self
            .tuples
            .iter()
            .filter(|t| t.object.object_type == object_type)
            .map(|t| t.object.object_id.clone())
            .chain(stored)
            .filter(|id| seen.insert(id.clone()))
            .take(limit)
            .collect())
    }
}
