//! Types for the graph resolver.

use std::sync::Arc;

use crate::model::Tuple;

/// Request for a permission check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// The store ID to check against.
    pub store_id: String,
    /// The user identifier (e.g., "user:alice").
    pub user: String,
    /// The relation to check (e.g., "viewer").
    pub relation: String,
    /// The object identifier (e.g., "document:readme").
    pub object: String,
    /// Contextual tuples to consider during the check.
    /// Wrapped in Arc for cheap cloning during graph traversal.
    pub contextual_tuples: Arc<Vec<ContextualTuple>>,
    /// Optional authorization model ID to use for the check.
    /// If not provided, the latest model for the store is used.
    pub authorization_model_id: Option<String>,
}

impl CheckRequest {
    /// Creates a new CheckRequest with contextual tuples.
    pub fn new(
        store_id: impl Into<String>,
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
        contextual_tuples: Vec<ContextualTuple>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
            contextual_tuples: Arc::new(contextual_tuples),
            authorization_model_id: None,
        }
    }

    /// Binds the check to a specific authorization model.
    pub fn with_model_id(mut self, authorization_model_id: impl Into<String>) -> Self {
        self.authorization_model_id = Some(authorization_model_id.into());
        self
    }
}

/// A request-scoped tuple layered over the store for a single resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextualTuple {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl ContextualTuple {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }

    /// Returns the tuple in model form for validation.
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(&self.user, &self.relation, &self.object)
    }
}

/// Result of a permission check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether the check is allowed.
    pub allowed: bool,
}

/// Reference to a stored tuple for resolver use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredTupleRef {
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
}

impl StoredTupleRef {
    pub fn new(
        user_type: impl Into<String>,
        user_id: impl Into<String>,
        user_relation: Option<String>,
    ) -> Self {
        Self {
            user_type: user_type.into(),
            user_id: user_id.into(),
            user_relation,
        }
    }

    /// Returns the user as `type:id` or `type:id#relation`.
    pub fn user(&self) -> String {
        match &self.user_relation {
            Some(rel) => format!("{}:{}#{}", self.user_type, self.user_id, rel),
            None => format!("{}:{}", self.user_type, self.user_id),
        }
    }

    /// Returns the type-constraint string this user satisfies
    /// (`user`, `user:*` or `group#member`).
    pub fn type_ref(&self) -> String {
        match &self.user_relation {
            Some(rel) => format!("{}#{}", self.user_type, rel),
            None if self.user_id == "*" => format!("{}:*", self.user_type),
            None => self.user_type.clone(),
        }
    }
}
