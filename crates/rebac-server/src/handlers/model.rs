//! Authorization model persistence.
//!
//! Models are stamped with a fresh ULID and stored as JSON. Once written
//! they never change; updating a store means writing a new model. The model
//! body is stored as given; consistency is the author's concern.

use std::sync::Arc;

use rebac_domain::error::{DomainError, DomainResult};
use rebac_domain::model::AuthorizationModel;
use rebac_storage::{DataStore, StoredAuthorizationModel};
use tracing::{info, instrument};

use crate::adapters::storage_error;

/// Handler for writing authorization models.
pub struct WriteModelCommand<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> WriteModelCommand<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Persists `model`, returning its new id.
    #[instrument(skip(self, model), fields(types = model.type_definitions.len()))]
    pub async fn execute(
        &self,
        store_id: &str,
        model: &AuthorizationModel,
    ) -> DomainResult<String> {
        let id = ulid::Ulid::new().to_string();
        let model = model.clone().with_id(&id);
        let json = serde_json::to_string(&model).map_err(|e| DomainError::ResolverError {
            message: format!("failed to serialize model: {e}"),
        })?;

        self.storage
            .write_authorization_model(StoredAuthorizationModel::new(
                &id,
                store_id,
                &model.schema_version,
                json,
            ))
            .await
            .map_err(storage_error)?;

        info!(store_id, model_id = %id, "authorization model written");
        Ok(id)
    }
}
