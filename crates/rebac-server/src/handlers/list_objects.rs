//! ListObjects handler over a `DataStore`.
//!
//! Wires the storage adapters into the domain `ListObjectsQuery` and adds a
//! channel-based streaming surface: objects are pushed to the receiver as
//! soon as they are proven, and the channel closes when the query ends.

use std::sync::Arc;

use async_trait::async_trait;
use rebac_domain::error::{DomainError, DomainResult};
use rebac_domain::listobjects::{
    ListObjectsOptions, ListObjectsQuery, ListObjectsRequest, ListObjectsResult, ListObjectsSink,
};
use rebac_domain::resolver::ResolverConfig;
use rebac_storage::DataStore;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::adapters::{DataStoreModelReader, DataStoreTupleReader};
use crate::config::ServerConfig;

/// Capacity of the channel returned by [`ListObjectsHandler::streamed`].
pub const STREAM_BUFFER: usize = 100;

/// One object of a streamed ListObjects response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StreamedListObjectsResponse {
    pub object: String,
}

type Query<S> = ListObjectsQuery<DataStoreTupleReader<S>, DataStoreModelReader<S>>;

/// Handler for ListObjects requests.
pub struct ListObjectsHandler<S: DataStore> {
    query: Arc<Query<S>>,
}

impl<S: DataStore> Clone for ListObjectsHandler<S> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
        }
    }
}

impl<S: DataStore> ListObjectsHandler<S> {
    /// Creates a handler with default Check settings.
    pub fn new(storage: Arc<S>, options: ListObjectsOptions) -> Self {
        Self::with_resolver_config(storage, options, ResolverConfig::default())
    }

    /// Creates a handler tuned by the server configuration.
    pub fn from_config(storage: Arc<S>, config: &ServerConfig) -> Self {
        Self::with_resolver_config(
            storage,
            config.list_objects.to_options(),
            config.resolver.to_resolver_config(),
        )
    }

    fn with_resolver_config(
        storage: Arc<S>,
        options: ListObjectsOptions,
        resolver_config: ResolverConfig,
    ) -> Self {
        let tuple_reader = Arc::new(DataStoreTupleReader::new(Arc::clone(&storage)));
        let model_reader = Arc::new(DataStoreModelReader::new(storage));
        Self {
            query: Arc::new(ListObjectsQuery::with_resolver_config(
                tuple_reader,
                model_reader,
                options,
                resolver_config,
            )),
        }
    }

    pub fn options(&self) -> &ListObjectsOptions {
        self.query.options()
    }

    /// Resolves `request` and returns every object found.
    #[instrument(
        skip(self, request),
        fields(
            store_id = %request.store_id,
            object_type = %request.object_type,
            relation = %request.relation,
        )
    )]
    pub async fn execute(&self, request: &ListObjectsRequest) -> DomainResult<ListObjectsResult> {
        self.query.execute(request).await
    }

    /// Resolves `request` in the background, streaming objects through the
    /// returned receiver.
    ///
    /// A failure is delivered as the last item before the channel closes.
    /// Dropping the receiver cancels the query.
    pub fn streamed(
        &self,
        request: ListObjectsRequest,
    ) -> mpsc::Receiver<DomainResult<StreamedListObjectsResponse>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let query = Arc::clone(&self.query);

        tokio::spawn(async move {
            let mut sink = ChannelSink { tx: tx.clone() };
            match query.execute_streamed(&request, &mut sink).await {
                Ok(_) | Err(DomainError::StreamClosed) => {}
                Err(e) => {
                    warn!(error = %e, "streamed ListObjects failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        rx
    }
}

/// Forwards objects into the stream channel.
struct ChannelSink {
    tx: mpsc::Sender<DomainResult<StreamedListObjectsResponse>>,
}

#[async_trait]
impl ListObjectsSink for ChannelSink {
    async fn send(&mut self, object: String) -> DomainResult<()> {
        self.tx
            .send(Ok(StreamedListObjectsResponse { object }))
            .await
            .map_err(|_| DomainError::StreamClosed)
    }
}
