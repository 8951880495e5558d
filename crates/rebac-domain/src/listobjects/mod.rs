//! ListObjects: every object of a type on which a user holds a relation.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!   request ──────▶│ ListObjectsQuery         │ validate, bind model,
//!                  │  (orchestrator)          │ pick strategy
//!                  └────────────┬─────────────┘
//!                               │ tokio::spawn
//!               ┌───────────────┴───────────────┐
//!               ▼                               ▼
//!   ┌────────────────────────┐     ┌──────────────────────────────┐
//!   │ ReverseExpand          │     │ ConcurrentChecks             │
//!   │ BFS from the user      │     │ relaxed expansion or type    │
//!   │ (buffer_unordered)     │     │ extent, then bounded Checks  │
//!   └───────────┬────────────┘     └──────────────┬───────────────┘
//!               └──────────── mpsc ───────────────┘
//!                               ▼
//!                   drain: dedup, cap, deadline ──▶ sink
//! ```
//!
//! The cap bounds batch responses only; a streamed response runs until the
//! resolvers finish or the deadline fires. The deadline is measured from
//! request entry and covers the model lookup too.
//!
//! Neither the cap nor the deadline produces an error: whatever was collected
//! by then is returned, flagged as truncated. Storage and model failures are
//! fatal for the whole request.

mod cancel;
mod concurrent_checks;
mod reverse_expand;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::error::{DomainError, DomainResult};
use crate::model::UserRef;
use crate::resolver::{
    CheckScope, ContextualOverlay, ContextualTuple, GraphResolver, ModelReader, ResolverConfig,
    TupleReader,
};

use cancel::{cancellation, CancellationToken};
use reverse_expand::{ExpansionMode, ReverseExpansion};

/// Default number of objects returned by one request.
pub const DEFAULT_MAX_RESULTS: u32 = 1000;

/// Default time budget of one request.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// Default bound on concurrent tuple reads during reverse expansion.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 50;

/// Default bound on concurrent Checks during verification.
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 50;

/// Producers run ahead of the consolidation loop by at most this many
/// objects.
const RESULT_CHANNEL_CAPACITY: usize = 100;

pub(crate) type ObjectSender = mpsc::Sender<DomainResult<String>>;

/// Request for a ListObjects query.
#[derive(Debug, Clone)]
pub struct ListObjectsRequest {
    pub store_id: String,
    /// Object type to list (e.g., "document"). No id part.
    pub object_type: String,
    pub relation: String,
    /// `type:id` or `type:id#relation`. Wildcards are rejected.
    pub user: String,
    /// Model to bind to; the latest model of the store when unset.
    pub authorization_model_id: Option<String>,
    pub contextual_tuples: Vec<ContextualTuple>,
}

impl ListObjectsRequest {
    pub fn new(
        store_id: impl Into<String>,
        object_type: impl Into<String>,
        relation: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            object_type: object_type.into(),
            relation: relation.into(),
            user: user.into(),
            authorization_model_id: None,
            contextual_tuples: Vec::new(),
        }
    }

    pub fn with_contextual_tuples(mut self, contextual_tuples: Vec<ContextualTuple>) -> Self {
        self.contextual_tuples = contextual_tuples;
        self
    }

    pub fn with_model_id(mut self, authorization_model_id: impl Into<String>) -> Self {
        self.authorization_model_id = Some(authorization_model_id.into());
        self
    }
}

/// Tunables of the ListObjects engine.
#[derive(Debug, Clone)]
pub struct ListObjectsOptions {
    /// Result cap. 0 means unbounded.
    pub max_results: u32,
    /// Time budget measured from request entry. Zero selects
    /// [`DEFAULT_DEADLINE`].
    pub deadline: Duration,
    /// Concurrent tuple reads per reverse-expansion level.
    pub max_concurrent_reads: usize,
    /// Concurrent Checks while verifying candidates.
    pub max_concurrent_checks: usize,
    /// Draw verification candidates from a relaxed reverse expansion instead
    /// of every object of the type.
    pub hybrid_candidates: bool,
}

impl Default for ListObjectsOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            deadline: DEFAULT_DEADLINE,
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            hybrid_candidates: true,
        }
    }
}

impl ListObjectsOptions {
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_concurrent_reads(mut self, max_concurrent_reads: usize) -> Self {
        self.max_concurrent_reads = max_concurrent_reads;
        self
    }

    pub fn with_max_concurrent_checks(mut self, max_concurrent_checks: usize) -> Self {
        self.max_concurrent_checks = max_concurrent_checks;
        self
    }

    pub fn with_hybrid_candidates(mut self, hybrid_candidates: bool) -> Self {
        self.hybrid_candidates = hybrid_candidates;
        self
    }

    /// The deadline actually applied.
    pub fn effective_deadline(&self) -> Duration {
        if self.deadline.is_zero() {
            DEFAULT_DEADLINE
        } else {
            self.deadline
        }
    }
}

/// How a request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListObjectsStrategy {
    /// Backward search from the user; every reached object is proven.
    ReverseExpand,
    /// Candidates verified one by one with Check.
    ConcurrentChecks,
}

impl ListObjectsStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReverseExpand => "reverse_expand",
            Self::ConcurrentChecks => "concurrent_checks",
        }
    }
}

/// Result of a batch ListObjects query. Object order is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsResult {
    pub objects: Vec<String>,
    /// True when the cap or the deadline cut resolution short.
    pub truncated: bool,
    /// `None` when the deadline fired while the request was still being
    /// bound to its model.
    pub strategy: Option<ListObjectsStrategy>,
}

/// Final status of a streamed ListObjects query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListObjectsSummary {
    /// Objects the sink accepted.
    pub count: usize,
    /// True when the deadline cut resolution short.
    pub truncated: bool,
    pub strategy: Option<ListObjectsStrategy>,
}

/// Receives objects of a streamed query, each at most once.
#[async_trait]
pub trait ListObjectsSink: Send {
    /// Delivers one object. An error aborts the query.
    async fn send(&mut self, object: String) -> DomainResult<()>;
}

#[async_trait]
impl ListObjectsSink for Vec<String> {
    async fn send(&mut self, object: String) -> DomainResult<()> {
        self.push(object);
        Ok(())
    }
}

/// A validated request, ready to resolve.
pub(crate) struct Plan {
    pub(crate) object_type: String,
    pub(crate) relation: String,
    pub(crate) user: UserRef,
    pub(crate) strategy: ListObjectsStrategy,
    pub(crate) options: ListObjectsOptions,
}

/// ListObjects query engine.
///
/// # Example
///
/// ```ignore
/// let query = ListObjectsQuery::new(tuple_reader, model_reader, ListObjectsOptions::default());
/// let result = query
///     .execute(&ListObjectsRequest::new(store_id, "document", "viewer", "user:alice"))
///     .await?;
/// ```
pub struct ListObjectsQuery<T, M> {
    tuple_reader: Arc<T>,
    model_reader: Arc<M>,
    resolver: Arc<GraphResolver<T, M>>,
    options: ListObjectsOptions,
}

impl<T, M> ListObjectsQuery<T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    pub fn new(tuple_reader: Arc<T>, model_reader: Arc<M>, options: ListObjectsOptions) -> Self {
        Self::with_resolver_config(tuple_reader, model_reader, options, ResolverConfig::default())
    }

    /// Creates a query whose Checks use `resolver_config`.
    pub fn with_resolver_config(
        tuple_reader: Arc<T>,
        model_reader: Arc<M>,
        options: ListObjectsOptions,
        resolver_config: ResolverConfig,
    ) -> Self {
        let resolver = Arc::new(GraphResolver::with_config(
            Arc::clone(&tuple_reader),
            Arc::clone(&model_reader),
            resolver_config,
        ));
        Self {
            tuple_reader,
            model_reader,
            resolver,
            options,
        }
    }

    pub fn options(&self) -> &ListObjectsOptions {
        &self.options
    }

    /// The Check resolver shared by this query.
    pub fn resolver(&self) -> &GraphResolver<T, M> {
        &self.resolver
    }

    /// Resolves `request` and returns the collected objects, at most
    /// `max_results` of them.
    pub async fn execute(&self, request: &ListObjectsRequest) -> DomainResult<ListObjectsResult> {
        let mut objects = Vec::new();
        let summary = self
            .resolve(request, &mut objects, self.options.max_results as usize)
            .await?;
        Ok(ListObjectsResult {
            objects,
            truncated: summary.truncated,
            strategy: summary.strategy,
        })
    }

    /// Resolves `request`, delivering each object to `sink` as soon as it
    /// is proven.
    ///
    /// Streaming is not capped: it runs until the resolvers are exhausted or
    /// the deadline fires.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any resolution starts. Storage
    /// failures and sink errors abort the query. Reaching the deadline is not
    /// an error.
    pub async fn execute_streamed<S>(
        &self,
        request: &ListObjectsRequest,
        sink: &mut S,
    ) -> DomainResult<ListObjectsSummary>
    where
        S: ListObjectsSink + ?Sized,
    {
        self.resolve(request, sink, 0).await
    }

    /// Drains the planned resolver into `sink`. A `max_results` of 0 means
    /// unbounded.
    async fn resolve<S>(
        &self,
        request: &ListObjectsRequest,
        sink: &mut S,
        max_results: usize,
    ) -> DomainResult<ListObjectsSummary>
    where
        S: ListObjectsSink + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.options.effective_deadline();

        let Ok(prepared) = timeout_at(deadline, self.prepare(request)).await else {
            tracing::info!(
                store_id = %request.store_id,
                object_type = %request.object_type,
                relation = %request.relation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "ListObjects deadline reached before resolution started"
            );
            return Ok(ListObjectsSummary {
                count: 0,
                truncated: true,
                strategy: None,
            });
        };
        let (scope, plan) = prepared?;
        let strategy = plan.strategy;

        let (canceller, token) = cancellation();
        let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let producer = tokio::spawn(produce(Arc::clone(&self.resolver), scope, plan, tx, token));

        let mut seen = HashSet::new();
        // Only objects the sink accepted count; a send cut off by the
        // deadline does not.
        let mut delivered = 0;
        let drained = timeout_at(deadline, async {
            while let Some(object) = rx.recv().await {
                let object = object?;
                if !seen.insert(object.clone()) {
                    continue;
                }
                sink.send(object).await?;
                delivered += 1;
                if max_results != 0 && delivered >= max_results {
                    return Ok(true);
                }
            }
            Ok::<_, DomainError>(false)
        })
        .await;
        canceller.cancel();

        let truncated = match drained {
            Ok(Ok(capped)) => {
                if !capped {
                    // The channel only closes once the producer is done.
                    producer.await.map_err(|e| DomainError::ResolverError {
                        message: format!("ListObjects producer failed: {e}"),
                    })?;
                }
                capped
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    store_id = %request.store_id,
                    object_type = %request.object_type,
                    relation = %request.relation,
                    strategy = strategy.as_str(),
                    error = %e,
                    "ListObjects failed"
                );
                return Err(e);
            }
            Err(_) => true,
        };

        tracing::info!(
            store_id = %request.store_id,
            object_type = %request.object_type,
            relation = %request.relation,
            strategy = strategy.as_str(),
            count = delivered,
            truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ListObjects completed"
        );

        Ok(ListObjectsSummary {
            count: delivered,
            truncated,
            strategy: Some(strategy),
        })
    }

    /// Validates the request and binds it to a model.
    async fn prepare(&self, request: &ListObjectsRequest) -> DomainResult<(CheckScope<T>, Plan)> {
        if request.object_type.is_empty() || request.object_type.contains([':', '#']) {
            return Err(DomainError::InvalidObjectFormat {
                value: request.object_type.clone(),
            });
        }
        if request.relation.is_empty() || request.relation.contains([':', '#']) {
            return Err(DomainError::InvalidRelationFormat {
                value: request.relation.clone(),
            });
        }
        if request.user.contains('*') {
            return Err(DomainError::InvalidUserFormat {
                value: format!("{}: wildcards are not allowed", request.user),
            });
        }
        let user = UserRef::parse(&request.user).map_err(|e| DomainError::InvalidUserFormat {
            value: format!("{}: {}", request.user, e),
        })?;

        if !self.tuple_reader.store_exists(&request.store_id).await? {
            return Err(DomainError::StoreNotFound {
                store_id: request.store_id.clone(),
            });
        }
        let type_system = self
            .model_reader
            .get_type_system(&request.store_id, request.authorization_model_id.as_deref())
            .await?;

        type_system.get_relation(&request.object_type, &request.relation)?;
        type_system.get_type(user.user_type())?;
        if let UserRef::Userset { object, relation } = &user {
            type_system.get_relation(&object.object_type, relation)?;
        }

        for contextual in &request.contextual_tuples {
            let tuple = contextual.to_tuple();
            type_system
                .validate_tuple(&tuple)
                .map_err(|e| DomainError::InvalidContextualTuple {
                    tuple: tuple.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let strategy = if type_system.requires_check(&request.object_type, &request.relation)? {
            ListObjectsStrategy::ConcurrentChecks
        } else {
            ListObjectsStrategy::ReverseExpand
        };
        tracing::debug!(
            object_type = %request.object_type,
            relation = %request.relation,
            model_id = type_system.model_id(),
            strategy = strategy.as_str(),
            "ListObjects plan"
        );

        let scope = CheckScope {
            reader: ContextualOverlay::new(
                Arc::clone(&self.tuple_reader),
                &request.contextual_tuples,
            )?,
            type_system,
            store_id: request.store_id.clone(),
            user: request.user.clone(),
        };
        let plan = Plan {
            object_type: request.object_type.clone(),
            relation: request.relation.clone(),
            user,
            strategy,
            options: self.options.clone(),
        };
        Ok((scope, plan))
    }
}

/// Runs the planned resolver, reporting a failure through `tx`.
async fn produce<T, M>(
    resolver: Arc<GraphResolver<T, M>>,
    scope: CheckScope<T>,
    plan: Plan,
    tx: ObjectSender,
    token: CancellationToken,
) where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    let result = match plan.strategy {
        ListObjectsStrategy::ReverseExpand => {
            let expansion = ReverseExpansion::new(
                scope.reader.clone(),
                scope.store_id.clone(),
                &scope.type_system,
                plan.object_type.clone(),
                plan.relation.clone(),
                ExpansionMode::Strict,
                plan.options.max_concurrent_reads,
            );
            expansion.run(&plan.user, &tx, &token).await
        }
        ListObjectsStrategy::ConcurrentChecks => {
            concurrent_checks::run(&resolver, &scope, &plan, &tx, &token).await
        }
    };

    if let Err(e) = result {
        let _ = tx.send(Err(e)).await;
    }
}
