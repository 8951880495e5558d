//! Graph resolver for permission checks.
//!
//! The resolver performs async graph traversal to determine
//! if a user has a specific permission on an object.
//!
//! # Architecture Decisions
//!
//! - **Parallel Execution**: Union and intersection operations use
//!   `FuturesUnordered` for parallel branch evaluation with short-circuiting.
//!
//! - **Cycle Detection**: Tracks visited nodes to prevent infinite loops.
//!   Uses `Arc<HashSet>` for efficient cloning during traversal.
//!
//! - **Depth Limiting**: Default max depth of 25.
//!
//! - **Timeout Handling**: Configurable timeout (default 30s) bounds a single
//!   check on pathological graphs.
//!
//! - **Contextual Tuples**: Every tuple read goes through a
//!   [`ContextualOverlay`], so request-scoped tuples participate in direct,
//!   userset and tuple-to-userset resolution alike.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;

use crate::error::{DomainError, DomainResult};
use crate::model::{TypeConstraint, TypeSystem, Userset};

use super::config::ResolverConfig;
use super::context::TraversalContext;
use super::overlay::ContextualOverlay;
use super::traits::{ModelReader, TupleReader};
use super::types::{CheckRequest, CheckResult};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a check needs once the request has been validated: the
/// overlaid tuple reader, the bound type system and the subject.
pub(crate) struct CheckScope<T: ?Sized> {
    pub(crate) reader: ContextualOverlay<T>,
    pub(crate) type_system: Arc<TypeSystem>,
    pub(crate) store_id: String,
    pub(crate) user: String,
}

/// Graph resolver for authorization checks.
pub struct GraphResolver<T, M> {
    tuple_reader: Arc<T>,
    model_reader: Arc<M>,
    config: ResolverConfig,
}

impl<T, M> GraphResolver<T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    /// Creates a new graph resolver.
    pub fn new(tuple_reader: Arc<T>, model_reader: Arc<M>) -> Self {
        Self::with_config(tuple_reader, model_reader, ResolverConfig::default())
    }

    /// Creates a new graph resolver with custom configuration.
    pub fn with_config(tuple_reader: Arc<T>, model_reader: Arc<M>, config: ResolverConfig) -> Self {
        Self {
            tuple_reader,
            model_reader,
            config,
        }
    }

    /// Returns the resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Performs a permission check.
    ///
    /// The authorization model is resolved from `authorization_model_id`,
    /// or the latest model of the store when it is unset.
    pub async fn check(&self, request: &CheckRequest) -> DomainResult<CheckResult> {
        self.validate_request(request)?;

        if !self.tuple_reader.store_exists(&request.store_id).await? {
            return Err(DomainError::StoreNotFound {
                store_id: request.store_id.clone(),
            });
        }

        let type_system = self
            .model_reader
            .get_type_system(&request.store_id, request.authorization_model_id.as_deref())
            .await?;

        let scope = CheckScope {
            reader: ContextualOverlay::new(
                Arc::clone(&self.tuple_reader),
                &request.contextual_tuples,
            )?,
            type_system,
            store_id: request.store_id.clone(),
            user: request.user.clone(),
        };

        self.check_in_scope(&scope, &request.object, &request.relation)
            .await
    }

    /// Checks `object#relation` for the scope's user, bounded by the
    /// configured timeout. The scope is trusted to be valid.
    pub(crate) async fn check_in_scope(
        &self,
        scope: &CheckScope<T>,
        object: &str,
        relation: &str,
    ) -> DomainResult<CheckResult> {
        let evaluation = Evaluation {
            scope,
            config: &self.config,
        };
        let check_future = evaluation.resolve_check(
            object.to_string(),
            relation.to_string(),
            TraversalContext::new(),
        );

        match timeout(self.config.timeout, check_future).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout {
                duration_ms: self.config.timeout.as_millis() as u64,
            }),
        }
    }

    /// Validates the check request.
    fn validate_request(&self, request: &CheckRequest) -> DomainResult<()> {
        // Validate user format: must be in type:id format (or wildcard "*")
        if request.user.is_empty() {
            return Err(DomainError::InvalidUserFormat {
                value: request.user.clone(),
            });
        }
        if request.user != "*" && !is_valid_type_id(&request.user) {
            return Err(DomainError::InvalidUserFormat {
                value: request.user.clone(),
            });
        }

        // Validate object format: must be in type:id format
        if request.object.is_empty() || !is_valid_type_id(&request.object) {
            return Err(DomainError::InvalidObjectFormat {
                value: request.object.clone(),
            });
        }

        if request.relation.is_empty() {
            return Err(DomainError::InvalidRelationFormat {
                value: request.relation.clone(),
            });
        }

        Ok(())
    }
}

/// One check's traversal state shared by every recursive step.
struct Evaluation<'a, T: ?Sized> {
    scope: &'a CheckScope<T>,
    config: &'a ResolverConfig,
}

impl<T: ?Sized> Clone for Evaluation<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Evaluation<'_, T> {}

impl<'a, T> Evaluation<'a, T>
where
    T: TupleReader + ?Sized + 'static,
{
    /// Internal check resolution with traversal context (boxed for recursion).
    fn resolve_check(
        self,
        object: String,
        relation: String,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<CheckResult>> {
        Box::pin(async move {
            if ctx.depth >= self.config.max_depth {
                return Err(DomainError::DepthLimitExceeded {
                    max_depth: self.config.max_depth,
                });
            }

            let cycle_key = format!("{}#{}", object, relation);
            if ctx.visited.contains(&cycle_key) {
                return Err(DomainError::CycleDetected { path: cycle_key });
            }

            let (object_type, object_id) = parse_object(&object)?;
            let object_type = object_type.to_string();
            let object_id = object_id.to_string();

            let relation_def = self
                .scope
                .type_system
                .get_relation(&object_type, &relation)?;

            let ctx = ctx.with_visited(&cycle_key);
            let node = Node {
                object,
                object_type,
                object_id,
                relation,
                type_constraints: Arc::new(relation_def.type_constraints.clone()),
            };

            self.resolve_userset(node, relation_def.rewrite.clone(), ctx)
                .await
        })
    }

    /// Resolves a userset rewrite (boxed for recursion).
    fn resolve_userset(
        self,
        node: Node,
        userset: Userset,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<CheckResult>> {
        Box::pin(async move {
            match userset {
                Userset::This => self.resolve_direct(node, ctx).await,

                Userset::ComputedUserset { relation } => {
                    self.resolve_check(node.object, relation, ctx.increment_depth())
                        .await
                }

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    self.resolve_tuple_to_userset(node, &tupleset, &computed_userset, ctx)
                        .await
                }

                Userset::Union { children } => self.resolve_union(node, children, ctx).await,

                Userset::Intersection { children } => {
                    self.resolve_intersection(node, children, ctx).await
                }

                Userset::Exclusion { base, subtract } => {
                    self.resolve_exclusion(node, *base, *subtract, ctx).await
                }
            }
        })
    }

    /// Resolves a direct tuple assignment.
    ///
    /// Tuples whose user type is not allowed by the relation's type
    /// constraints are ignored.
    async fn resolve_direct(self, node: Node, ctx: TraversalContext) -> DomainResult<CheckResult> {
        let tuples = self
            .scope
            .reader
            .read_tuples(
                &self.scope.store_id,
                &node.object_type,
                &node.object_id,
                &node.relation,
            )
            .await?;

        for tuple in tuples {
            // Skip if type_constraints is empty (relation allows any type)
            if !node.type_constraints.is_empty()
                && !type_matches_constraints(&tuple.type_ref(), &node.type_constraints)
            {
                continue;
            }

            if user_matches(&self.scope.user, &tuple.user()) {
                return Ok(CheckResult { allowed: true });
            }

            // Userset reference (e.g., group:eng#member)
            if let Some(userset_relation) = tuple.user_relation {
                let userset_object = format!("{}:{}", tuple.user_type, tuple.user_id);
                let result = self
                    .resolve_check(userset_object, userset_relation, ctx.increment_depth())
                    .await?;
                if result.allowed {
                    return Ok(CheckResult { allowed: true });
                }
            }
        }

        Ok(CheckResult { allowed: false })
    }

    /// Resolves a tuple-to-userset relation (e.g., viewer from parent).
    async fn resolve_tuple_to_userset(
        self,
        node: Node,
        tupleset: &str,
        computed_userset: &str,
        ctx: TraversalContext,
    ) -> DomainResult<CheckResult> {
        let tuples = self
            .scope
            .reader
            .read_tuples(
                &self.scope.store_id,
                &node.object_type,
                &node.object_id,
                tupleset,
            )
            .await?;

        for tuple in tuples {
            // The parent object is the user of the tupleset tuple
            let parent_object = format!("{}:{}", tuple.user_type, tuple.user_id);
            if !self
                .scope
                .type_system
                .has_relation(&tuple.user_type, computed_userset)
            {
                continue;
            }

            let result = self
                .resolve_check(
                    parent_object,
                    computed_userset.to_string(),
                    ctx.increment_depth(),
                )
                .await?;
            if result.allowed {
                return Ok(CheckResult { allowed: true });
            }
        }

        Ok(CheckResult { allowed: false })
    }

    /// Resolves a union of usersets (any child must be true).
    ///
    /// Uses `FuturesUnordered` for parallel branch evaluation with
    /// short-circuiting on first success.
    async fn resolve_union(
        self,
        node: Node,
        children: Vec<Userset>,
        ctx: TraversalContext,
    ) -> DomainResult<CheckResult> {
        let new_ctx = ctx.increment_depth();

        let mut futures: FuturesUnordered<_> = children
            .into_iter()
            .map(|child| self.resolve_userset(node.clone(), child, new_ctx.clone()))
            .collect();

        // Path-termination errors (CycleDetected, DepthLimitExceeded) mean "this branch
        // couldn't find access" and count as false. They only propagate if every
        // branch terminated that way.
        let mut fatal_error: Option<DomainError> = None;
        let mut path_termination_error: Option<DomainError> = None;
        let mut had_false_result = false;

        while let Some(result) = futures.next().await {
            match result {
                Ok(CheckResult { allowed: true }) => {
                    return Ok(CheckResult { allowed: true });
                }
                Ok(CheckResult { allowed: false }) => {
                    had_false_result = true;
                }
                Err(e) => {
                    if matches!(
                        e,
                        DomainError::CycleDetected { .. } | DomainError::DepthLimitExceeded { .. }
                    ) {
                        path_termination_error = Some(e);
                    } else {
                        fatal_error = Some(e);
                    }
                }
            }
        }

        // Storage errors and the like always propagate
        if let Some(e) = fatal_error {
            return Err(e);
        }

        if !had_false_result {
            if let Some(e) = path_termination_error {
                return Err(e);
            }
        }

        Ok(CheckResult { allowed: false })
    }

    /// Resolves an intersection of usersets (all children must be true).
    ///
    /// Uses `FuturesUnordered` for parallel branch evaluation with
    /// short-circuiting on first failure.
    async fn resolve_intersection(
        self,
        node: Node,
        children: Vec<Userset>,
        ctx: TraversalContext,
    ) -> DomainResult<CheckResult> {
        let new_ctx = ctx.increment_depth();

        let mut futures: FuturesUnordered<_> = children
            .into_iter()
            .map(|child| self.resolve_userset(node.clone(), child, new_ctx.clone()))
            .collect();

        while let Some(result) = futures.next().await {
            match result {
                Ok(CheckResult { allowed: true }) => {}
                Ok(CheckResult { allowed: false }) => {
                    return Ok(CheckResult { allowed: false });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(CheckResult { allowed: true })
    }

    /// Resolves an exclusion (base must be true AND subtract must be false).
    ///
    /// - If base is false → false, without needing subtract
    /// - If subtract is true → false, without needing base
    /// - Errors only propagate when the errored branch's result is needed
    async fn resolve_exclusion(
        self,
        node: Node,
        base: Userset,
        subtract: Userset,
        ctx: TraversalContext,
    ) -> DomainResult<CheckResult> {
        let new_ctx = ctx.increment_depth();

        let (base_result, subtract_result) = futures::future::join(
            self.resolve_userset(node.clone(), base, new_ctx.clone()),
            self.resolve_userset(node, subtract, new_ctx),
        )
        .await;

        match (base_result, subtract_result) {
            (Ok(base), Ok(subtract)) => Ok(CheckResult {
                allowed: base.allowed && !subtract.allowed,
            }),

            (Ok(CheckResult { allowed: false }), _) => Ok(CheckResult { allowed: false }),

            (_, Ok(CheckResult { allowed: true })) => Ok(CheckResult { allowed: false }),

            (Ok(CheckResult { allowed: true }), Err(e)) => Err(e),

            (Err(e), Ok(CheckResult { allowed: false })) => Err(e),

            // Prefer cycle errors as they're more specific
            (Err(base_err), Err(subtract_err)) => {
                if matches!(base_err, DomainError::CycleDetected { .. }) {
                    Err(base_err)
                } else if matches!(subtract_err, DomainError::CycleDetected { .. }) {
                    Err(subtract_err)
                } else {
                    Err(base_err)
                }
            }
        }
    }
}

/// The object and relation being evaluated by one rewrite step.
#[derive(Debug, Clone)]
struct Node {
    object: String,
    object_type: String,
    object_id: String,
    relation: String,
    type_constraints: Arc<Vec<TypeConstraint>>,
}

/// Checks if a requesting user matches a tuple user.
///
/// Wildcards are only honored on the tuple side. A request for `user:*`
/// never matches anything.
pub(crate) fn user_matches(requesting_user: &str, tuple_user: &str) -> bool {
    if requesting_user.ends_with(":*") {
        return false;
    }

    if requesting_user == tuple_user {
        return true;
    }

    // user:* in a tuple grants every plain user of that type
    if let Some(tuple_type) = tuple_user.strip_suffix(":*") {
        if requesting_user.contains('#') {
            return false;
        }
        if let Some((user_type, _)) = requesting_user.split_once(':') {
            return tuple_type == user_type;
        }
    }

    false
}

/// Checks if a tuple type reference (`user`, `user:*` or `group#member`)
/// is allowed by any of the type constraints.
pub(crate) fn type_matches_constraints(type_ref: &str, type_constraints: &[TypeConstraint]) -> bool {
    type_constraints.iter().any(|c| c.type_name == type_ref)
}

/// Checks if a string is in valid `type:id` format.
#[inline]
fn is_valid_type_id(value: &str) -> bool {
    match value.split_once(':') {
        Some((type_part, id_part)) => !type_part.is_empty() && !id_part.is_empty(),
        None => false,
    }
}

/// Parses an object string into type and id.
fn parse_object(object: &str) -> DomainResult<(&str, &str)> {
    match object.split_once(':') {
        Some((type_part, id_part)) if !type_part.is_empty() && !id_part.is_empty() => {
            Ok((type_part, id_part))
        }
        _ => Err(DomainError::InvalidObjectFormat {
            value: object.to_string(),
        }),
    }
}
