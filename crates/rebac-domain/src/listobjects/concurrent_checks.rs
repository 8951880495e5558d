//! Candidate verification with a bounded pool of Checks.
//!
//! Used for relations whose rewrite reaches an intersection or exclusion,
//! where reachability alone does not prove access. Candidates come from a
//! relaxed reverse expansion or, when narrowing is disabled, from every
//! object of the requested type.

use std::collections::HashSet;
use std::pin::pin;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{DomainError, DomainResult};
use crate::resolver::{CheckScope, GraphResolver, ModelReader, TupleReader};

use super::cancel::CancellationToken;
use super::reverse_expand::{ExpansionMode, ReverseExpansion};
use super::{ObjectSender, Plan};

/// Relaxed expansion runs ahead of verification by at most this many
/// candidates.
const CANDIDATE_BUFFER: usize = 100;

/// Emits every candidate of `plan` that passes Check.
pub(crate) async fn run<T, M>(
    resolver: &GraphResolver<T, M>,
    scope: &CheckScope<T>,
    plan: &Plan,
    tx: &ObjectSender,
    token: &CancellationToken,
) -> DomainResult<()>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    if !plan.options.hybrid_candidates {
        let ids = scope
            .reader
            .list_objects_by_type(&scope.store_id, &plan.object_type, usize::MAX)
            .await?;
        tracing::debug!(candidates = ids.len(), "verifying full type extent");
        let candidates = stream::iter(
            ids.into_iter()
                .map(|id| Ok(format!("{}:{}", plan.object_type, id))),
        );
        return verify(resolver, scope, plan, candidates, tx, token).await;
    }

    let expansion = ReverseExpansion::new(
        scope.reader.clone(),
        scope.store_id.clone(),
        &scope.type_system,
        plan.object_type.clone(),
        plan.relation.clone(),
        ExpansionMode::Relaxed,
        plan.options.max_concurrent_reads,
    );
    let (candidate_tx, candidate_rx) = mpsc::channel(CANDIDATE_BUFFER);

    let produce = async {
        let candidate_tx = candidate_tx;
        if let Err(e) = expansion.run(&plan.user, &candidate_tx, token).await {
            let _ = candidate_tx.send(Err(e)).await;
        }
    };
    let candidates = stream::unfold(candidate_rx, |mut rx| async move {
        rx.recv().await.map(|candidate| (candidate, rx))
    });
    let verification = verify(resolver, scope, plan, candidates, tx, token);

    // Verification finishing first drops the receiver, which stops the
    // expansion at its next send.
    let ((), verified) = future::join(produce, verification).await;
    verified
}

/// Checks candidates concurrently, forwarding the allowed ones.
///
/// Duplicates are checked once. Once `token` fires no further Check is
/// started.
async fn verify<T, M, S>(
    resolver: &GraphResolver<T, M>,
    scope: &CheckScope<T>,
    plan: &Plan,
    candidates: S,
    tx: &ObjectSender,
    token: &CancellationToken,
) -> DomainResult<()>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
    S: Stream<Item = DomainResult<String>>,
{
    let mut seen = HashSet::new();
    let relation = plan.relation.as_str();

    let mut checks = pin!(candidates
        .take_until(token.clone().cancelled())
        .filter(move |candidate| {
            future::ready(match candidate {
                Ok(object) => seen.insert(object.clone()),
                Err(_) => true,
            })
        })
        .map(|candidate| async move {
            let object = candidate?;
            match resolver.check_in_scope(scope, &object, relation).await {
                Ok(result) => Ok(result.allowed.then_some(object)),
                // A path that loops or runs too deep grants nothing.
                Err(e)
                    if matches!(
                        e,
                        DomainError::CycleDetected { .. } | DomainError::DepthLimitExceeded { .. }
                    ) =>
                {
                    tracing::debug!(object = %object, error = %e, "candidate check terminated");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .buffer_unordered(plan.options.max_concurrent_checks.max(1)));

    while let Some(checked) = checks.next().await {
        if let Some(object) = checked? {
            if tx.send(Ok(object)).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}
