//! Reverse expansion: breadth-first search from the user back to the
//! objects holding the target relation.
//!
//! # Edges
//!
//! The relation's dependency closure is compiled into an [`EdgeIndex`] up
//! front. Expansion then walks three kinds of edges backwards:
//!
//! - **Direct**: a subject matching a relation's type constraint
//!   (`user`, `user:*`, `group#member`) leads to every object whose tuple
//!   names that subject.
//! - **Computed userset**: `O#r'` rewriting to `O#r` makes a proven `O#r`
//!   prove `O#r'`. No I/O.
//! - **Tuple to userset**: a proven parent `P#cu` proves `C#rel` for every
//!   child `C` whose tupleset tuple points at `P`.
//!
//! In [`ExpansionMode::Relaxed`] an intersection contributes its first child
//! and an exclusion its base, so the result is a superset of the truth that
//! must be verified with Check.

use std::collections::{HashMap, HashSet};
use std::pin::pin;

use futures::stream::{self, StreamExt};

use crate::error::DomainResult;
use crate::model::{RelationDefinition, TypeSystem, UserRef, Userset};
use crate::resolver::{ContextualOverlay, TupleReader};

use super::cancel::CancellationToken;
use super::ObjectSender;

/// How set operations contribute edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpansionMode {
    /// Intersections and exclusions contribute nothing; every emitted object
    /// is proven.
    Strict,
    /// Intersections contribute their first child and exclusions their base.
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TupleToUsersetEdge {
    child_type: String,
    tupleset: String,
    relation: String,
}

/// Backward edges of a relation's dependency closure.
#[derive(Debug, Default)]
pub(crate) struct EdgeIndex {
    /// Constraint key (`user`, `user:*`, `group#member`) to the
    /// `(object type, relation)` pairs assignable from it.
    direct: HashMap<String, Vec<(String, String)>>,
    /// `(object type, relation)` pairs that accept any user.
    unconstrained: Vec<(String, String)>,
    /// `(type, relation)` to the relations on the same type that rewrite to it.
    computed: HashMap<(String, String), Vec<String>>,
    /// `(parent type, computed userset)` to the child relations reading it.
    tuple_to_userset: HashMap<(String, String), Vec<TupleToUsersetEdge>>,
}

impl EdgeIndex {
    /// Compiles the edges reachable from `object_type#relation`.
    pub(crate) fn build(
        type_system: &TypeSystem,
        object_type: &str,
        relation: &str,
        mode: ExpansionMode,
    ) -> Self {
        let mut index = Self::default();
        let mut visited = HashSet::new();
        let mut stack = vec![(object_type.to_string(), relation.to_string())];

        while let Some((current_type, current_relation)) = stack.pop() {
            if !visited.insert((current_type.clone(), current_relation.clone())) {
                continue;
            }
            let Ok(relation_def) = type_system.get_relation(&current_type, &current_relation)
            else {
                continue;
            };
            let node = RewriteNode {
                type_system,
                object_type: &current_type,
                relation: &relation_def,
                mode,
            };
            node.add_edges(&relation_def.rewrite, &mut index, &mut stack);
        }

        index
    }

    fn push_direct(&mut self, key: &str, target: (String, String)) {
        let targets = self.direct.entry(key.to_string()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    fn push_computed(&mut self, source: (String, String), relation: &str) {
        let relations = self.computed.entry(source).or_default();
        if !relations.iter().any(|r| r == relation) {
            relations.push(relation.to_string());
        }
    }

    fn push_tuple_to_userset(&mut self, parent: (String, String), edge: TupleToUsersetEdge) {
        let edges = self.tuple_to_userset.entry(parent).or_default();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    fn direct_targets<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a (String, String)> {
        self.direct
            .get(key)
            .into_iter()
            .flatten()
            .chain(self.unconstrained.iter())
    }

    /// Returns true if no edge leads anywhere.
    pub(crate) fn is_empty(&self) -> bool {
        self.direct.is_empty()
            && self.unconstrained.is_empty()
            && self.computed.is_empty()
            && self.tuple_to_userset.is_empty()
    }
}

/// One relation definition being compiled into edges.
struct RewriteNode<'a> {
    type_system: &'a TypeSystem,
    object_type: &'a str,
    relation: &'a RelationDefinition,
    mode: ExpansionMode,
}

impl RewriteNode<'_> {
    fn add_edges(
        &self,
        userset: &Userset,
        index: &mut EdgeIndex,
        stack: &mut Vec<(String, String)>,
    ) {
        let target = || (self.object_type.to_string(), self.relation.name.clone());

        match userset {
            Userset::This if self.relation.type_constraints.is_empty() => {
                let target = target();
                if !index.unconstrained.contains(&target) {
                    index.unconstrained.push(target);
                }
                stack.extend(self.type_system.relations());
            }
            Userset::This => {
                for constraint in &self.relation.type_constraints {
                    index.push_direct(&constraint.type_name, target());
                    if let (user_type, Some(user_relation)) = constraint.parts() {
                        stack.push((user_type.to_string(), user_relation.to_string()));
                    }
                }
            }
            Userset::ComputedUserset { relation } => {
                index.push_computed(
                    (self.object_type.to_string(), relation.clone()),
                    &self.relation.name,
                );
                stack.push((self.object_type.to_string(), relation.clone()));
            }
            Userset::TupleToUserset {
                tupleset,
                computed_userset,
            } => {
                let parents = self
                    .type_system
                    .tupleset_parent_types(self.object_type, tupleset)
                    .unwrap_or_default();
                for parent in parents {
                    if !self.type_system.has_relation(&parent, computed_userset) {
                        continue;
                    }
                    index.push_tuple_to_userset(
                        (parent.clone(), computed_userset.clone()),
                        TupleToUsersetEdge {
                            child_type: self.object_type.to_string(),
                            tupleset: tupleset.clone(),
                            relation: self.relation.name.clone(),
                        },
                    );
                    stack.push((parent, computed_userset.clone()));
                }
            }
            Userset::Union { children } => {
                for child in children {
                    self.add_edges(child, index, stack);
                }
            }
            Userset::Intersection { children } => {
                if self.mode == ExpansionMode::Relaxed {
                    if let Some(first) = children.first() {
                        self.add_edges(first, index, stack);
                    }
                }
            }
            Userset::Exclusion { base, .. } => {
                if self.mode == ExpansionMode::Relaxed {
                    self.add_edges(base, index, stack);
                }
            }
        }
    }
}

/// A proven fact about the requesting user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    /// The user itself, or the wildcard of its type.
    Subject { user: String, constraint: String },
    /// The user holds `relation` on `object_type:object_id`.
    Userset {
        object_type: String,
        object_id: String,
        relation: String,
    },
}

impl Node {
    fn userset(object_type: &str, object_id: String, relation: &str) -> Self {
        Node::Userset {
            object_type: object_type.to_string(),
            object_id,
            relation: relation.to_string(),
        }
    }

    fn key(&self) -> String {
        match self {
            Node::Subject { user, .. } => user.clone(),
            Node::Userset {
                object_type,
                object_id,
                relation,
            } => format!("{object_type}:{object_id}#{relation}"),
        }
    }

    /// Nodes the search starts from. Wildcard users are rejected before
    /// expansion, but a wildcard still seeds only itself.
    fn start(user: &UserRef) -> Vec<Node> {
        match user {
            UserRef::Object(object) => vec![
                Node::Subject {
                    user: object.to_string(),
                    constraint: object.object_type.clone(),
                },
                Node::Subject {
                    user: format!("{}:*", object.object_type),
                    constraint: format!("{}:*", object.object_type),
                },
            ],
            UserRef::Wildcard { user_type } => vec![Node::Subject {
                user: format!("{user_type}:*"),
                constraint: format!("{user_type}:*"),
            }],
            UserRef::Userset { object, relation } => vec![Node::userset(
                &object.object_type,
                object.object_id.clone(),
                relation,
            )],
        }
    }
}

/// Reverse expansion of one request.
pub(crate) struct ReverseExpansion<T: ?Sized> {
    reader: ContextualOverlay<T>,
    store_id: String,
    object_type: String,
    relation: String,
    edges: EdgeIndex,
    max_concurrent_reads: usize,
}

impl<T> ReverseExpansion<T>
where
    T: TupleReader + ?Sized + 'static,
{
    pub(crate) fn new(
        reader: ContextualOverlay<T>,
        store_id: impl Into<String>,
        type_system: &TypeSystem,
        object_type: impl Into<String>,
        relation: impl Into<String>,
        mode: ExpansionMode,
        max_concurrent_reads: usize,
    ) -> Self {
        let object_type = object_type.into();
        let relation = relation.into();
        let edges = EdgeIndex::build(type_system, &object_type, &relation, mode);
        Self {
            reader,
            store_id: store_id.into(),
            object_type,
            relation,
            edges,
            max_concurrent_reads: max_concurrent_reads.max(1),
        }
    }

    /// Streams every object proven for `user` into `tx`.
    ///
    /// Each level of the search expands its nodes concurrently. Stops early,
    /// without error, once `token` fires or the receiver is gone.
    pub(crate) async fn run(
        &self,
        user: &UserRef,
        tx: &ObjectSender,
        token: &CancellationToken,
    ) -> DomainResult<()> {
        if self.edges.is_empty() {
            return Ok(());
        }

        let mut frontier = Node::start(user);
        let mut visited: HashSet<String> = frontier.iter().map(Node::key).collect();
        let mut level = 0usize;

        while !frontier.is_empty() {
            if token.is_cancelled() {
                return Ok(());
            }
            tracing::trace!(level, nodes = frontier.len(), "expanding level");

            let mut expansions = pin!(stream::iter(frontier)
                .take_until(token.clone().cancelled())
                .map(|node| async move { self.expand(&node).await })
                .buffer_unordered(self.max_concurrent_reads));

            let mut next = Vec::new();
            while let Some(expanded) = expansions.next().await {
                for node in expanded? {
                    if !visited.insert(node.key()) {
                        continue;
                    }
                    if let Some(object) = self.target_object(&node) {
                        if tx.send(Ok(object)).await.is_err() {
                            return Ok(());
                        }
                    }
                    next.push(node);
                }
            }

            frontier = next;
            level += 1;
        }

        Ok(())
    }

    fn target_object(&self, node: &Node) -> Option<String> {
        match node {
            Node::Userset {
                object_type,
                object_id,
                relation,
            } if *object_type == self.object_type && *relation == self.relation => {
                Some(format!("{object_type}:{object_id}"))
            }
            _ => None,
        }
    }

    /// Returns the nodes one edge away from `node`.
    async fn expand(&self, node: &Node) -> DomainResult<Vec<Node>> {
        let mut out = Vec::new();

        match node {
            Node::Subject { user, constraint } => {
                self.expand_direct(constraint, user, &mut out).await?;
            }
            Node::Userset {
                object_type,
                object_id,
                relation,
            } => {
                let source = (object_type.clone(), relation.clone());

                if let Some(relations) = self.edges.computed.get(&source) {
                    for computed in relations {
                        out.push(Node::userset(object_type, object_id.clone(), computed));
                    }
                }

                if let Some(edges) = self.edges.tuple_to_userset.get(&source) {
                    let parent = format!("{object_type}:{object_id}");
                    for edge in edges {
                        let children = self
                            .reader
                            .read_starting_with_user(
                                &self.store_id,
                                &edge.child_type,
                                &edge.tupleset,
                                &parent,
                            )
                            .await?;
                        out.extend(
                            children
                                .into_iter()
                                .map(|id| Node::userset(&edge.child_type, id, &edge.relation)),
                        );
                    }
                }

                let constraint = format!("{object_type}#{relation}");
                let subject = format!("{object_type}:{object_id}#{relation}");
                self.expand_direct(&constraint, &subject, &mut out).await?;
            }
        }

        Ok(out)
    }

    /// Follows direct edges for a subject satisfying `constraint`.
    async fn expand_direct(
        &self,
        constraint: &str,
        subject: &str,
        out: &mut Vec<Node>,
    ) -> DomainResult<()> {
        for (object_type, relation) in self.edges.direct_targets(constraint) {
            let ids = self
                .reader
                .read_starting_with_user(&self.store_id, object_type, relation, subject)
                .await?;
            out.extend(
                ids.into_iter()
                    .map(|id| Node::userset(object_type, id, relation)),
            );
        }
        Ok(())
    }
}
