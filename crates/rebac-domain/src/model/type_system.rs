//! Type system for authorization model lookups with caching.
//!
//! The `TypeSystem` provides efficient lookups for types and relations
//! with internal caching using `DashMap` for thread-safe concurrent access.
//! It also answers structural questions about relations that ListObjects
//! uses to pick a resolution strategy.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{DomainError, DomainResult};

use super::types::{
    AuthorizationModel, Object, RelationDefinition, Tuple, TypeConstraint, TypeDefinition,
    UserRef, Userset,
};

/// Type system providing cached access to authorization model types and relations.
///
/// # Thread Safety
///
/// The `TypeSystem` is thread-safe and can be shared across async tasks.
/// It uses `DashMap` internally for lock-free concurrent reads and minimal
/// contention on writes.
///
/// # Example
///
/// ```ignore
/// use rebac_domain::model::{AuthorizationModel, TypeSystem};
///
/// let type_system = TypeSystem::new(model);
///
/// let viewer = type_system.get_relation("document", "viewer")?;
/// let needs_check = type_system.requires_check("document", "viewer")?;
/// ```
#[derive(Debug)]
pub struct TypeSystem {
    /// The underlying authorization model.
    model: Arc<AuthorizationModel>,
    /// Cache for type definitions, keyed by type name.
    type_cache: DashMap<String, Arc<TypeDefinition>>,
    /// Cache for relation definitions, keyed by "type_name:relation_name".
    relation_cache: DashMap<String, Arc<RelationDefinition>>,
}

impl TypeSystem {
    /// Creates a new `TypeSystem` from an authorization model.
    ///
    /// The type system will lazily cache lookups as they are accessed.
    pub fn new(model: AuthorizationModel) -> Self {
        Self {
            model: Arc::new(model),
            type_cache: DashMap::new(),
            relation_cache: DashMap::new(),
        }
    }

    /// Returns a reference to the underlying authorization model.
    pub fn model(&self) -> &AuthorizationModel {
        &self.model
    }

    /// Returns the identifier of the underlying model.
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    /// Gets a type definition by name, using the cache if available.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TypeNotFound` if the type does not exist in the model.
    pub fn get_type(&self, type_name: &str) -> DomainResult<Arc<TypeDefinition>> {
        if let Some(cached) = self.type_cache.get(type_name) {
            return Ok(Arc::clone(cached.value()));
        }

        let type_def = self
            .model
            .type_definitions
            .iter()
            .find(|td| td.type_name == type_name)
            .ok_or_else(|| DomainError::TypeNotFound {
                type_name: type_name.to_string(),
            })?;

        let type_def_arc = Arc::new(type_def.clone());
        self.type_cache
            .insert(type_name.to_string(), Arc::clone(&type_def_arc));
        Ok(type_def_arc)
    }

    /// Gets a relation definition for a specific type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TypeNotFound` if the type does not exist.
    /// Returns `DomainError::RelationNotFound` if the relation does not exist on the type.
    pub fn get_relation(
        &self,
        type_name: &str,
        relation: &str,
    ) -> DomainResult<Arc<RelationDefinition>> {
        let cache_key = format!("{}:{}", type_name, relation);

        if let Some(cached) = self.relation_cache.get(&cache_key) {
            return Ok(Arc::clone(cached.value()));
        }

        let type_def = self.get_type(type_name)?;

        let relation_def = type_def
            .relations
            .iter()
            .find(|r| r.name == relation)
            .ok_or_else(|| DomainError::RelationNotFound {
                type_name: type_name.to_string(),
                relation: relation.to_string(),
            })?;

        let relation_def_arc = Arc::new(relation_def.clone());
        self.relation_cache
            .insert(cache_key, Arc::clone(&relation_def_arc));
        Ok(relation_def_arc)
    }

    /// Checks if a type exists in the model.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.get_type(type_name).is_ok()
    }

    /// Checks if a relation exists on a type.
    pub fn has_relation(&self, type_name: &str, relation: &str) -> bool {
        self.get_relation(type_name, relation).is_ok()
    }

    /// Returns the user types that may be directly assigned to a relation.
    pub fn directly_related_types(
        &self,
        type_name: &str,
        relation: &str,
    ) -> DomainResult<Vec<TypeConstraint>> {
        Ok(self
            .get_relation(type_name, relation)?
            .type_constraints
            .clone())
    }

    /// Returns the object types a tupleset relation may point at.
    ///
    /// Only plain type constraints count; wildcards and usersets cannot be
    /// the parent side of a tuple-to-userset. An unconstrained tupleset may
    /// point at any type.
    pub fn tupleset_parent_types(
        &self,
        type_name: &str,
        tupleset: &str,
    ) -> DomainResult<Vec<String>> {
        let constraints = self.directly_related_types(type_name, tupleset)?;
        if constraints.is_empty() {
            return Ok(self
                .model
                .type_definitions
                .iter()
                .map(|t| t.type_name.clone())
                .collect());
        }
        Ok(constraints
            .iter()
            .filter(|c| !c.is_wildcard())
            .filter_map(|c| match c.parts() {
                (parent, None) => Some(parent.to_string()),
                _ => None,
            })
            .collect())
    }

    /// Returns true if resolving `type_name#relation` may reach an
    /// intersection or exclusion.
    ///
    /// The walk follows computed usersets, tuple-to-userset targets and
    /// userset type constraints (`group#member`). Objects reached only
    /// through pure union, direct and tuple-to-userset edges are provable
    /// by reachability; anything else needs per-object verification.
    pub fn requires_check(&self, type_name: &str, relation: &str) -> DomainResult<bool> {
        // Validates the entry point; dependencies that don't resolve are skipped.
        self.get_relation(type_name, relation)?;

        let mut visited = HashSet::new();
        let mut stack = vec![(type_name.to_string(), relation.to_string())];

        while let Some((current_type, current_relation)) = stack.pop() {
            if !visited.insert(format!("{current_type}#{current_relation}")) {
                continue;
            }
            let Ok(relation_def) = self.get_relation(&current_type, &current_relation) else {
                continue;
            };
            if relation_def.rewrite.has_set_operation() {
                return Ok(true);
            }
            self.collect_dependencies(
                &current_type,
                &relation_def,
                &relation_def.rewrite,
                &mut stack,
            );
        }

        Ok(false)
    }

    /// Every `(type, relation)` pair defined by the model.
    pub fn relations(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.model.type_definitions.iter().flat_map(|t| {
            t.relations
                .iter()
                .map(move |r| (t.type_name.clone(), r.name.clone()))
        })
    }

    /// Pushes every `(type, relation)` a rewrite reads from onto `out`.
    fn collect_dependencies(
        &self,
        type_name: &str,
        relation_def: &RelationDefinition,
        userset: &Userset,
        out: &mut Vec<(String, String)>,
    ) {
        match userset {
            Userset::This if relation_def.type_constraints.is_empty() => {
                out.extend(self.relations());
            }
            Userset::This => {
                for constraint in &relation_def.type_constraints {
                    if let (user_type, Some(user_relation)) = constraint.parts() {
                        out.push((user_type.to_string(), user_relation.to_string()));
                    }
                }
            }
            Userset::ComputedUserset { relation } => {
                out.push((type_name.to_string(), relation.clone()));
            }
            Userset::TupleToUserset {
                tupleset,
                computed_userset,
            } => {
                for parent in self
                    .tupleset_parent_types(type_name, tupleset)
                    .unwrap_or_default()
                {
                    if self.has_relation(&parent, computed_userset) {
                        out.push((parent, computed_userset.clone()));
                    }
                }
            }
            Userset::Union { children } | Userset::Intersection { children } => {
                for child in children {
                    self.collect_dependencies(type_name, relation_def, child, out);
                }
            }
            Userset::Exclusion { base, subtract } => {
                self.collect_dependencies(type_name, relation_def, base, out);
                self.collect_dependencies(type_name, relation_def, subtract, out);
            }
        }
    }

    /// Validates a tuple against the type system.
    ///
    /// Checks that:
    /// - The object is `type:id` and its type exists
    /// - The relation exists on the object type
    /// - The user is well-formed and its type (and userset relation) exists
    /// - The user satisfies the relation's type constraints, when it has any
    ///
    /// # Errors
    ///
    /// Returns appropriate `DomainError` variants if validation fails.
    pub fn validate_tuple(&self, tuple: &Tuple) -> DomainResult<()> {
        let object =
            Object::parse(&tuple.object).map_err(|e| DomainError::InvalidObjectFormat {
                value: format!("{}: {}", tuple.object, e),
            })?;

        self.get_type(&object.object_type)?;
        let relation_def = self.get_relation(&object.object_type, &tuple.relation)?;

        let user = UserRef::parse(&tuple.user).map_err(|e| DomainError::InvalidUserFormat {
            value: format!("{}: {}", tuple.user, e),
        })?;

        self.get_type(user.user_type())?;
        if let UserRef::Userset { object, relation } = &user {
            self.get_relation(&object.object_type, relation)?;
        }

        if !relation_def.type_constraints.is_empty() {
            let key = user.constraint_key();
            if !relation_def
                .type_constraints
                .iter()
                .any(|c| c.type_name == key)
            {
                return Err(DomainError::ModelValidationError {
                    message: format!(
                        "type '{}' is not allowed on {}#{}",
                        key, object.object_type, tuple.relation
                    ),
                });
            }
        }

        Ok(())
    }

    /// Clears the internal caches.
    pub fn clear_cache(&self) {
        self.type_cache.clear();
        self.relation_cache.clear();
    }

    /// Returns the number of cached type definitions.
    pub fn type_cache_size(&self) -> usize {
        self.type_cache.len()
    }

    /// Returns the number of cached relation definitions.
    pub fn relation_cache_size(&self) -> usize {
        self.relation_cache.len()
    }
}
