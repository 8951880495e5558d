//! Core type definitions for the authorization model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An object identifier (e.g., "document:readme").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    /// The type portion (e.g., "document").
    pub object_type: String,
    /// The ID portion (e.g., "readme").
    pub object_id: String,
}

impl Object {
    /// Creates a new Object from type and ID.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// Parses an object from "type:id" format.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (object_type, object_id) = value
            .split_once(':')
            .ok_or("object must be in 'type:id' format")?;
        if object_type.is_empty() || object_id.is_empty() {
            return Err("object type and id cannot be empty");
        }
        if object_id.contains('#') {
            return Err("object id cannot contain '#'");
        }
        Ok(Self::new(object_type, object_id))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// A parsed user (subject) reference.
///
/// Users come in three shapes:
/// - `user:alice` - a concrete object
/// - `user:*` - every object of a type
/// - `group:eng#member` - the set of users holding a relation on an object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserRef {
    Object(Object),
    Wildcard { user_type: String },
    Userset { object: Object, relation: String },
}

impl UserRef {
    /// Parses a user string.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        if let Some((object_part, relation)) = value.split_once('#') {
            if relation.is_empty() || relation.contains('#') {
                return Err("userset relation cannot be empty");
            }
            let object = Object::parse(object_part)?;
            if object.object_id == "*" {
                return Err("wildcard cannot carry a relation");
            }
            return Ok(Self::Userset {
                object,
                relation: relation.to_string(),
            });
        }

        let object = Object::parse(value)?;
        if object.object_id == "*" {
            Ok(Self::Wildcard {
                user_type: object.object_type,
            })
        } else {
            Ok(Self::Object(object))
        }
    }

    /// Returns the type of the user.
    pub fn user_type(&self) -> &str {
        match self {
            Self::Object(object) => &object.object_type,
            Self::Wildcard { user_type } => user_type,
            Self::Userset { object, .. } => &object.object_type,
        }
    }

    /// Returns the type-constraint string this user satisfies
    /// (`user`, `user:*` or `group#member`).
    pub fn constraint_key(&self) -> String {
        match self {
            Self::Object(object) => object.object_type.clone(),
            Self::Wildcard { user_type } => format!("{user_type}:*"),
            Self::Userset { object, relation } => format!("{}#{}", object.object_type, relation),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard { .. })
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => write!(f, "{object}"),
            Self::Wildcard { user_type } => write!(f, "{user_type}:*"),
            Self::Userset { object, relation } => write!(f, "{object}#{relation}"),
        }
    }
}

/// A tuple representing a relationship (user, relation, object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    /// The user (subject) of the relationship.
    pub user: String,
    /// The relation between user and object.
    pub relation: String,
    /// The object of the relationship.
    pub object: String,
}

impl Tuple {
    /// Creates a new Tuple.
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
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.user)
    }
}

/// An authorization model defining types and their relations.
///
/// Models are immutable once written. A store may hold many; each request
/// binds to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationModel {
    /// Model identifier. Empty until the model is persisted.
    #[serde(default)]
    pub id: String,
    /// Schema version (e.g., "1.1").
    pub schema_version: String,
    /// Type definitions in the model.
    pub type_definitions: Vec<TypeDefinition>,
}

impl AuthorizationModel {
    /// Creates an empty model.
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self::with_types(schema_version, Vec::new())
    }

    /// Creates a model with the given type definitions.
    pub fn with_types(
        schema_version: impl Into<String>,
        type_definitions: Vec<TypeDefinition>,
    ) -> Self {
        Self {
            id: String::new(),
            schema_version: schema_version.into(),
            type_definitions,
        }
    }

    /// Sets the model identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A type definition within the authorization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// The type name (e.g., "document", "folder").
    pub type_name: String,
    /// Relations defined on this type.
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

impl TypeDefinition {
    pub fn new(type_name: impl Into<String>, relations: Vec<RelationDefinition>) -> Self {
        Self {
            type_name: type_name.into(),
            relations,
        }
    }
}

/// A relation definition on a type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// The relation name.
    pub name: String,
    /// User types that may be directly assigned (`[user, group#member]`).
    #[serde(default)]
    pub type_constraints: Vec<TypeConstraint>,
    /// The userset rewrite for this relation.
    pub rewrite: Userset,
}

impl RelationDefinition {
    pub fn new(
        name: impl Into<String>,
        type_constraints: Vec<TypeConstraint>,
        rewrite: Userset,
    ) -> Self {
        Self {
            name: name.into(),
            type_constraints,
            rewrite,
        }
    }
}

/// A directly assignable user type: `user`, `user:*` or `group#member`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeConstraint {
    pub type_name: String,
}

impl TypeConstraint {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    /// Splits the constraint into its type and optional userset relation.
    pub fn parts(&self) -> (&str, Option<&str>) {
        match self.type_name.split_once('#') {
            Some((type_name, relation)) => (type_name, Some(relation)),
            None => (self.type_name.trim_end_matches(":*"), None),
        }
    }

    /// Returns true for `type:*` constraints.
    pub fn is_wildcard(&self) -> bool {
        self.type_name.ends_with(":*")
    }
}

impl From<&str> for TypeConstraint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A userset defines how a relation is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Userset {
    /// Direct assignment (this).
    This,
    /// Computed userset from another relation.
    ComputedUserset { relation: String },
    /// Tuple to userset (relation from parent).
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
    /// Union of multiple usersets.
    Union { children: Vec<Userset> },
    /// Intersection of multiple usersets.
    Intersection { children: Vec<Userset> },
    /// Exclusion (base but not subtract).
    Exclusion {
        base: Box<Userset>,
        subtract: Box<Userset>,
    },
}

impl Userset {
    /// Returns true if this expression contains an intersection or exclusion.
    pub fn has_set_operation(&self) -> bool {
        match self {
            Userset::This | Userset::ComputedUserset { .. } | Userset::TupleToUserset { .. } => {
                false
            }
            Userset::Union { children } => children.iter().any(Userset::has_set_operation),
            Userset::Intersection { .. } | Userset::Exclusion { .. } => true,
        }
    }
}
