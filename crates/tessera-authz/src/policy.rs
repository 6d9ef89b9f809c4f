//! Policy request and page types.
//!
//! A [`PolicyReq`] is the one shape used for checks, tuple mutations, and
//! lookups. It is never persisted. Relation mutations use `relation`; checks
//! and lookups use `permission` when present and fall back to `relation`.
use crate::{EntityType, Permission, Relation, SubjectKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyReq {
    /// Tenant scope; `None` for domain-less checks.
    pub domain: Option<String>,
    pub subject: String,
    pub subject_type: EntityType,
    pub subject_kind: SubjectKind,
    pub relation: Option<Relation>,
    pub permission: Option<Permission>,
    pub object_type: EntityType,
    pub object: String,
}

impl PolicyReq {
    /// Request with the subject kind that matches `subject_type`.
    pub fn new(
        subject_type: EntityType,
        subject: impl Into<String>,
        object_type: EntityType,
        object: impl Into<String>,
    ) -> Self {
        let subject_kind = match subject_type {
            EntityType::User => SubjectKind::Users,
            EntityType::Group => SubjectKind::Groups,
            EntityType::Domain => SubjectKind::Domains,
            EntityType::Platform => SubjectKind::Platform,
        };
        Self {
            domain: None,
            subject: subject.into(),
            subject_type,
            subject_kind,
            relation: None,
            permission: None,
            object_type,
            object: object.into(),
        }
    }

    /// Shorthand for a user subject.
    pub fn user(
        user_id: impl Into<String>,
        object_type: EntityType,
        object: impl Into<String>,
    ) -> Self {
        Self::new(EntityType::User, user_id, object_type, object)
    }

    /// Request whose subject is a bearer token still to be identified.
    pub fn token(token: impl Into<String>, object_type: EntityType, object: impl Into<String>) -> Self {
        Self {
            subject_kind: SubjectKind::Token,
            ..Self::new(EntityType::User, token, object_type, object)
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn in_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Backend name evaluated by checks and lookups.
    pub fn check_name(&self) -> Option<&'static str> {
        self.permission
            .map(Permission::as_str)
            .or_else(|| self.relation.map(Relation::as_str))
    }
}

/// Cursor-paginated identifiers returned by object/subject listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPage {
    pub policies: Vec<String>,
    /// Opaque cursor for the next call; `None` when exhausted.
    pub next_page_token: Option<String>,
}

/// Partial pattern over stored relations, in typed form.
///
/// A plain `subject` requires `subject_type`; a subject-set string carries its
/// own namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationQuery {
    pub object_type: EntityType,
    pub object: Option<String>,
    pub relation: Option<Relation>,
    pub subject_type: Option<EntityType>,
    pub subject: Option<String>,
}

impl RelationQuery {
    pub fn on(object_type: EntityType) -> Self {
        Self {
            object_type,
            object: None,
            relation: None,
            subject_type: None,
            subject: None,
        }
    }

    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn subject(mut self, subject_type: EntityType, subject: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type);
        self.subject = Some(subject.into());
        self
    }

    pub fn subject_type(mut self, subject_type: EntityType) -> Self {
        self.subject_type = Some(subject_type);
        self
    }
}

/// Stored relations matching a [`RelationQuery`], as mutation-ready requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationsPage {
    pub relations: Vec<PolicyReq>,
    pub next_page_token: Option<String>,
}
