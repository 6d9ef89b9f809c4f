//! Closed vocabularies for policy tuples.
//!
//! # Purpose
//! Entity types, subject kinds, relations, and permissions are modelled as
//! enums so a typo can never reach the backend as a brand-new namespace or
//! relation name.
//!
//! # Key invariants
//! - `as_str` is the only place where these values become backend strings.
//! - `FromStr` accepts exactly the strings `as_str` produces.
use serde::{Deserialize, Serialize};

/// Object/subject namespace known to the relation-tuple backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Group,
    Domain,
    Platform,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
            EntityType::Domain => "domain",
            EntityType::Platform => "platform",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(EntityType::User),
            "group" => Ok(EntityType::Group),
            "domain" => Ok(EntityType::Domain),
            "platform" => Ok(EntityType::Platform),
            _ => Err(()),
        }
    }
}

/// How the `subject` field of a request must be interpreted.
///
/// `Token` subjects are bearer tokens that the authorization service resolves
/// to a principal before any tuple check; the other kinds name principals
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Users,
    Groups,
    Domains,
    Platform,
    Token,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Users => "users",
            SubjectKind::Groups => "groups",
            SubjectKind::Domains => "domains",
            SubjectKind::Platform => "platform",
            SubjectKind::Token => "token",
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubjectKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "users" => Ok(SubjectKind::Users),
            "groups" => Ok(SubjectKind::Groups),
            "domains" => Ok(SubjectKind::Domains),
            "platform" => Ok(SubjectKind::Platform),
            "token" => Ok(SubjectKind::Token),
            _ => Err(()),
        }
    }
}

/// Stored relation between a subject and an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Administrator,
    Editor,
    Viewer,
    Member,
    Domain,
    ParentGroup,
    Platform,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Administrator => "administrator",
            Relation::Editor => "editor",
            Relation::Viewer => "viewer",
            Relation::Member => "member",
            Relation::Domain => "domain",
            Relation::ParentGroup => "parent_group",
            Relation::Platform => "platform",
        }
    }

    /// Permission a requester must already hold before granting this relation
    /// to someone else.
    ///
    /// Only the four user-facing roles can be delegated; structural relations
    /// (`domain`, `parent_group`, `platform`) return `None`.
    pub fn delegation_permission(self) -> Option<Permission> {
        match self {
            Relation::Administrator => Some(Permission::Admin),
            Relation::Editor => Some(Permission::Edit),
            Relation::Viewer => Some(Permission::View),
            Relation::Member => Some(Permission::Membership),
            Relation::Domain | Relation::ParentGroup | Relation::Platform => None,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "administrator" => Ok(Relation::Administrator),
            "editor" => Ok(Relation::Editor),
            "viewer" => Ok(Relation::Viewer),
            "member" => Ok(Relation::Member),
            "domain" => Ok(Relation::Domain),
            "parent_group" => Ok(Relation::ParentGroup),
            "platform" => Ok(Relation::Platform),
            _ => Err(()),
        }
    }
}

/// Computed permission evaluated by the backend schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Admin,
    Delete,
    Edit,
    View,
    Membership,
    Share,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Admin => "admin",
            Permission::Delete => "delete",
            Permission::Edit => "edit",
            Permission::View => "view",
            Permission::Membership => "membership",
            Permission::Share => "share",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Permission::Admin),
            "delete" => Ok(Permission::Delete),
            "edit" => Ok(Permission::Edit),
            "view" => Ok(Permission::View),
            "membership" => Ok(Permission::Membership),
            "share" => Ok(Permission::Share),
            _ => Err(()),
        }
    }
}
