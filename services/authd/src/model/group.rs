//! Hierarchical group records and paging.
use serde::{Deserialize, Serialize};

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// `None` for a root group. Fixed at creation.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Principal that created the group.
    #[serde(default)]
    pub owner_id: String,
    /// Tenant scope, if the group belongs to a domain.
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Partial update; the parent and domain cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupReq {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPage {
    pub offset: u64,
    pub limit: u64,
    pub name: Option<String>,
    pub domain_id: Option<String>,
    #[serde(skip)]
    pub ids: Option<Vec<String>>,
}

impl Default for GroupPage {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
            name: None,
            domain_id: None,
            ids: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupsPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub groups: Vec<Group>,
}

/// Kind of principal assigned to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Users,
    Groups,
}

impl MemberKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberKind::Users => "users",
            MemberKind::Groups => "groups",
        }
    }
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemberKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "users" => Ok(MemberKind::Users),
            "groups" => Ok(MemberKind::Groups),
            _ => Err(()),
        }
    }
}
