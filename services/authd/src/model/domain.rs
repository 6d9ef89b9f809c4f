//! Tenant domain records and paging.
use super::Metadata;
use serde::{Deserialize, Serialize};
use tessera_authz::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DomainStatus {
    #[default]
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "freezed")]
    Freeze,
    /// Query-only wildcard; never stored.
    #[serde(rename = "all")]
    All,
}

impl DomainStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainStatus::Enabled => "enabled",
            DomainStatus::Disabled => "disabled",
            DomainStatus::Freeze => "freezed",
            DomainStatus::All => "all",
        }
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "enabled" => Ok(DomainStatus::Enabled),
            "disabled" => Ok(DomainStatus::Disabled),
            "freezed" => Ok(DomainStatus::Freeze),
            "all" => Ok(DomainStatus::All),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
    /// Unique human-readable handle; empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default)]
    pub status: DomainStatus,
    /// Principal that created the domain.
    #[serde(default)]
    pub owner: String,
    /// Caller's effective permissions; computed per request, never stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_by: String,
    #[serde(default)]
    pub updated_at: i64,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainReq {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
    pub status: Option<DomainStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPage {
    pub offset: u64,
    pub limit: u64,
    /// Case-insensitive substring filter on `name`.
    pub name: Option<String>,
    /// `None` and `Some(All)` both match every status.
    pub status: Option<DomainStatus>,
    /// Restrict to these IDs; `None` means unrestricted.
    #[serde(skip)]
    pub ids: Option<Vec<String>>,
}

impl Default for DomainPage {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
            name: None,
            status: None,
            ids: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainsPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub domains: Vec<Domain>,
}
