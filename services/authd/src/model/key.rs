//! Credential descriptors.
//!
//! # Key invariants
//! - `Access` and `Refresh` keys are never persisted; `id` is empty for them.
//! - `Recovery` and `Api` keys are persisted and carry a non-empty `id`, which
//!   is also the token's `jti`.
//! - `expires_at == None` is only permitted for `Api` keys.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Access,
    Refresh,
    Recovery,
    Api,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Access => "access",
            KeyType::Refresh => "refresh",
            KeyType::Recovery => "recovery",
            KeyType::Api => "api",
        }
    }

    /// Whether keys of this type have a stored record.
    pub fn is_persisted(self) -> bool {
        matches!(self, KeyType::Recovery | KeyType::Api)
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "access" => Ok(KeyType::Access),
            "refresh" => Ok(KeyType::Refresh),
            "recovery" => Ok(KeyType::Recovery),
            "api" => Ok(KeyType::Api),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub key_type: KeyType,
    /// Principal that requested issuance.
    pub issuer_id: String,
    /// Principal the token identifies.
    pub subject: String,
    /// Epoch seconds.
    pub issued_at: i64,
    /// Epoch seconds; `None` never expires.
    pub expires_at: Option<i64>,
}

impl Key {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// Issuance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key_type: KeyType,
    #[serde(default)]
    pub subject: String,
    /// Requested expiry in epoch seconds. Clamped for Access keys, honoured as
    /// given for Api keys, ignored for Refresh and Recovery keys.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl KeyRequest {
    pub fn new(key_type: KeyType, subject: impl Into<String>) -> Self {
        Self {
            key_type,
            subject: subject.into(),
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub access_type: String,
}

impl IssuedToken {
    pub(crate) fn bearer(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            access_type: "Bearer".to_string(),
        }
    }
}
