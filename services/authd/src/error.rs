//! Service error kinds.
//!
//! # Key invariants
//! - Authentication and authorization failures stay distinct kinds.
//! - Their `Display` text is generic. Detail lives only in the source chain
//!   and in server-side `tracing` output.
//! - Store and backend failures keep their cause as the source.
use crate::auth::TokenError;
use crate::store::StoreError;
use tessera_authz::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed")]
    Authentication(#[source] Option<TokenError>),
    #[error("authorization denied")]
    Authorization(#[source] Option<PolicyError>),
    #[error("token expired")]
    Expired,
    #[error("key not found")]
    KeyNotFound,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("invalid key type")]
    InvalidKeyType,
    #[error("domain is not active")]
    DomainNotActive,
    #[error("group has child groups")]
    GroupNotEmpty,
    #[error("malformed entity: {0}")]
    MalformedEntity(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub(crate) fn unauthenticated() -> Self {
        AuthError::Authentication(None)
    }

    pub(crate) fn denied() -> Self {
        AuthError::Authorization(None)
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        AuthError::MalformedEntity(message.into())
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Authentication(_) => "authentication",
            AuthError::Authorization(_) => "authorization",
            AuthError::Expired => "expired",
            AuthError::KeyNotFound => "key_not_found",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidKeyType => "invalid_key_type",
            AuthError::DomainNotActive => "domain_not_active",
            AuthError::GroupNotEmpty => "group_not_empty",
            AuthError::MalformedEntity(_) => "malformed_entity",
            AuthError::Conflict(_) => "conflict",
            AuthError::NotFound(_) => "not_found",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => AuthError::NotFound(what),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Unexpected(err) => AuthError::Internal(err.context("store failure")),
        }
    }
}

impl From<PolicyError> for AuthError {
    fn from(value: PolicyError) -> Self {
        match value {
            PolicyError::Authorization(_) => AuthError::Authorization(Some(value)),
            PolicyError::MalformedEntity(message) => AuthError::MalformedEntity(message),
            PolicyError::Backend(err) => {
                AuthError::Internal(anyhow::Error::new(err).context("relation-tuple backend failure"))
            }
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired(_) => AuthError::Expired,
            TokenError::InvalidKeyType(_) => AuthError::InvalidKeyType,
            TokenError::Malformed(_) => AuthError::Authentication(Some(value)),
            TokenError::Key(_) | TokenError::Jwt(_) => {
                AuthError::Internal(anyhow::Error::new(value).context("token signing failure"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use tessera_authz::BackendError;

    #[test]
    fn denial_messages_are_generic() {
        let err = AuthError::from(PolicyError::Authorization(Some(BackendError::Unavailable(
            "db at 10.0.0.7 down".to_string(),
        ))));
        assert_eq!(err.to_string(), "authorization denied");
        assert_eq!(err.kind(), "authorization");
        assert!(err.source().is_some());
        assert_eq!(AuthError::unauthenticated().to_string(), "authentication failed");
    }

    #[test]
    fn store_and_backend_errors_map_to_kinds() {
        assert!(matches!(
            AuthError::from(StoreError::Conflict("alias".into())),
            AuthError::Conflict(_)
        ));
        assert!(matches!(
            AuthError::from(StoreError::NotFound("group".into())),
            AuthError::NotFound(_)
        ));
        let internal = AuthError::from(PolicyError::Backend(BackendError::Unavailable(
            "down".into(),
        )));
        assert_eq!(internal.kind(), "internal");
        assert!(internal.source().is_some());
        assert!(matches!(
            AuthError::from(PolicyError::MalformedEntity("x".into())),
            AuthError::MalformedEntity(_)
        ));
    }
}
