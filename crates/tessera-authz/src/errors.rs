use crate::BackendError;

/// Errors returned by the policy agent.
///
/// `Authorization` covers both a definite denial and a check the backend
/// could not answer; the latter keeps the backend error as its source so it
/// can be logged without changing what callers see.
#[derive(Debug)]
pub enum PolicyError {
    Authorization(Option<BackendError>),
    MalformedEntity(String),
    Backend(BackendError),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::Authorization(_) => f.write_str("authorization denied"),
            PolicyError::MalformedEntity(detail) => write!(f, "malformed entity: {detail}"),
            PolicyError::Backend(_) => f.write_str("relation-tuple backend error"),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::Authorization(Some(err)) | PolicyError::Backend(err) => Some(err),
            PolicyError::Authorization(None) | PolicyError::MalformedEntity(_) => None,
        }
    }
}

impl From<BackendError> for PolicyError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::InvalidCursor => {
                PolicyError::MalformedEntity("invalid page token".to_string())
            }
            other => PolicyError::Backend(other),
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
