//! Contract expected from a relation-tuple backend.
//!
//! # Purpose
//! The policy agent never talks to a concrete ReBAC service directly; it goes
//! through [`RelationTupleBackend`]. Production deployments plug in a client
//! for an external service, tests and local runs use
//! [`crate::InMemoryTupleStore`].
//!
//! # Wire shape
//! Everything at this layer is string-typed: namespaces, relations, and
//! permissions are the names the backend schema knows. The typed vocabulary
//! in [`crate::types`] is mapped onto these strings only in the agent.
//!
//! # Key invariants
//! - A tuple subject is either a concrete `(namespace, id)` or a subject-set.
//! - `write` reports, per delta, whether it changed backend state. Inserting
//!   an existing tuple or deleting an absent one reports `false`.
//! - Cursors are opaque; callers pass back exactly what they received.
use crate::SubjectSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subject side of a stored tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TupleSubject {
    Id { namespace: String, id: String },
    Set(SubjectSet),
}

impl TupleSubject {
    pub fn id(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        TupleSubject::Id {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            TupleSubject::Id { namespace, .. } => namespace,
            TupleSubject::Set(set) => &set.namespace,
        }
    }

    /// Object identifier of the subject, ignoring any set relation.
    pub fn object_id(&self) -> &str {
        match self {
            TupleSubject::Id { id, .. } => id,
            TupleSubject::Set(set) => &set.object,
        }
    }
}

impl std::fmt::Display for TupleSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TupleSubject::Id { namespace, id } => write!(f, "{namespace}:{id}"),
            TupleSubject::Set(set) => set.fmt(f),
        }
    }
}

/// `namespace:object#relation@subject`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationTuple {
    pub namespace: String,
    pub object: String,
    pub relation: String,
    pub subject: TupleSubject,
}

impl std::fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}",
            self.namespace, self.object, self.relation, self.subject
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TupleDelta {
    Insert(RelationTuple),
    Delete(RelationTuple),
}

impl TupleDelta {
    pub fn tuple(&self) -> &RelationTuple {
        match self {
            TupleDelta::Insert(tuple) | TupleDelta::Delete(tuple) => tuple,
        }
    }

    /// Delta that undoes this one.
    pub fn inverse(&self) -> TupleDelta {
        match self {
            TupleDelta::Insert(tuple) => TupleDelta::Delete(tuple.clone()),
            TupleDelta::Delete(tuple) => TupleDelta::Insert(tuple.clone()),
        }
    }
}

/// Partial tuple pattern; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleFilter {
    pub namespace: Option<String>,
    pub object: Option<String>,
    pub relation: Option<String>,
    pub subject: Option<TupleSubject>,
    pub subject_namespace: Option<String>,
}

impl TupleFilter {
    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        self.namespace.as_ref().is_none_or(|ns| *ns == tuple.namespace)
            && self.object.as_ref().is_none_or(|obj| *obj == tuple.object)
            && self.relation.as_ref().is_none_or(|rel| *rel == tuple.relation)
            && self.subject.as_ref().is_none_or(|sub| *sub == tuple.subject)
            && self
                .subject_namespace
                .as_ref()
                .is_none_or(|ns| ns == tuple.subject.namespace())
    }
}

/// "Does `subject` hold `permission` on `namespace:object`?"
///
/// `permission` may name either a computed permission or a stored relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckQuery {
    pub namespace: String,
    pub object: String,
    pub permission: String,
    pub subject: TupleSubject,
}

/// Objects of `namespace` on which `subject` holds `permission`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLookup {
    pub namespace: String,
    pub permission: String,
    pub subject: TupleSubject,
}

/// Concrete subjects of `subject_namespace` holding `permission` on the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectLookup {
    pub namespace: String,
    pub object: String,
    pub permission: String,
    pub subject_namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("relation-tuple backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid page cursor")]
    InvalidCursor,
    #[error("permission evaluation exceeded depth {0}")]
    DepthExceeded(usize),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait RelationTupleBackend: Send + Sync {
    async fn check(&self, query: &CheckQuery) -> BackendResult<bool>;

    /// Apply `deltas` and report which ones changed state.
    ///
    /// When [`supports_transactions`](Self::supports_transactions) is true the
    /// whole slice is applied or nothing is. Otherwise a failure may leave an
    /// unspecified prefix applied, and callers must compensate.
    async fn write(&self, deltas: &[TupleDelta]) -> BackendResult<Vec<bool>>;

    async fn read(
        &self,
        filter: &TupleFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<RelationTuple>>;

    async fn lookup_resources(
        &self,
        lookup: &ResourceLookup,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<String>>;

    async fn lookup_subjects(
        &self,
        lookup: &SubjectLookup,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<String>>;

    async fn count_resources(&self, lookup: &ResourceLookup) -> BackendResult<u64>;

    async fn count_subjects(&self, lookup: &SubjectLookup) -> BackendResult<u64>;

    fn supports_transactions(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(subject: TupleSubject) -> RelationTuple {
        RelationTuple {
            namespace: "group".to_string(),
            object: "g1".to_string(),
            relation: "member".to_string(),
            subject,
        }
    }

    #[test]
    fn filter_matches_partial_patterns() {
        let t = tuple(TupleSubject::id("user", "alice"));
        assert!(TupleFilter::default().matches(&t));
        assert!(
            TupleFilter {
                namespace: Some("group".to_string()),
                subject_namespace: Some("user".to_string()),
                ..TupleFilter::default()
            }
            .matches(&t)
        );
        assert!(
            !TupleFilter {
                relation: Some("viewer".to_string()),
                ..TupleFilter::default()
            }
            .matches(&t)
        );
    }

    #[test]
    fn inverse_flips_delta_direction() {
        let t = tuple(TupleSubject::Set(SubjectSet::new(
            crate::EntityType::Group,
            "g2",
            "membership",
        )));
        assert_eq!(
            TupleDelta::Insert(t.clone()).inverse(),
            TupleDelta::Delete(t.clone())
        );
        assert_eq!(t.to_string(), "group:g1#member@group:g2#membership");
    }
}
