//! Persistence contracts for keys, domains, and groups.
//!
//! Relation tuples are not stored here; they live behind
//! [`tessera_authz::RelationTupleBackend`]. These repositories hold the
//! entity records only.
use crate::model::{Domain, DomainPage, DomainReq, DomainsPage, Group, GroupPage, GroupReq, GroupsPage, Key};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Records of persisted keys (`Recovery` and `Api`).
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Saving a `Recovery` key replaces any earlier recovery key of the
    /// same subject. A duplicate `id` is a conflict.
    async fn save(&self, key: Key) -> StoreResult<()>;
    async fn retrieve(&self, id: &str) -> StoreResult<Key>;
    async fn remove(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// A duplicate `id` or non-empty `alias` is a conflict.
    async fn save(&self, domain: Domain) -> StoreResult<Domain>;
    async fn retrieve_by_id(&self, id: &str) -> StoreResult<Domain>;
    async fn retrieve_all(&self, page: &DomainPage) -> StoreResult<DomainsPage>;
    /// Applies every `Some` field of `req`, including `status`.
    async fn update(
        &self,
        id: &str,
        updated_by: &str,
        req: &DomainReq,
        now: i64,
    ) -> StoreResult<Domain>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn save(&self, group: Group) -> StoreResult<Group>;
    async fn retrieve_by_id(&self, id: &str) -> StoreResult<Group>;
    /// Missing IDs are skipped; order follows `ids`.
    async fn retrieve_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Group>>;
    async fn retrieve_all(&self, page: &GroupPage) -> StoreResult<GroupsPage>;
    async fn update(&self, id: &str, req: &GroupReq, now: i64) -> StoreResult<Group>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}
