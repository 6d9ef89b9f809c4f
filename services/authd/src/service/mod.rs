//! Service traits and their core implementations.
//!
//! # How it fits
//! [`AuthService`] is the single entry point for credentials and policy.
//! [`DomainService`] and [`GroupService`] sit on top of it and never talk to
//! the policy agent directly. Each trait has a `Core*` implementation holding
//! the business rules, and a `Logging*` decorator in [`logging`] that adds
//! tracing and metrics. The decorators are stacked once, at startup.
//!
//! # Requester tokens
//! Every domain and group operation takes the caller's bearer token first.
//! It is identified through [`AuthService::identify`] and must be an Access or
//! API key; Refresh and Recovery keys only ever feed [`AuthService::issue`].
use crate::error::{AuthError, AuthResult};
use crate::model::{
    Domain, DomainPage, DomainReq, DomainStatus, DomainsPage, Group, GroupPage, GroupReq,
    GroupsPage, IssuedToken, Key, KeyRequest, KeyType, MemberKind,
};
use async_trait::async_trait;
use tessera_authz::{
    EntityType, Permission, PolicyPage, PolicyReq, Relation, RelationQuery, RelationsPage,
};

pub mod auth;
pub mod domains;
pub mod groups;
pub mod logging;

pub use auth::{CoreAuthService, TokenTtls};
pub use domains::CoreDomainService;
pub use groups::CoreGroupService;
pub use logging::{LoggingAuthService, LoggingDomainService, LoggingGroupService};

/// Object ID of the single platform entity.
pub const PLATFORM_ID: &str = "platform";

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Mint a credential. `token` is the requester's own token; it is empty
    /// for trusted Access logins and for Recovery issuance.
    async fn issue(&self, token: &str, req: KeyRequest) -> AuthResult<IssuedToken>;
    async fn revoke(&self, token: &str, id: &str) -> AuthResult<()>;
    async fn retrieve_key(&self, token: &str, id: &str) -> AuthResult<Key>;
    async fn identify(&self, token: &str) -> AuthResult<Key>;
    /// Domain-gated, fail-closed policy check.
    async fn authorize(&self, req: &PolicyReq) -> AuthResult<()>;

    async fn add_policy(&self, req: &PolicyReq) -> AuthResult<()>;
    async fn add_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()>;
    async fn delete_policy(&self, req: &PolicyReq) -> AuthResult<()>;
    async fn delete_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()>;

    async fn list_objects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage>;
    async fn list_all_objects(&self, req: &PolicyReq) -> AuthResult<PolicyPage>;
    async fn count_objects(&self, req: &PolicyReq) -> AuthResult<u64>;
    async fn list_subjects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage>;
    async fn list_all_subjects(&self, req: &PolicyReq) -> AuthResult<PolicyPage>;
    async fn count_subjects(&self, req: &PolicyReq) -> AuthResult<u64>;
    async fn list_permissions(
        &self,
        req: &PolicyReq,
        permissions: &[Permission],
    ) -> AuthResult<Vec<Permission>>;
    async fn read_relations(
        &self,
        query: &RelationQuery,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<RelationsPage>;
}

#[async_trait]
pub trait DomainService: Send + Sync {
    async fn create_domain(&self, token: &str, domain: Domain) -> AuthResult<Domain>;
    async fn retrieve_domain(&self, token: &str, id: &str) -> AuthResult<Domain>;
    async fn retrieve_domain_permissions(&self, token: &str, id: &str)
    -> AuthResult<Vec<Permission>>;
    async fn update_domain(&self, token: &str, id: &str, req: DomainReq) -> AuthResult<Domain>;
    async fn change_domain_status(
        &self,
        token: &str,
        id: &str,
        status: DomainStatus,
    ) -> AuthResult<Domain>;
    async fn list_domains(&self, token: &str, page: DomainPage) -> AuthResult<DomainsPage>;
    async fn assign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()>;
    async fn unassign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()>;
    async fn list_user_domains(
        &self,
        token: &str,
        user_id: &str,
        page: DomainPage,
    ) -> AuthResult<DomainsPage>;
}

#[async_trait]
pub trait GroupService: Send + Sync {
    async fn create_group(&self, token: &str, group: Group) -> AuthResult<Group>;
    async fn update_group(&self, token: &str, id: &str, req: GroupReq) -> AuthResult<Group>;
    async fn view_group(&self, token: &str, id: &str) -> AuthResult<Group>;
    async fn list_groups(&self, token: &str, page: GroupPage) -> AuthResult<GroupsPage>;
    /// Ancestors up to `level` hops away, nearest first.
    async fn list_parents(&self, token: &str, id: &str, level: usize) -> AuthResult<Vec<Group>>;
    /// Descendants up to `level` hops away, breadth first.
    async fn list_children(&self, token: &str, id: &str, level: usize)
    -> AuthResult<Vec<Group>>;
    async fn list_members(
        &self,
        token: &str,
        group_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage>;
    async fn list_memberships(
        &self,
        token: &str,
        member_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage>;
    async fn assign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()>;
    async fn unassign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()>;
    async fn remove_group(&self, token: &str, id: &str) -> AuthResult<()>;
}

/// Resolve a requester token to the principal it authenticates.
pub(crate) async fn identify_principal(auth: &dyn AuthService, token: &str) -> AuthResult<String> {
    let key = auth.identify(token).await?;
    match key.key_type {
        KeyType::Access | KeyType::Api => Ok(key.subject),
        KeyType::Refresh | KeyType::Recovery => Err(AuthError::unauthenticated()),
    }
}

pub(crate) fn platform_admin_req(user_id: &str) -> PolicyReq {
    PolicyReq::user(user_id, EntityType::Platform, PLATFORM_ID).with_permission(Permission::Admin)
}

/// Denials are `false`; any other failure propagates.
pub(crate) async fn is_platform_admin(auth: &dyn AuthService, user_id: &str) -> AuthResult<bool> {
    match auth.authorize(&platform_admin_req(user_id)).await {
        Ok(()) => Ok(true),
        Err(AuthError::Authorization(_)) => Ok(false),
        Err(err) => Err(err),
    }
}

pub(crate) fn require_non_empty(value: &str, field: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::malformed(format!("empty {field}")));
    }
    Ok(())
}
