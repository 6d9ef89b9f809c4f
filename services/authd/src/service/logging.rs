//! Tracing and metrics decorators for the service traits.
//!
//! Each decorator wraps an inner implementation, forwards every call, and
//! records one event per call: `tracing::info!` on success and
//! `tracing::warn!` with the error kind on failure. Every call also bumps
//! `tessera_auth_requests_total{op,outcome}` and records
//! `tessera_auth_request_duration_seconds{op}`. Tokens are never logged.
use crate::error::{AuthError, AuthResult};
use crate::model::{
    Domain, DomainPage, DomainReq, DomainStatus, DomainsPage, Group, GroupPage, GroupReq,
    GroupsPage, IssuedToken, Key, KeyRequest, MemberKind,
};
use crate::service::{AuthService, DomainService, GroupService};
use async_trait::async_trait;
use std::time::Instant;
use tessera_authz::{Permission, PolicyPage, PolicyReq, Relation, RelationQuery, RelationsPage};

fn observe<T>(op: &'static str, resource: &str, started: Instant, result: &AuthResult<T>) {
    let elapsed = started.elapsed();
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    metrics::counter!("tessera_auth_requests_total", "op" => op, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("tessera_auth_request_duration_seconds", "op" => op)
        .record(elapsed.as_secs_f64());
    let duration_us = elapsed.as_micros() as u64;
    match result {
        Ok(_) => tracing::info!(op, resource, duration_us, "request completed"),
        Err(AuthError::Internal(err)) => {
            tracing::error!(op, resource, duration_us, error = ?err, "request failed")
        }
        Err(err) => {
            tracing::warn!(op, resource, duration_us, kind = err.kind(), error = %err, "request failed")
        }
    }
}

/// Resource label for a policy request: `object_type:object`.
fn policy_resource(req: &PolicyReq) -> String {
    format!("{}:{}", req.object_type, req.object)
}

pub struct LoggingAuthService<S> {
    inner: S,
}

impl<S> LoggingAuthService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: AuthService> AuthService for LoggingAuthService<S> {
    async fn issue(&self, token: &str, req: KeyRequest) -> AuthResult<IssuedToken> {
        let started = Instant::now();
        let key_type = req.key_type;
        let result = self.inner.issue(token, req).await;
        observe("issue", key_type.as_str(), started, &result);
        result
    }

    async fn revoke(&self, token: &str, id: &str) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.revoke(token, id).await;
        observe("revoke", id, started, &result);
        result
    }

    async fn retrieve_key(&self, token: &str, id: &str) -> AuthResult<Key> {
        let started = Instant::now();
        let result = self.inner.retrieve_key(token, id).await;
        observe("retrieve_key", id, started, &result);
        result
    }

    async fn identify(&self, token: &str) -> AuthResult<Key> {
        let started = Instant::now();
        let result = self.inner.identify(token).await;
        let resource = match &result {
            Ok(key) => key.key_type.as_str(),
            Err(_) => "",
        };
        observe("identify", resource, started, &result);
        result
    }

    async fn authorize(&self, req: &PolicyReq) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.authorize(req).await;
        observe("authorize", &policy_resource(req), started, &result);
        result
    }

    async fn add_policy(&self, req: &PolicyReq) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.add_policy(req).await;
        observe("add_policy", &policy_resource(req), started, &result);
        result
    }

    async fn add_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.add_policies(reqs).await;
        observe("add_policies", &reqs.len().to_string(), started, &result);
        result
    }

    async fn delete_policy(&self, req: &PolicyReq) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.delete_policy(req).await;
        observe("delete_policy", &policy_resource(req), started, &result);
        result
    }

    async fn delete_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.delete_policies(reqs).await;
        observe("delete_policies", &reqs.len().to_string(), started, &result);
        result
    }

    async fn list_objects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self.inner.list_objects(req, page_token, limit).await;
        observe("list_objects", req.object_type.as_str(), started, &result);
        result
    }

    async fn list_all_objects(&self, req: &PolicyReq) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self.inner.list_all_objects(req).await;
        observe("list_all_objects", req.object_type.as_str(), started, &result);
        result
    }

    async fn count_objects(&self, req: &PolicyReq) -> AuthResult<u64> {
        let started = Instant::now();
        let result = self.inner.count_objects(req).await;
        observe("count_objects", req.object_type.as_str(), started, &result);
        result
    }

    async fn list_subjects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self.inner.list_subjects(req, page_token, limit).await;
        observe("list_subjects", &policy_resource(req), started, &result);
        result
    }

    async fn list_all_subjects(&self, req: &PolicyReq) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self.inner.list_all_subjects(req).await;
        observe("list_all_subjects", &policy_resource(req), started, &result);
        result
    }

    async fn count_subjects(&self, req: &PolicyReq) -> AuthResult<u64> {
        let started = Instant::now();
        let result = self.inner.count_subjects(req).await;
        observe("count_subjects", &policy_resource(req), started, &result);
        result
    }

    async fn list_permissions(
        &self,
        req: &PolicyReq,
        permissions: &[Permission],
    ) -> AuthResult<Vec<Permission>> {
        let started = Instant::now();
        let result = self.inner.list_permissions(req, permissions).await;
        observe("list_permissions", &policy_resource(req), started, &result);
        result
    }

    async fn read_relations(
        &self,
        query: &RelationQuery,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<RelationsPage> {
        let started = Instant::now();
        let result = self.inner.read_relations(query, page_token, limit).await;
        observe("read_relations", query.object_type.as_str(), started, &result);
        result
    }
}

pub struct LoggingDomainService<S> {
    inner: S,
}

impl<S> LoggingDomainService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: DomainService> DomainService for LoggingDomainService<S> {
    async fn create_domain(&self, token: &str, domain: Domain) -> AuthResult<Domain> {
        let started = Instant::now();
        let result = self.inner.create_domain(token, domain).await;
        let resource = result.as_ref().map(|d| d.id.as_str()).unwrap_or_default();
        observe("create_domain", resource, started, &result);
        result
    }

    async fn retrieve_domain(&self, token: &str, id: &str) -> AuthResult<Domain> {
        let started = Instant::now();
        let result = self.inner.retrieve_domain(token, id).await;
        observe("retrieve_domain", id, started, &result);
        result
    }

    async fn retrieve_domain_permissions(
        &self,
        token: &str,
        id: &str,
    ) -> AuthResult<Vec<Permission>> {
        let started = Instant::now();
        let result = self.inner.retrieve_domain_permissions(token, id).await;
        observe("retrieve_domain_permissions", id, started, &result);
        result
    }

    async fn update_domain(&self, token: &str, id: &str, req: DomainReq) -> AuthResult<Domain> {
        let started = Instant::now();
        let result = self.inner.update_domain(token, id, req).await;
        observe("update_domain", id, started, &result);
        result
    }

    async fn change_domain_status(
        &self,
        token: &str,
        id: &str,
        status: DomainStatus,
    ) -> AuthResult<Domain> {
        let started = Instant::now();
        let result = self.inner.change_domain_status(token, id, status).await;
        observe("change_domain_status", id, started, &result);
        result
    }

    async fn list_domains(&self, token: &str, page: DomainPage) -> AuthResult<DomainsPage> {
        let started = Instant::now();
        let result = self.inner.list_domains(token, page).await;
        observe("list_domains", "", started, &result);
        result
    }

    async fn assign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()> {
        let started = Instant::now();
        let result = self
            .inner
            .assign_users(token, domain_id, user_ids, relation)
            .await;
        observe("assign_users", domain_id, started, &result);
        result
    }

    async fn unassign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()> {
        let started = Instant::now();
        let result = self
            .inner
            .unassign_users(token, domain_id, user_ids, relation)
            .await;
        observe("unassign_users", domain_id, started, &result);
        result
    }

    async fn list_user_domains(
        &self,
        token: &str,
        user_id: &str,
        page: DomainPage,
    ) -> AuthResult<DomainsPage> {
        let started = Instant::now();
        let result = self.inner.list_user_domains(token, user_id, page).await;
        observe("list_user_domains", user_id, started, &result);
        result
    }
}

pub struct LoggingGroupService<S> {
    inner: S,
}

impl<S> LoggingGroupService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: GroupService> GroupService for LoggingGroupService<S> {
    async fn create_group(&self, token: &str, group: Group) -> AuthResult<Group> {
        let started = Instant::now();
        let result = self.inner.create_group(token, group).await;
        let resource = result.as_ref().map(|g| g.id.as_str()).unwrap_or_default();
        observe("create_group", resource, started, &result);
        result
    }

    async fn update_group(&self, token: &str, id: &str, req: GroupReq) -> AuthResult<Group> {
        let started = Instant::now();
        let result = self.inner.update_group(token, id, req).await;
        observe("update_group", id, started, &result);
        result
    }

    async fn view_group(&self, token: &str, id: &str) -> AuthResult<Group> {
        let started = Instant::now();
        let result = self.inner.view_group(token, id).await;
        observe("view_group", id, started, &result);
        result
    }

    async fn list_groups(&self, token: &str, page: GroupPage) -> AuthResult<GroupsPage> {
        let started = Instant::now();
        let result = self.inner.list_groups(token, page).await;
        observe("list_groups", "", started, &result);
        result
    }

    async fn list_parents(&self, token: &str, id: &str, level: usize) -> AuthResult<Vec<Group>> {
        let started = Instant::now();
        let result = self.inner.list_parents(token, id, level).await;
        observe("list_parents", id, started, &result);
        result
    }

    async fn list_children(&self, token: &str, id: &str, level: usize) -> AuthResult<Vec<Group>> {
        let started = Instant::now();
        let result = self.inner.list_children(token, id, level).await;
        observe("list_children", id, started, &result);
        result
    }

    async fn list_members(
        &self,
        token: &str,
        group_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self
            .inner
            .list_members(token, group_id, kind, page_token, limit)
            .await;
        observe("list_members", group_id, started, &result);
        result
    }

    async fn list_memberships(
        &self,
        token: &str,
        member_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let started = Instant::now();
        let result = self
            .inner
            .list_memberships(token, member_id, kind, page_token, limit)
            .await;
        observe("list_memberships", member_id, started, &result);
        result
    }

    async fn assign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()> {
        let started = Instant::now();
        let result = self
            .inner
            .assign(token, group_id, relation, kind, member_ids)
            .await;
        observe("assign", group_id, started, &result);
        result
    }

    async fn unassign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()> {
        let started = Instant::now();
        let result = self
            .inner
            .unassign(token, group_id, relation, kind, member_ids)
            .await;
        observe("unassign", group_id, started, &result);
        result
    }

    async fn remove_group(&self, token: &str, id: &str) -> AuthResult<()> {
        let started = Instant::now();
        let result = self.inner.remove_group(token, id).await;
        observe("remove_group", id, started, &result);
        result
    }
}
