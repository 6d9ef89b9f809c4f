//! Tenant domains.
//!
//! # Key invariants
//! - A domain record never exists without its owner and platform tuples.
//!   Creation writes the tuples first and removes them if the record cannot
//!   be saved.
//! - Status only changes through [`DomainService::change_domain_status`], which
//!   skips the domain gate so a disabled domain can be re-enabled.
//! - Entering or leaving `Freeze` needs a platform administrator; ordinary
//!   domain administrators can only toggle Enabled and Disabled.
use crate::auth::Clock;
use crate::error::{AuthError, AuthResult};
use crate::model::{Domain, DomainPage, DomainReq, DomainStatus, DomainsPage};
use crate::service::{
    AuthService, DomainService, PLATFORM_ID, identify_principal, is_platform_admin,
    require_non_empty,
};
use crate::store::DomainRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_authz::{EntityType, Permission, PolicyReq, Relation};

/// Permissions reported by `retrieve_domain_permissions`.
const DOMAIN_PERMISSIONS: [Permission; 4] = [
    Permission::Admin,
    Permission::Edit,
    Permission::View,
    Permission::Membership,
];

pub struct CoreDomainService {
    auth: Arc<dyn AuthService>,
    domains: Arc<dyn DomainRepository>,
    clock: Arc<dyn Clock>,
}

impl CoreDomainService {
    pub fn new(
        auth: Arc<dyn AuthService>,
        domains: Arc<dyn DomainRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth,
            domains,
            clock,
        }
    }

    async fn principal(&self, token: &str) -> AuthResult<String> {
        identify_principal(self.auth.as_ref(), token).await
    }

    /// Check `permission` on the domain without the status gate.
    async fn require(&self, user: &str, id: &str, permission: Permission) -> AuthResult<()> {
        self.auth
            .authorize(&PolicyReq::user(user, EntityType::Domain, id).with_permission(permission))
            .await
    }

    /// Check `permission` on the domain, failing if the domain is not enabled.
    async fn require_active(&self, user: &str, id: &str, permission: Permission) -> AuthResult<()> {
        self.auth
            .authorize(
                &PolicyReq::user(user, EntityType::Domain, id)
                    .with_permission(permission)
                    .in_domain(id),
            )
            .await
    }

    async fn require_platform_admin(&self, user: &str) -> AuthResult<()> {
        if is_platform_admin(self.auth.as_ref(), user).await? {
            Ok(())
        } else {
            Err(AuthError::denied())
        }
    }

    /// Domains where `user` holds `membership`, restricted to what `page`
    /// already asks for.
    async fn member_domains(&self, user: &str, mut page: DomainPage) -> AuthResult<DomainsPage> {
        let ids = self
            .auth
            .list_all_objects(
                &PolicyReq::user(user, EntityType::Domain, "")
                    .with_permission(Permission::Membership),
            )
            .await?
            .policies;
        let ids = match page.ids.take() {
            Some(wanted) => ids.into_iter().filter(|id| wanted.contains(id)).collect(),
            None => ids,
        };
        if ids.is_empty() {
            return Ok(DomainsPage {
                total: 0,
                offset: page.offset,
                limit: page.limit,
                domains: Vec::new(),
            });
        }
        page.ids = Some(ids);
        Ok(self.domains.retrieve_all(&page).await?)
    }

    fn user_policies(domain_id: &str, user_ids: &[String], relation: Relation) -> AuthResult<Vec<PolicyReq>> {
        if user_ids.is_empty() {
            return Err(AuthError::malformed("no users provided"));
        }
        for user_id in user_ids {
            require_non_empty(user_id, "user id")?;
        }
        Ok(user_ids
            .iter()
            .map(|user_id| {
                PolicyReq::user(user_id.as_str(), EntityType::Domain, domain_id).with_relation(relation)
            })
            .collect())
    }

    /// Validate a role change and check the requester may delegate it.
    async fn authorize_delegation(
        &self,
        user: &str,
        domain_id: &str,
        relation: Relation,
    ) -> AuthResult<()> {
        let Some(needed) = relation.delegation_permission() else {
            return Err(AuthError::malformed(format!(
                "relation {relation} cannot be assigned to users"
            )));
        };
        self.require_active(user, domain_id, Permission::Share).await?;
        self.require_active(user, domain_id, needed).await
    }
}

#[async_trait]
impl DomainService for CoreDomainService {
    async fn create_domain(&self, token: &str, mut domain: Domain) -> AuthResult<Domain> {
        let user = self.principal(token).await?;
        require_non_empty(&domain.name, "domain name")?;
        if matches!(domain.status, DomainStatus::Freeze | DomainStatus::All) {
            return Err(AuthError::malformed(format!(
                "domain cannot be created {}",
                domain.status
            )));
        }
        domain.id = uuid::Uuid::new_v4().to_string();
        domain.owner = user.clone();
        domain.permissions.clear();
        domain.created_at = self.clock.now();
        domain.updated_by.clear();
        domain.updated_at = 0;

        // Step 1: Owner and platform tuples first; a record without them
        // would be unreachable.
        let policies = vec![
            PolicyReq::user(user.as_str(), EntityType::Domain, domain.id.as_str())
                .with_relation(Relation::Administrator),
            PolicyReq::new(
                EntityType::Platform,
                PLATFORM_ID,
                EntityType::Domain,
                domain.id.as_str(),
            )
            .with_relation(Relation::Platform),
        ];
        self.auth.add_policies(&policies).await?;

        // Step 2: The record. On failure the tuples are rolled back.
        match self.domains.save(domain).await {
            Ok(saved) => Ok(saved),
            Err(err) => {
                if let Err(rollback) = self.auth.delete_policies(&policies).await {
                    tracing::error!(
                        error = ?rollback,
                        domain_id = %policies[0].object,
                        "failed to roll back domain policies"
                    );
                }
                Err(err.into())
            }
        }
    }

    async fn retrieve_domain(&self, token: &str, id: &str) -> AuthResult<Domain> {
        let user = self.principal(token).await?;
        self.require(&user, id, Permission::Membership).await?;
        Ok(self.domains.retrieve_by_id(id).await?)
    }

    async fn retrieve_domain_permissions(
        &self,
        token: &str,
        id: &str,
    ) -> AuthResult<Vec<Permission>> {
        let user = self.principal(token).await?;
        self.require(&user, id, Permission::Membership).await?;
        self.auth
            .list_permissions(
                &PolicyReq::user(user.as_str(), EntityType::Domain, id),
                &DOMAIN_PERMISSIONS,
            )
            .await
    }

    async fn update_domain(&self, token: &str, id: &str, req: DomainReq) -> AuthResult<Domain> {
        let user = self.principal(token).await?;
        if req.status.is_some() {
            return Err(AuthError::malformed(
                "status is changed through change_domain_status",
            ));
        }
        if req.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AuthError::malformed("empty domain name"));
        }
        self.require_active(&user, id, Permission::Admin).await?;
        Ok(self
            .domains
            .update(id, &user, &req, self.clock.now())
            .await?)
    }

    async fn change_domain_status(
        &self,
        token: &str,
        id: &str,
        status: DomainStatus,
    ) -> AuthResult<Domain> {
        let user = self.principal(token).await?;
        if status == DomainStatus::All {
            return Err(AuthError::malformed("all is not a domain status"));
        }
        self.require(&user, id, Permission::Admin).await?;
        let current = self.domains.retrieve_by_id(id).await?;
        let touches_freeze = current.status == DomainStatus::Freeze || status == DomainStatus::Freeze;
        if touches_freeze && current.status != status {
            self.require_platform_admin(&user).await?;
        }
        let req = DomainReq {
            status: Some(status),
            ..DomainReq::default()
        };
        Ok(self
            .domains
            .update(id, &user, &req, self.clock.now())
            .await?)
    }

    async fn list_domains(&self, token: &str, page: DomainPage) -> AuthResult<DomainsPage> {
        let user = self.principal(token).await?;
        if is_platform_admin(self.auth.as_ref(), &user).await? {
            return Ok(self.domains.retrieve_all(&page).await?);
        }
        self.member_domains(&user, page).await
    }

    async fn assign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()> {
        let user = self.principal(token).await?;
        let policies = Self::user_policies(domain_id, user_ids, relation)?;
        self.authorize_delegation(&user, domain_id, relation).await?;
        self.auth.add_policies(&policies).await
    }

    async fn unassign_users(
        &self,
        token: &str,
        domain_id: &str,
        user_ids: &[String],
        relation: Relation,
    ) -> AuthResult<()> {
        let user = self.principal(token).await?;
        let policies = Self::user_policies(domain_id, user_ids, relation)?;
        self.authorize_delegation(&user, domain_id, relation).await?;
        self.auth.delete_policies(&policies).await
    }

    async fn list_user_domains(
        &self,
        token: &str,
        user_id: &str,
        page: DomainPage,
    ) -> AuthResult<DomainsPage> {
        let user = self.principal(token).await?;
        require_non_empty(user_id, "user id")?;
        if user != user_id {
            self.require_platform_admin(&user).await?;
        }
        self.member_domains(user_id, page).await
    }
}
