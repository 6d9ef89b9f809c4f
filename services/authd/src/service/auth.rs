//! Credential lifecycle and policy entry point.
//!
//! # Purpose
//! [`CoreAuthService`] issues and identifies tokens, keeps the records of
//! Recovery and API keys, and fronts the [`PolicyAgent`] with the domain
//! status gate.
//!
//! # Key invariants
//! - Access and Refresh keys are stateless; verifying the signature and
//!   expiry is enough.
//! - A Recovery or API token is only as good as its stored record. Revoking
//!   the record kills the token even if its signature is still valid.
//! - An API key found expired at identify time has its record removed.
//! - `authorize` never grants on error: unknown domains and backend failures
//!   are denials.
use crate::auth::{TokenError, Tokenizer};
use crate::error::{AuthError, AuthResult};
use crate::model::{DomainStatus, IssuedToken, Key, KeyRequest, KeyType};
use crate::service::{AuthService, platform_admin_req, require_non_empty};
use crate::store::{DomainRepository, KeyRepository, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_authz::{
    Permission, PolicyAgent, PolicyError, PolicyPage, PolicyReq, RelationQuery, RelationsPage,
    SubjectKind,
};

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: i64,
    pub refresh: i64,
    /// Upper bound on Access and Refresh lifetimes.
    pub max: i64,
    pub recovery: i64,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: 60 * 60,
            refresh: 24 * 60 * 60,
            max: 24 * 60 * 60,
            recovery: 5 * 60,
        }
    }
}

pub struct CoreAuthService {
    keys: Arc<dyn KeyRepository>,
    domains: Arc<dyn DomainRepository>,
    agent: PolicyAgent,
    tokenizer: Arc<Tokenizer>,
    ttls: TokenTtls,
}

impl CoreAuthService {
    pub fn new(
        keys: Arc<dyn KeyRepository>,
        domains: Arc<dyn DomainRepository>,
        agent: PolicyAgent,
        tokenizer: Arc<Tokenizer>,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            keys,
            domains,
            agent,
            tokenizer,
            ttls,
        }
    }

    fn now(&self) -> i64 {
        self.tokenizer.now()
    }

    /// An in-range Access expiry: defaulted, then clamped to the maximum.
    fn access_expiry(&self, requested: Option<i64>) -> AuthResult<i64> {
        let now = self.now();
        let latest = now + self.ttls.max;
        match requested {
            None => Ok((now + self.ttls.access).min(latest)),
            Some(exp) if exp <= now => Err(AuthError::malformed("expiry must be in the future")),
            Some(exp) => Ok(exp.min(latest)),
        }
    }

    fn stateless_key(&self, key_type: KeyType, issuer_id: &str, subject: &str, exp: i64) -> Key {
        Key {
            id: String::new(),
            key_type,
            issuer_id: issuer_id.to_string(),
            subject: subject.to_string(),
            issued_at: self.now(),
            expires_at: Some(exp),
        }
    }

    fn token_pair(&self, issuer_id: &str, subject: &str, access_exp: i64) -> AuthResult<IssuedToken> {
        let refresh_exp = self.now() + self.ttls.refresh.min(self.ttls.max);
        let access = self.stateless_key(KeyType::Access, issuer_id, subject, access_exp);
        let refresh = self.stateless_key(KeyType::Refresh, issuer_id, subject, refresh_exp);
        Ok(IssuedToken::bearer(
            self.tokenizer.issue(&access)?,
            Some(self.tokenizer.issue(&refresh)?),
        ))
    }

    async fn persist_and_sign(&self, key: Key) -> AuthResult<IssuedToken> {
        let token = self.tokenizer.issue(&key)?;
        self.keys.save(key).await?;
        Ok(IssuedToken::bearer(token, None))
    }

    async fn issue_access(&self, token: &str, req: KeyRequest) -> AuthResult<IssuedToken> {
        let exp = self.access_expiry(req.expires_at)?;
        if token.is_empty() {
            // Trusted login path: the caller has already verified credentials.
            require_non_empty(&req.subject, "subject")?;
            return self.token_pair(&req.subject, &req.subject, exp);
        }
        let requester = self.identify_typed(token, KeyType::Access).await?;
        if !req.subject.is_empty() && req.subject != requester.subject {
            return Err(AuthError::denied());
        }
        self.token_pair(&requester.subject, &requester.subject, exp)
    }

    async fn issue_refresh(&self, token: &str) -> AuthResult<IssuedToken> {
        let requester = self.identify_typed(token, KeyType::Refresh).await?;
        let exp = self.access_expiry(None)?;
        self.token_pair(&requester.issuer_id, &requester.subject, exp)
    }

    async fn issue_recovery(&self, req: KeyRequest) -> AuthResult<IssuedToken> {
        require_non_empty(&req.subject, "subject")?;
        let now = self.now();
        let key = Key {
            id: uuid::Uuid::new_v4().to_string(),
            key_type: KeyType::Recovery,
            issuer_id: req.subject.clone(),
            subject: req.subject,
            issued_at: now,
            expires_at: Some(now + self.ttls.recovery),
        };
        self.persist_and_sign(key).await
    }

    async fn issue_api(&self, token: &str, req: KeyRequest) -> AuthResult<IssuedToken> {
        let requester = self.identify_typed(token, KeyType::Access).await?;
        let now = self.now();
        if req.expires_at.is_some_and(|exp| exp <= now) {
            return Err(AuthError::malformed("expiry must be in the future"));
        }
        let subject = if req.subject.is_empty() {
            requester.subject.clone()
        } else {
            req.subject
        };
        let key = Key {
            id: uuid::Uuid::new_v4().to_string(),
            key_type: KeyType::Api,
            issuer_id: requester.subject,
            subject,
            issued_at: now,
            expires_at: req.expires_at,
        };
        self.persist_and_sign(key).await
    }

    /// Identify a token that must be of exactly `expected` type.
    async fn identify_typed(&self, token: &str, expected: KeyType) -> AuthResult<Key> {
        if token.is_empty() {
            return Err(AuthError::unauthenticated());
        }
        let key = self.identify(token).await?;
        if key.key_type != expected {
            return Err(AuthError::unauthenticated());
        }
        Ok(key)
    }

    /// Principal behind a requester token used for key management.
    async fn requester(&self, token: &str) -> AuthResult<String> {
        let key = self.identify(token).await?;
        match key.key_type {
            KeyType::Access | KeyType::Api => Ok(key.subject),
            KeyType::Refresh | KeyType::Recovery => Err(AuthError::unauthenticated()),
        }
    }

    /// The stored key, if `requester` may manage it.
    async fn managed_key(&self, token: &str, id: &str) -> AuthResult<Key> {
        let requester = self.requester(token).await?;
        let key = self.keys.retrieve(id).await.map_err(key_not_found)?;
        if requester == key.subject || requester == key.issuer_id {
            return Ok(key);
        }
        match self.agent.check_policy(&platform_admin_req(&requester)).await {
            Ok(()) => Ok(key),
            Err(PolicyError::Authorization(_)) => Err(AuthError::denied()),
            Err(err) => Err(err.into()),
        }
    }

    async fn expire_api_key(&self, id: &str) {
        if let Err(err) = self.keys.remove(id).await
            && !matches!(err, StoreError::NotFound(_))
        {
            tracing::warn!(error = %err, key_id = id, "failed to remove expired api key");
        }
    }

    async fn check_domain_active(&self, domain_id: &str) -> AuthResult<()> {
        let domain = match self.domains.retrieve_by_id(domain_id).await {
            Ok(domain) => domain,
            Err(StoreError::NotFound(_)) => return Err(AuthError::denied()),
            Err(err) => return Err(err.into()),
        };
        match domain.status {
            DomainStatus::Enabled => Ok(()),
            _ => Err(AuthError::DomainNotActive),
        }
    }
}

fn key_not_found(err: StoreError) -> AuthError {
    match err {
        StoreError::NotFound(_) => AuthError::KeyNotFound,
        other => other.into(),
    }
}

#[async_trait]
impl AuthService for CoreAuthService {
    async fn issue(&self, token: &str, req: KeyRequest) -> AuthResult<IssuedToken> {
        match req.key_type {
            KeyType::Access => self.issue_access(token, req).await,
            KeyType::Refresh => self.issue_refresh(token).await,
            KeyType::Recovery => self.issue_recovery(req).await,
            KeyType::Api => self.issue_api(token, req).await,
        }
    }

    async fn revoke(&self, token: &str, id: &str) -> AuthResult<()> {
        self.managed_key(token, id).await?;
        self.keys.remove(id).await.map_err(key_not_found)
    }

    async fn retrieve_key(&self, token: &str, id: &str) -> AuthResult<Key> {
        self.managed_key(token, id).await
    }

    async fn identify(&self, token: &str) -> AuthResult<Key> {
        let key = match self.tokenizer.parse(token) {
            Ok(key) => key,
            Err(TokenError::Expired(key)) => {
                if key.key_type == KeyType::Api && !key.id.is_empty() {
                    self.expire_api_key(&key.id).await;
                }
                return Err(AuthError::Expired);
            }
            Err(err) => return Err(err.into()),
        };
        match key.key_type {
            KeyType::Access | KeyType::Refresh => Ok(key),
            KeyType::Recovery => {
                let stored = self.keys.retrieve(&key.id).await.map_err(key_not_found)?;
                if stored.key_type != KeyType::Recovery || stored.subject != key.subject {
                    return Err(AuthError::KeyNotFound);
                }
                Ok(stored)
            }
            KeyType::Api => {
                let stored = self.keys.retrieve(&key.id).await.map_err(key_not_found)?;
                if stored.key_type != KeyType::Api || stored.subject != key.subject {
                    return Err(AuthError::KeyNotFound);
                }
                if stored.is_expired(self.now()) {
                    self.expire_api_key(&stored.id).await;
                    return Err(AuthError::Expired);
                }
                Ok(stored)
            }
        }
    }

    async fn authorize(&self, req: &PolicyReq) -> AuthResult<()> {
        let mut req = req.clone();
        if req.subject_kind == SubjectKind::Token {
            req.subject = self.requester(&req.subject).await?;
            req.subject_kind = SubjectKind::Users;
        }
        if let Some(domain_id) = req.domain.as_deref() {
            self.check_domain_active(domain_id).await?;
        }
        Ok(self.agent.check_policy(&req).await?)
    }

    async fn add_policy(&self, req: &PolicyReq) -> AuthResult<()> {
        Ok(self.agent.add_policy(req).await?)
    }

    async fn add_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()> {
        Ok(self.agent.add_policies(reqs).await?)
    }

    async fn delete_policy(&self, req: &PolicyReq) -> AuthResult<()> {
        Ok(self.agent.delete_policy(req).await?)
    }

    async fn delete_policies(&self, reqs: &[PolicyReq]) -> AuthResult<()> {
        Ok(self.agent.delete_policies(reqs).await?)
    }

    async fn list_objects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        Ok(self.agent.list_objects(req, page_token, limit).await?)
    }

    async fn list_all_objects(&self, req: &PolicyReq) -> AuthResult<PolicyPage> {
        Ok(self.agent.list_all_objects(req).await?)
    }

    async fn count_objects(&self, req: &PolicyReq) -> AuthResult<u64> {
        Ok(self.agent.count_objects(req).await?)
    }

    async fn list_subjects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        Ok(self.agent.list_subjects(req, page_token, limit).await?)
    }

    async fn list_all_subjects(&self, req: &PolicyReq) -> AuthResult<PolicyPage> {
        Ok(self.agent.list_all_subjects(req).await?)
    }

    async fn count_subjects(&self, req: &PolicyReq) -> AuthResult<u64> {
        Ok(self.agent.count_subjects(req).await?)
    }

    async fn list_permissions(
        &self,
        req: &PolicyReq,
        permissions: &[Permission],
    ) -> AuthResult<Vec<Permission>> {
        Ok(self.agent.list_permissions(req, permissions).await?)
    }

    async fn read_relations(
        &self,
        query: &RelationQuery,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<RelationsPage> {
        Ok(self.agent.read_relations(query, page_token, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ManualClock, SigningKey};
    use crate::model::Domain;
    use crate::store::memory::InMemoryStore;
    use tessera_authz::{EntityType, InMemoryTupleStore, Relation};

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryStore>,
        service: CoreAuthService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(InMemoryStore::new());
        let tokenizer = Tokenizer::new(
            SigningKey::from_seed("k1", [5u8; 32]),
            "tessera",
            0,
            clock.clone(),
        )
        .expect("tokenizer");
        let service = CoreAuthService::new(
            store.clone(),
            store.clone(),
            PolicyAgent::new(Arc::new(InMemoryTupleStore::new())),
            Arc::new(tokenizer),
            TokenTtls::default(),
        );
        Fixture {
            clock,
            store,
            service,
        }
    }

    async fn login(service: &CoreAuthService, user: &str) -> String {
        service
            .issue("", KeyRequest::new(KeyType::Access, user))
            .await
            .expect("login")
            .access_token
    }

    #[tokio::test]
    async fn login_returns_access_and_refresh() {
        let f = fixture();
        let issued = f
            .service
            .issue("", KeyRequest::new(KeyType::Access, "u1"))
            .await
            .expect("login");
        assert_eq!(issued.access_type, "Bearer");
        let refresh = issued.refresh_token.expect("refresh token");

        let key = f.service.identify(&issued.access_token).await.expect("identify");
        assert_eq!(key.key_type, KeyType::Access);
        assert_eq!(key.subject, "u1");
        assert_eq!(key.expires_at, Some(NOW + 3600));

        let renewed = f
            .service
            .issue(&refresh, KeyRequest::new(KeyType::Refresh, ""))
            .await
            .expect("refresh");
        assert!(renewed.refresh_token.is_some());

        // An access token cannot refresh.
        assert!(matches!(
            f.service
                .issue(&issued.access_token, KeyRequest::new(KeyType::Refresh, ""))
                .await,
            Err(AuthError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn access_expiry_is_clamped_and_subject_bound() {
        let f = fixture();
        let token = login(&f.service, "u1").await;
        let issued = f
            .service
            .issue(
                &token,
                KeyRequest::new(KeyType::Access, "u1").expires_at(NOW + 365 * 24 * 3600),
            )
            .await
            .expect("reissue");
        let key = f.service.identify(&issued.access_token).await.expect("identify");
        assert_eq!(key.expires_at, Some(NOW + 24 * 3600));

        assert!(matches!(
            f.service
                .issue(&token, KeyRequest::new(KeyType::Access, "u2"))
                .await,
            Err(AuthError::Authorization(_))
        ));
        assert!(matches!(
            f.service.issue("", KeyRequest::new(KeyType::Access, "")).await,
            Err(AuthError::MalformedEntity(_))
        ));
    }

    #[tokio::test]
    async fn recovery_key_is_single_use_per_subject() {
        let f = fixture();
        let first = f
            .service
            .issue("", KeyRequest::new(KeyType::Recovery, "u1"))
            .await
            .expect("first")
            .access_token;
        let second = f
            .service
            .issue("", KeyRequest::new(KeyType::Recovery, "u1"))
            .await
            .expect("second")
            .access_token;

        assert!(matches!(
            f.service.identify(&first).await,
            Err(AuthError::KeyNotFound)
        ));
        let key = f.service.identify(&second).await.expect("current");
        assert_eq!(key.key_type, KeyType::Recovery);

        f.clock.advance(5 * 60 + 1);
        assert!(matches!(
            f.service.identify(&second).await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn expired_api_key_record_is_removed() {
        let f = fixture();
        let token = login(&f.service, "u1").await;
        let api = f
            .service
            .issue(
                &token,
                KeyRequest::new(KeyType::Api, "").expires_at(NOW + 60),
            )
            .await
            .expect("api key")
            .access_token;
        let key = f.service.identify(&api).await.expect("identify");
        assert_eq!(key.issuer_id, "u1");
        f.store.retrieve(&key.id).await.expect("stored");

        f.clock.advance(61);
        assert!(matches!(f.service.identify(&api).await, Err(AuthError::Expired)));
        assert!(matches!(
            f.store.retrieve(&key.id).await,
            Err(StoreError::NotFound(_))
        ));

        assert!(matches!(
            f.service
                .issue(&token, KeyRequest::new(KeyType::Api, "").expires_at(NOW))
                .await,
            Err(AuthError::MalformedEntity(_))
        ));
    }

    #[tokio::test]
    async fn revoke_requires_owner_or_platform_admin() {
        let f = fixture();
        let owner = login(&f.service, "u1").await;
        let stranger = login(&f.service, "u2").await;
        let admin = login(&f.service, "root").await;
        f.service
            .add_policy(
                &PolicyReq::user("root", EntityType::Platform, "platform")
                    .with_relation(Relation::Administrator),
            )
            .await
            .expect("seed admin");

        let mut ids = Vec::new();
        for _ in 0..2 {
            let api = f
                .service
                .issue(&owner, KeyRequest::new(KeyType::Api, ""))
                .await
                .expect("api")
                .access_token;
            ids.push(f.service.identify(&api).await.expect("identify").id);
        }

        assert!(matches!(
            f.service.revoke(&stranger, &ids[0]).await,
            Err(AuthError::Authorization(_))
        ));
        f.service.retrieve_key(&owner, &ids[0]).await.expect("owner reads");
        f.service.revoke(&owner, &ids[0]).await.expect("owner revokes");
        assert!(matches!(
            f.service.revoke(&owner, &ids[0]).await,
            Err(AuthError::KeyNotFound)
        ));
        f.service.revoke(&admin, &ids[1]).await.expect("admin revokes");
    }

    #[tokio::test]
    async fn authorize_resolves_tokens_and_gates_domains() {
        let f = fixture();
        let token = login(&f.service, "u1").await;
        let domain = Domain {
            id: "d1".to_string(),
            name: "Acme".to_string(),
            ..Domain::default()
        };
        crate::store::DomainRepository::save(f.store.as_ref(), domain)
            .await
            .expect("domain");
        f.service
            .add_policy(
                &PolicyReq::user("u1", EntityType::Domain, "d1")
                    .with_relation(Relation::Administrator),
            )
            .await
            .expect("admin tuple");

        let req = PolicyReq::token(token.clone(), EntityType::Domain, "d1")
            .with_permission(Permission::Edit)
            .in_domain("d1");
        f.service.authorize(&req).await.expect("allowed");

        let disable = crate::model::DomainReq {
            status: Some(DomainStatus::Disabled),
            ..Default::default()
        };
        crate::store::DomainRepository::update(f.store.as_ref(), "d1", "u1", &disable, NOW)
            .await
            .expect("disable");
        assert!(matches!(
            f.service.authorize(&req).await,
            Err(AuthError::DomainNotActive)
        ));

        let unknown = PolicyReq::user("u1", EntityType::Domain, "dx")
            .with_permission(Permission::View)
            .in_domain("dx");
        assert!(matches!(
            f.service.authorize(&unknown).await,
            Err(AuthError::Authorization(_))
        ));
    }
}
