//! Service wiring and the health router.
//!
//! # Purpose
//! Builds the service stack from [`AuthConfig`] and exposes the shared state
//! handed to the HTTP layer.
//!
//! # Notes
//! Every service is wrapped in its logging decorator once, here. Domain and
//! group services talk to the decorated auth service, so their inner policy
//! checks are observed too.
use crate::auth::{Clock, SigningKey, SystemClock, Tokenizer, generate_signing_key};
use crate::config::AuthConfig;
use crate::service::{
    AuthService, CoreAuthService, CoreDomainService, CoreGroupService, DomainService,
    GroupService, LoggingAuthService, LoggingDomainService, LoggingGroupService, PLATFORM_ID,
};
use crate::store::memory::InMemoryStore;
use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;
use tessera_authz::{EntityType, InMemoryTupleStore, PolicyAgent, PolicyReq, Relation};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,
    pub domains: Arc<dyn DomainService>,
    pub groups: Arc<dyn GroupService>,
    /// Relation-tuple backend label reported by `/health`.
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    backend: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        backend: state.backend,
    })
}

pub async fn build_state(config: &AuthConfig) -> anyhow::Result<AppState> {
    build_state_with_clock(config, Arc::new(SystemClock)).await
}

/// Wire the in-memory stack around an explicit clock.
pub async fn build_state_with_clock(
    config: &AuthConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AppState> {
    let signing_key = match &config.signing_key {
        Some(seed) => SigningKey::from_seed_hex("primary", seed).context("load signing key")?,
        None => {
            let key = generate_signing_key();
            tracing::warn!(kid = %key.kid, "no signing key configured, using an ephemeral key");
            key
        }
    };
    let tokenizer = Tokenizer::new(
        signing_key,
        config.issuer.clone(),
        config.clock_leeway_secs,
        clock.clone(),
    )
    .context("build tokenizer")?;

    let store = Arc::new(InMemoryStore::new());
    let agent = PolicyAgent::new(Arc::new(InMemoryTupleStore::new()))
        .with_list_all_limit(config.list_all_limit);
    let backend = agent.backend_name();

    let auth: Arc<dyn AuthService> = Arc::new(LoggingAuthService::new(CoreAuthService::new(
        store.clone(),
        store.clone(),
        agent,
        Arc::new(tokenizer),
        config.ttls,
    )));
    let domains: Arc<dyn DomainService> = Arc::new(LoggingDomainService::new(
        CoreDomainService::new(auth.clone(), store.clone(), clock.clone()),
    ));
    let groups: Arc<dyn GroupService> = Arc::new(LoggingGroupService::new(
        CoreGroupService::new(auth.clone(), store, clock),
    ));

    if let Some(admin_id) = &config.admin_id {
        auth.add_policy(
            &PolicyReq::user(admin_id.as_str(), EntityType::Platform, PLATFORM_ID)
                .with_relation(Relation::Administrator),
        )
        .await
        .context("seed platform administrator")?;
        tracing::info!(admin_id = %admin_id, "platform administrator seeded");
    }

    Ok(AppState {
        auth,
        domains,
        groups,
        backend,
    })
}
