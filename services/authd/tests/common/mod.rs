#![allow(dead_code)]

use authd::app::{AppState, build_state_with_clock};
use authd::auth::ManualClock;
use authd::config::AuthConfig;
use authd::model::{Domain, Group, KeyRequest, KeyType};
use authd::service::TokenTtls;
use std::sync::Arc;

pub const NOW: i64 = 1_700_000_000;
pub const ADMIN: &str = "root";

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub state: AppState,
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        bind_addr: "127.0.0.1:0".parse().expect("bind"),
        metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
        issuer: "tessera".to_string(),
        ttls: TokenTtls::default(),
        clock_leeway_secs: 0,
        signing_key: Some("2a".repeat(32)),
        list_all_limit: 100,
        admin_id: Some(ADMIN.to_string()),
    }
}

pub async fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let state = build_state_with_clock(&test_config(), clock.clone())
        .await
        .expect("state");
    Harness { clock, state }
}

impl Harness {
    /// Access token for `user` through the trusted login path.
    pub async fn login(&self, user: &str) -> String {
        self.state
            .auth
            .issue("", KeyRequest::new(KeyType::Access, user))
            .await
            .expect("login")
            .access_token
    }

    pub async fn create_domain(&self, token: &str, name: &str) -> Domain {
        self.state
            .domains
            .create_domain(
                token,
                Domain {
                    name: name.to_string(),
                    ..Domain::default()
                },
            )
            .await
            .expect("create domain")
    }

    pub async fn create_group(
        &self,
        token: &str,
        name: &str,
        parent_id: Option<&str>,
        domain_id: Option<&str>,
    ) -> Group {
        self.state
            .groups
            .create_group(token, new_group(name, parent_id, domain_id))
            .await
            .expect("create group")
    }
}

pub fn new_group(name: &str, parent_id: Option<&str>, domain_id: Option<&str>) -> Group {
    Group {
        name: name.to_string(),
        parent_id: parent_id.map(str::to_string),
        domain_id: domain_id.map(str::to_string),
        ..Group::default()
    }
}

pub fn ids(groups: &[Group]) -> Vec<String> {
    groups.iter().map(|group| group.id.clone()).collect()
}
