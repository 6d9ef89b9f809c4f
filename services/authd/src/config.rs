use crate::service::TokenTtls;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use tessera_authz::DEFAULT_LIST_ALL_LIMIT;

// Auth service configuration sourced from environment variables.
#[derive(Clone)]
pub struct AuthConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub issuer: String,
    pub ttls: TokenTtls,
    pub clock_leeway_secs: u64,
    /// Hex-encoded Ed25519 seed; `None` means generate an ephemeral key.
    pub signing_key: Option<String>,
    pub list_all_limit: usize,
    /// Principal seeded as platform administrator at startup.
    pub admin_id: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bind_addr", &self.bind_addr)
            .field("metrics_bind", &self.metrics_bind)
            .field("issuer", &self.issuer)
            .field("ttls", &self.ttls)
            .field("clock_leeway_secs", &self.clock_leeway_secs)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("list_all_limit", &self.list_all_limit)
            .field("admin_id", &self.admin_id)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    issuer: Option<String>,
    access_ttl_secs: Option<i64>,
    refresh_ttl_secs: Option<i64>,
    max_token_ttl_secs: Option<i64>,
    recovery_ttl_secs: Option<i64>,
    clock_leeway_secs: Option<u64>,
    signing_key: Option<String>,
    list_all_limit: Option<usize>,
    admin_id: Option<String>,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = TokenTtls::default();
        let config = Self {
            bind_addr: env_or("TESSERA_BIND", "0.0.0.0:8190".parse()?)?,
            metrics_bind: env_or("TESSERA_METRICS_BIND", "0.0.0.0:8191".parse()?)?,
            issuer: std::env::var("TESSERA_ISSUER").unwrap_or_else(|_| "tessera".to_string()),
            ttls: TokenTtls {
                access: env_or("TESSERA_ACCESS_TTL_SECS", defaults.access)?,
                refresh: env_or("TESSERA_REFRESH_TTL_SECS", defaults.refresh)?,
                max: env_or("TESSERA_MAX_TOKEN_TTL_SECS", defaults.max)?,
                recovery: env_or("TESSERA_RECOVERY_TTL_SECS", defaults.recovery)?,
            },
            clock_leeway_secs: env_or("TESSERA_CLOCK_LEEWAY_SECS", 0)?,
            signing_key: env_opt("TESSERA_SIGNING_KEY"),
            list_all_limit: env_or("TESSERA_LIST_ALL_LIMIT", DEFAULT_LIST_ALL_LIMIT)?,
            admin_id: env_opt("TESSERA_ADMIN_ID"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TESSERA_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TESSERA_CONFIG: {path}"))?;
            let override_cfg: AuthConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse auth config yaml")?;
            config.apply(override_cfg)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply(&mut self, override_cfg: AuthConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.issuer {
            self.issuer = value;
        }
        if let Some(value) = override_cfg.access_ttl_secs {
            self.ttls.access = value;
        }
        if let Some(value) = override_cfg.refresh_ttl_secs {
            self.ttls.refresh = value;
        }
        if let Some(value) = override_cfg.max_token_ttl_secs {
            self.ttls.max = value;
        }
        if let Some(value) = override_cfg.recovery_ttl_secs {
            self.ttls.recovery = value;
        }
        if let Some(value) = override_cfg.clock_leeway_secs {
            self.clock_leeway_secs = value;
        }
        if let Some(value) = override_cfg.signing_key {
            self.signing_key = Some(value);
        }
        if let Some(value) = override_cfg.list_all_limit {
            self.list_all_limit = value;
        }
        if let Some(value) = override_cfg.admin_id {
            self.admin_id = Some(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            bail!("issuer must not be empty");
        }
        let ttls = [
            ("access", self.ttls.access),
            ("refresh", self.ttls.refresh),
            ("max token", self.ttls.max),
            ("recovery", self.ttls.recovery),
        ];
        for (name, secs) in ttls {
            if secs <= 0 {
                bail!("{name} ttl must be positive, got {secs}");
            }
        }
        if self.list_all_limit == 0 {
            bail!("list-all limit must be positive");
        }
        Ok(())
    }
}
