//! Tessera auth service entry point.
//!
//! # Purpose
//! Loads configuration, wires the service stack, and serves the health and
//! metrics endpoints until shutdown.
use authd::app::{build_router, build_state};
use authd::config::AuthConfig;
use authd::observability;
use std::future::Future;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AuthConfig::from_env_or_yaml().expect("auth config");
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: AuthConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("tessera-authd");
    let state = build_state(&config).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, issuer = %config.issuer, "auth service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use authd::service::TokenTtls;
    use serial_test::serial;
    use std::time::Duration;

    fn test_config() -> AuthConfig {
        AuthConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            issuer: "tessera".to_string(),
            ttls: TokenTtls::default(),
            clock_leeway_secs: 0,
            signing_key: None,
            list_all_limit: 100,
            admin_id: Some("root".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn run_with_shutdown_exits_on_signal() {
        run_with_shutdown(test_config(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await
        .expect("run");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn run_with_shutdown_reports_bind_failure() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let mut config = test_config();
        config.bind_addr = taken.local_addr().expect("addr");
        let result = run_with_shutdown(config, std::future::pending()).await;
        assert!(result.is_err());
    }
}
