mod handlers;
mod harness;
mod local;
mod routes;
mod sandbox;
#[cfg(test)]
mod sandbox_tests;
mod verdict;

use std::sync::Arc;

use anyhow::bail;
use axum::Router;
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tracing::{info, warn};

use grader_common::config::Config;
use handlers::AppState;
use local::LocalProcessSandbox;
use sandbox::{DockerSandbox, Sandbox};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Grader server booting...");

    let config = Config::from_env();
    if config.admin_token.is_empty() {
        warn!("ADMIN_TOKEN not set; administrative endpoints are disabled");
    }

    // The unsandboxed runner shares memory, filesystem and network with
    // this process; it requires a double opt-in and is never the
    // default.
    let sandbox: Arc<dyn Sandbox> = match config.sandbox.as_str() {
        "docker" => Arc::new(DockerSandbox::new(&config)?),
        "local" if config.allow_unsandboxed => {
            warn!("Running WITHOUT isolation (GRADER_SANDBOX=local); trusted submissions only");
            Arc::new(LocalProcessSandbox::new())
        }
        "local" => {
            bail!("GRADER_SANDBOX=local requires GRADER_ALLOW_UNSANDBOXED=1");
        }
        other => {
            bail!("unknown sandbox mode '{}' (expected 'docker' or 'local')", other);
        }
    };
    info!(sandbox = %config.sandbox, image = %config.grader_image, "Sandbox configured");

    let client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", config.redis_url);

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        redis: redis_conn,
        config,
        sandbox,
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app).await?;
    Ok(())
}
