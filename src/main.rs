use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("build log filter")?;
    fmt().with_env_filter(filter).init();

    let config = gatekeep::config::GatekeepConfig::from_env().context("load configuration")?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "gatekeep starting: RUST_LOG='{}', bind={}, token_ttl_secs={}, leeway_secs={}, seed_admin={}",
        rust_log,
        config.bind_addr,
        config.token_ttl.as_secs(),
        config.token_leeway_secs,
        config.seed_admin.is_some()
    );

    gatekeep::server::run(config).await
}
