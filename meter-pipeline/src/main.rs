use anyhow::Result;
use meter_pipeline::{
    api::{self, AppState},
    config::AppConfig,
    metrics_server, observability,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    if cfg.cache.enabled {
        tracing::info!(capacity = cfg.cache.capacity, "series cache enabled");
    }

    api::serve(&cfg.server.bind_addr, AppState::from_config(&cfg)).await?;

    Ok(())
}
