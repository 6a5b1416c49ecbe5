use anyhow::Result;
use tou_alert_service::{app, config::AppConfig, metrics_server, observability};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let scheduler = app::build_scheduler(&cfg).await?;
    tracing::info!(
        threshold = cfg.tariff.threshold,
        store = ?cfg.store.kind,
        "background process for TOU rate generation started"
    );

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
