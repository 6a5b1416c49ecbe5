use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

fn describe() {
    metrics::describe_counter!("tou_ticks_total", "Scheduler ticks started, by category");
    metrics::describe_counter!("tou_rate_fallback_total", "Ticks that used the fallback rate");
    metrics::describe_counter!("tou_store_append_errors_total", "Rate records that failed to persist");
    metrics::describe_counter!("tou_alerts_sent_total", "High-rate alert emails accepted by the mail transport");
    metrics::describe_counter!("tou_alert_delivery_errors_total", "High-rate alert emails that failed to send");
    metrics::describe_counter!(
        "tou_recipient_resolution_errors_total",
        "Subscribers skipped because no contact address resolved"
    );
    metrics::describe_gauge!("tou_rate", "Most recently computed rate, by category");
}

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address '{bind_addr}'"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    // Only the first call installs a recorder; later handles are dropped.
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics endpoint listening");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}
