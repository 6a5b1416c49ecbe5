use std::sync::Arc;

use anyhow::{bail, Result};
use tou_alert_service::{
    app,
    config::AppConfig,
    notify::{AlertNotifier, NotificationReport},
    observability,
    scheduler::{self, Scheduler, TickRunner},
    store::MemoryRateStore,
};
use tou_client::Category;

/// Logs what would have been alerted instead of contacting anyone.
struct DryRunNotifier;

#[async_trait::async_trait]
impl AlertNotifier for DryRunNotifier {
    async fn notify(&self, category: Category, rate: f64) -> NotificationReport {
        tracing::info!(%category, rate, "dry run: threshold exceeded, alerts not sent");
        NotificationReport::default()
    }
}

/// Fire a single tick immediately, for all configured categories or just one.
///
/// usage: run_tick [CATEGORY] [--dry-run]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut category = None;
    let mut dry_run = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            other if category.is_none() => category = Some(other.parse::<Category>()?),
            other => bail!("unexpected argument '{other}'; usage: run_tick [CATEGORY] [--dry-run]"),
        }
    }

    let cfg = AppConfig::load()?;
    let categories = match category {
        Some(c) => vec![c],
        None => cfg.categories(),
    };

    let scheduler = if dry_run {
        let runner = TickRunner::new(
            app::build_engine(&cfg)?,
            Arc::new(MemoryRateStore::new()),
            Arc::new(DryRunNotifier),
            app::system_clock(&cfg)?,
        )
        .with_threshold(cfg.tariff.threshold);
        Scheduler::new(Arc::new(runner), categories, cfg.schedule.minute)
    } else {
        let runner = app::build_runner(&cfg).await?;
        Scheduler::new(Arc::new(runner), categories, cfg.schedule.minute)
    };

    let results = scheduler::supervise(scheduler.fire_once()).await;
    let mut failed = 0usize;
    for res in &results {
        match res {
            Ok(outcome) => println!(
                "{}\t{:.2}\t{}\t{}",
                outcome.record.category,
                outcome.record.rate,
                outcome.record.level().as_str(),
                outcome
                    .alert
                    .as_ref()
                    .map(|r| format!("alerted {}/{}", r.delivered, r.candidates))
                    .unwrap_or_else(|| "no alert".to_string()),
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} ticks failed", results.len());
    }
    Ok(())
}
