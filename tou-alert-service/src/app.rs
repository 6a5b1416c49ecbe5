//! Wiring from `AppConfig` to a ready `TickRunner`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{
    clock::{Clock, SystemClock},
    config::{AppConfig, StoreKind},
    engine::RateEngine,
    notify::{AlertNotifier, AlertTemplate, HttpMailTransport, NotificationPipeline, PgUserDirectory},
    scheduler::{Scheduler, TickRunner},
    store::{QuestDbIlpRateStore, QuestDbRateStore, RateStore},
    variation::{RandomSource, SeededRandom, ThreadRandom},
};

pub async fn connect_pool(cfg: &AppConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await
        .context("failed to connect to the document store")
}

pub fn build_engine(cfg: &AppConfig) -> Result<RateEngine> {
    let model = cfg.rate_model()?;
    let random: Arc<dyn RandomSource> = match cfg.tariff.seed {
        Some(seed) => {
            tracing::info!(seed, "using seeded random source");
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };
    Ok(RateEngine::new(Arc::new(model), random).with_fallback_rate(cfg.tariff.fallback_rate))
}

pub fn build_store(cfg: &AppConfig, pool: &PgPool) -> Result<Arc<dyn RateStore>> {
    let store: Arc<dyn RateStore> = match cfg.store.kind {
        StoreKind::Pgwire => Arc::new(QuestDbRateStore::new(pool.clone(), cfg.append_timeout())),
        StoreKind::Ilp => {
            let raw = cfg.store.ilp_tcp_addr.as_deref().unwrap_or_default();
            let addr: SocketAddr = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid store.ilp_tcp_addr '{raw}': {e}"))?;
            Arc::new(QuestDbIlpRateStore::new(addr, cfg.append_timeout()))
        }
    };
    Ok(store)
}

pub fn build_notifier(cfg: &AppConfig, pool: &PgPool) -> Result<Arc<dyn AlertNotifier>> {
    let directory = Arc::new(PgUserDirectory::new(pool.clone()));
    let mail = HttpMailTransport::new(
        &cfg.mail.api_base_url,
        cfg.mail.api_key.clone(),
        std::time::Duration::from_millis(cfg.mail.request_timeout_ms),
    )?;
    if cfg.mail.api_key.is_empty() {
        tracing::warn!("mail.api_key is empty; alert delivery will be rejected by the mail API");
    }
    let template = AlertTemplate {
        from: cfg.mail.from.clone(),
        subject: cfg.mail.subject.clone(),
        site_url: cfg.mail.site_url.clone(),
    };

    let pipeline = NotificationPipeline::new(directory.clone(), directory, Arc::new(mail), template)
        .with_concurrency(cfg.notify.concurrency)
        .with_call_timeout(cfg.call_timeout());
    Ok(Arc::new(pipeline))
}

pub fn system_clock(cfg: &AppConfig) -> Result<Arc<dyn Clock>> {
    Ok(Arc::new(SystemClock::new(cfg.utc_offset()?)))
}

/// Full production wiring: store, directory and mail transport against real backends.
pub async fn build_runner(cfg: &AppConfig) -> Result<TickRunner> {
    let pool = connect_pool(cfg).await?;
    let runner = TickRunner::new(
        build_engine(cfg)?,
        build_store(cfg, &pool)?,
        build_notifier(cfg, &pool)?,
        system_clock(cfg)?,
    )
    .with_threshold(cfg.tariff.threshold);
    Ok(runner)
}

pub async fn build_scheduler(cfg: &AppConfig) -> Result<Scheduler> {
    let runner = build_runner(cfg).await?;
    Ok(Scheduler::new(Arc::new(runner), cfg.categories(), cfg.schedule.minute))
}
