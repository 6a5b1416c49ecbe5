//! Hourly tick driver.
//!
//! Every firing spawns one independent task per category (compute, persist,
//! conditionally notify). Firings never wait for earlier ticks to finish.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use time::{Duration, OffsetDateTime, UtcOffset};
use tokio::task::JoinHandle;
use tou_client::{Category, TouRecord};
use tracing::Instrument;

use crate::{
    clock::Clock,
    engine::RateEngine,
    notify::{AlertNotifier, NotificationReport},
    store::{RateStore, StoreError},
};

pub const DEFAULT_THRESHOLD: f64 = 10.0;

/// Strictly greater: a rate equal to the threshold does not alert.
pub fn exceeds_threshold(rate: f64, threshold: f64) -> bool {
    rate > threshold
}

#[derive(thiserror::Error, Debug)]
pub enum TickError {
    #[error("{category}: rate not persisted: {source}")]
    Store {
        category: Category,
        #[source]
        source: StoreError,
    },
    #[error("{category}: tick task aborted: {reason}")]
    Aborted { category: Category, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub record: TouRecord,
    /// `Some` when the rate crossed the threshold and the fan-out ran.
    pub alert: Option<NotificationReport>,
}

/// One category's compute → persist → notify sequence.
pub struct TickRunner {
    engine: RateEngine,
    store: Arc<dyn RateStore>,
    notifier: Arc<dyn AlertNotifier>,
    clock: Arc<dyn Clock>,
    threshold: f64,
}

impl TickRunner {
    pub fn new(
        engine: RateEngine,
        store: Arc<dyn RateStore>,
        notifier: Arc<dyn AlertNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
            clock,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub async fn run_tick(&self, category: Category) -> Result<TickOutcome, TickError> {
        let now = self.clock.now();
        let computation = self.engine.compute(category, now);
        let record = TouRecord::new(category, computation.rate, now.to_offset(UtcOffset::UTC));

        metrics::counter!("tou_ticks_total", "category" => category.as_str()).increment(1);
        metrics::gauge!("tou_rate", "category" => category.as_str()).set(record.rate);

        if let Err(source) = self.store.append(&record).await {
            return Err(TickError::Store { category, source });
        }
        tracing::info!(
            rate = record.rate,
            level = record.level().as_str(),
            season = computation.season.as_str(),
            demand = computation.demand.as_str(),
            fallback = computation.used_fallback(),
            "stored tou rate"
        );

        let alert = if exceeds_threshold(record.rate, self.threshold) {
            Some(self.notifier.notify(category, record.rate).await)
        } else {
            None
        };

        Ok(TickOutcome { record, alert })
    }
}

/// Next instant after `now` whose minute-of-hour is `minute` (seconds zeroed).
pub fn next_fire_after(now: OffsetDateTime, minute: u8) -> OffsetDateTime {
    let top_of_hour = now
        - Duration::minutes(now.minute().into())
        - Duration::seconds(now.second().into())
        - Duration::nanoseconds(now.nanosecond().into());
    let candidate = top_of_hour + Duration::minutes(minute.into());
    if candidate > now {
        candidate
    } else {
        candidate + Duration::HOUR
    }
}

/// Next firing after both `now` and the previous firing, so a wall clock stepped
/// backwards cannot fire the same slot twice.
pub fn next_fire(now: OffsetDateTime, last_fired: Option<OffsetDateTime>, minute: u8) -> OffsetDateTime {
    let from = last_fired.map_or(now, |last| now.max(last));
    next_fire_after(from, minute)
}

/// Decrements a category's in-flight count when the tick task ends, even on panic.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub type TickHandle = JoinHandle<Result<TickOutcome, TickError>>;

pub struct Scheduler {
    runner: Arc<TickRunner>,
    categories: Vec<Category>,
    minute: u8,
    in_flight: HashMap<Category, Arc<AtomicUsize>>,
}

impl Scheduler {
    pub fn new(runner: Arc<TickRunner>, categories: Vec<Category>, minute: u8) -> Self {
        let in_flight = categories
            .iter()
            .map(|c| (*c, Arc::new(AtomicUsize::new(0))))
            .collect();
        Self {
            runner,
            categories,
            minute: minute.min(59),
            in_flight,
        }
    }

    /// Ticks of `category` currently running.
    pub fn in_flight(&self, category: Category) -> usize {
        self.in_flight
            .get(&category)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Spawn one tick per configured category and return without waiting.
    pub fn fire_once(&self) -> Vec<(Category, TickHandle)> {
        let fired_at = self.runner.clock().now();
        self.categories
            .iter()
            .map(|&category| {
                let counter = self.in_flight.get(&category).cloned().unwrap_or_default();
                let previous = counter.fetch_add(1, Ordering::SeqCst);
                if previous > 0 {
                    tracing::warn!(%category, running = previous, "previous tick still running, firing anyway");
                }
                let guard = InFlightGuard(counter);
                let runner = self.runner.clone();
                let span = tracing::info_span!("tick", %category, %fired_at);

                let handle = tokio::spawn(
                    async move {
                        let _guard = guard;
                        let res = runner.run_tick(category).await;
                        if let Err(e) = &res {
                            tracing::error!(error = %e, "tick failed");
                        }
                        res
                    }
                    .instrument(span),
                );
                (category, handle)
            })
            .collect()
    }

    /// Fire at the configured minute of every hour until `shutdown` resolves.
    ///
    /// Ticks already running when shutdown arrives are left to finish on the runtime.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(categories = ?self.categories, minute = self.minute, "tou scheduler started");

        let mut last_fired = None;
        loop {
            let now = self.runner.clock().now();
            let next = next_fire(now, last_fired, self.minute);
            let wait = std::time::Duration::try_from(next - now).unwrap_or_default();
            tracing::debug!(next_tick = %next, "waiting for next tick");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_fired = Some(next);
                    let handles = self.fire_once();
                    tokio::spawn(supervise(handles));
                }
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no further ticks will fire");
                    break;
                }
            }
        }
    }
}

/// Await a firing's tick tasks and log aborted ones; never propagates.
pub async fn supervise(handles: Vec<(Category, TickHandle)>) -> Vec<Result<TickOutcome, TickError>> {
    let mut results = Vec::with_capacity(handles.len());
    for (category, handle) in handles {
        let res = match handle.await {
            Ok(res) => res,
            Err(e) => {
                let err = TickError::Aborted {
                    category,
                    reason: e.to_string(),
                };
                tracing::error!(error = %err, "tick task did not complete");
                Err(err)
            }
        };
        results.push(res);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        store::MemoryRateStore,
        tariff::RateModel,
        variation::FixedRandom,
    };
    use std::sync::Mutex;
    use time::macros::datetime;

    #[derive(Default)]
    struct CountingNotifier {
        calls: Mutex<Vec<(Category, f64)>>,
    }

    #[async_trait::async_trait]
    impl AlertNotifier for CountingNotifier {
        async fn notify(&self, category: Category, rate: f64) -> NotificationReport {
            self.calls.lock().unwrap().push((category, rate));
            NotificationReport::default()
        }
    }

    /// Holds every alert for `delay` before reporting.
    struct SlowNotifier {
        delay: std::time::Duration,
        finished: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AlertNotifier for SlowNotifier {
        async fn notify(&self, _category: Category, _rate: f64) -> NotificationReport {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            NotificationReport::default()
        }
    }

    /// Fails appends for one category, panics for another.
    struct FlakyStore {
        inner: MemoryRateStore,
        fail: Option<Category>,
        panic: Option<Category>,
    }

    #[async_trait::async_trait]
    impl RateStore for FlakyStore {
        async fn append(&self, record: &TouRecord) -> Result<(), StoreError> {
            if Some(record.category) == self.panic {
                panic!("store driver crashed");
            }
            if Some(record.category) == self.fail {
                return Err(StoreError::Transient("connection reset".to_string()));
            }
            self.inner.append(record).await
        }
    }

    // Wednesday 2024-05-01 14:00 UTC: DOMESTIC computes to 10.04 with zero noise.
    const AFTERNOON: OffsetDateTime = datetime!(2024-05-01 14:00:00 UTC);

    fn runner(
        store: Arc<dyn RateStore>,
        notifier: Arc<dyn AlertNotifier>,
        clock: Arc<FixedClock>,
        threshold: f64,
    ) -> TickRunner {
        let engine = RateEngine::new(Arc::new(RateModel::default()), Arc::new(FixedRandom::zero_noise()));
        TickRunner::new(engine, store, notifier, clock).with_threshold(threshold)
    }

    #[test]
    fn threshold_is_strict() {
        assert!(exceeds_threshold(10.01, 10.0));
        assert!(!exceeds_threshold(10.0, 10.0));
        assert!(!exceeds_threshold(9.99, 10.0));
    }

    #[test]
    fn next_fire_rolls_to_following_hour() {
        assert_eq!(
            next_fire_after(datetime!(2024-05-01 13:59:59 UTC), 0),
            datetime!(2024-05-01 14:00:00 UTC)
        );
        assert_eq!(
            next_fire_after(datetime!(2024-05-01 14:00:00 UTC), 0),
            datetime!(2024-05-01 15:00:00 UTC)
        );
        assert_eq!(
            next_fire_after(datetime!(2024-05-01 23:40:12.5 UTC), 30),
            datetime!(2024-05-02 00:30:00 UTC)
        );
        assert_eq!(
            next_fire_after(datetime!(2024-05-01 14:10:00 UTC), 30),
            datetime!(2024-05-01 14:30:00 UTC)
        );
    }

    #[test]
    fn backward_clock_step_does_not_refire_the_same_slot() {
        let fired = datetime!(2024-05-01 14:00:00 UTC);
        // Clock stepped back to 13:59:30 after the 14:00 firing.
        assert_eq!(
            next_fire(datetime!(2024-05-01 13:59:30 UTC), Some(fired), 0),
            datetime!(2024-05-01 15:00:00 UTC)
        );
        assert_eq!(
            next_fire(datetime!(2024-05-01 16:20:00 UTC), Some(fired), 0),
            datetime!(2024-05-01 17:00:00 UTC)
        );
        assert_eq!(
            next_fire(datetime!(2024-05-01 13:59:30 UTC), None, 0),
            fired
        );
    }

    #[tokio::test]
    async fn rate_above_threshold_notifies_once() {
        let store = Arc::new(MemoryRateStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(AFTERNOON));
        let r = runner(store.clone(), notifier.clone(), clock, 10.03);

        let outcome = r.run_tick(Category::Domestic).await.unwrap();

        assert_eq!(outcome.record.rate, 10.04);
        assert!(outcome.alert.is_some());
        assert_eq!(notifier.calls.lock().unwrap().as_slice(), &[(Category::Domestic, 10.04)]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rate_equal_to_threshold_does_not_notify() {
        let store = Arc::new(MemoryRateStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(AFTERNOON));
        let r = runner(store.clone(), notifier.clone(), clock, 10.04);

        let outcome = r.run_tick(Category::Domestic).await.unwrap();

        assert!(outcome.alert.is_none());
        assert!(notifier.calls.lock().unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn record_timestamp_is_utc_instant_of_local_clock() {
        let store = Arc::new(MemoryRateStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(datetime!(2024-05-01 19:30:00 +05:30)));
        let r = runner(store.clone(), notifier, clock, 100.0);

        let outcome = r.run_tick(Category::Industrial).await.unwrap();
        assert_eq!(outcome.record.iso_timestamp().unwrap(), "2024-05-01T14:00:00Z");
    }

    #[tokio::test]
    async fn store_failure_is_surfaced_and_skips_alert() {
        let store = Arc::new(FlakyStore {
            inner: MemoryRateStore::new(),
            fail: Some(Category::Domestic),
            panic: None,
        });
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(AFTERNOON));
        let r = runner(store, notifier.clone(), clock, 0.0);

        let err = r.run_tick(Category::Domestic).await.unwrap_err();
        assert!(matches!(err, TickError::Store { category: Category::Domestic, .. }));
        assert!(notifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_category_failing_does_not_affect_others() {
        let store = Arc::new(FlakyStore {
            inner: MemoryRateStore::new(),
            fail: Some(Category::Domestic),
            panic: Some(Category::Industrial),
        });
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(AFTERNOON));
        let r = Arc::new(runner(store.clone(), notifier, clock, 100.0));
        let scheduler = Scheduler::new(r, Category::ALL.to_vec(), 0);

        let results = supervise(scheduler.fire_once()).await;

        assert!(matches!(results[0], Err(TickError::Store { .. })));
        assert!(matches!(results[1], Err(TickError::Aborted { .. })));
        assert!(results[2].is_ok());
        let stored = store.inner.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, Category::NonDomestic);
        for c in Category::ALL {
            assert_eq!(scheduler.in_flight(c), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_fires_at_the_top_of_the_hour() {
        let store = Arc::new(MemoryRateStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(FixedClock::new(datetime!(2024-05-01 13:59:00 UTC)));
        let r = Arc::new(runner(store.clone(), notifier, clock, 100.0));
        let scheduler = Scheduler::new(r, Category::ALL.to_vec(), 0);

        // The clock is frozen, so the first wait (60s) repeats; stop between firings.
        scheduler
            .run_until(tokio::time::sleep(std::time::Duration::from_secs(90)))
            .await;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let records = store.records();
        assert_eq!(records.len(), 3);
        let mut categories: Vec<Category> = records.iter().map(|r| r.category).collect();
        categories.sort();
        assert_eq!(categories, Category::ALL.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn later_firing_does_not_wait_for_a_blocked_tick() {
        let store = Arc::new(MemoryRateStore::new());
        let notifier = Arc::new(SlowNotifier {
            delay: std::time::Duration::from_secs(2 * 3600),
            finished: AtomicUsize::new(0),
        });
        let clock = Arc::new(FixedClock::new(AFTERNOON));
        let r = Arc::new(runner(store.clone(), notifier.clone(), clock, 0.0));
        let scheduler = Scheduler::new(r, Category::ALL.to_vec(), 0);

        let first = scheduler.fire_once();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(store.len(), 3);
        for c in Category::ALL {
            assert_eq!(scheduler.in_flight(c), 1);
        }

        // The next hour's firing goes ahead while every first tick is still alerting.
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        let second = scheduler.fire_once();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(store.len(), 6);
        assert_eq!(notifier.finished.load(Ordering::SeqCst), 0);
        for c in Category::ALL {
            assert_eq!(scheduler.in_flight(c), 2);
        }

        let mut results = supervise(first).await;
        results.extend(supervise(second).await);
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|o| o.alert.is_some())));
        assert_eq!(notifier.finished.load(Ordering::SeqCst), 6);
        for c in Category::ALL {
            assert_eq!(scheduler.in_flight(c), 0);
        }
    }
}
