#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use time::OffsetDateTime;
use tou_alert_service::{
    clock::FixedClock,
    engine::RateEngine,
    notify::{
        AlertEmail, AlertTemplate, IdentityProvider, MailTransport, NotificationPipeline,
        NotifyError, ProfileDirectory,
    },
    scheduler::{Scheduler, TickRunner},
    store::MemoryRateStore,
    tariff::RateModel,
    variation::FixedRandom,
};
use tou_client::{Category, SubscriberProfile};

pub struct Users {
    profiles: Vec<SubscriberProfile>,
    emails: HashMap<String, String>,
}

impl Users {
    /// `(user_id, Some(email))` resolves; `None` fails resolution.
    pub fn new(entries: &[(&str, Option<&str>)]) -> Self {
        let profiles = entries
            .iter()
            .map(|(id, _)| SubscriberProfile {
                user_id: id.to_string(),
                notification_method: "email".to_string(),
                user_category: Some("domestic".to_string()),
                electricity_provider: None,
                report_frequency: Some("weekly".to_string()),
            })
            .collect();
        let emails = entries
            .iter()
            .filter_map(|(id, email)| email.map(|e| (id.to_string(), e.to_string())))
            .collect();
        Self { profiles, emails }
    }
}

#[async_trait::async_trait]
impl ProfileDirectory for Users {
    async fn email_subscribers(&self) -> Result<Vec<SubscriberProfile>, NotifyError> {
        Ok(self.profiles.clone())
    }
}

#[async_trait::async_trait]
impl IdentityProvider for Users {
    async fn resolve_contact(&self, user_id: &str) -> Result<String, NotifyError> {
        self.emails.get(user_id).cloned().ok_or(NotifyError::NotFound)
    }
}

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<AlertEmail>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<AlertEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MailTransport for Outbox {
    async fn send(&self, email: &AlertEmail) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryRateStore>,
    pub outbox: Arc<Outbox>,
    pub clock: Arc<FixedClock>,
    pub scheduler: Scheduler,
}

/// Zero-noise engine, threshold 10.0, all categories.
pub fn harness(now: OffsetDateTime, users: Users) -> Harness {
    let store = Arc::new(MemoryRateStore::new());
    let outbox = Arc::new(Outbox::default());
    let clock = Arc::new(FixedClock::new(now));
    let users = Arc::new(users);

    let engine = RateEngine::new(Arc::new(RateModel::default()), Arc::new(FixedRandom::zero_noise()));
    let pipeline = NotificationPipeline::new(users.clone(), users, outbox.clone(), AlertTemplate::default())
        .with_concurrency(1);
    let runner = TickRunner::new(engine, store.clone(), Arc::new(pipeline), clock.clone()).with_threshold(10.0);
    let scheduler = Scheduler::new(Arc::new(runner), Category::ALL.to_vec(), 0);

    Harness {
        store,
        outbox,
        clock,
        scheduler,
    }
}
