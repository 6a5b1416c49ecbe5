use std::{future::Future, sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use tou_client::{Category, NotificationRecipient, SubscriberProfile};

use super::{AlertTemplate, IdentityProvider, MailTransport, NotifyError, ProfileDirectory};

/// Anything that can fan a high-rate alert out to subscribers.
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, category: Category, rate: f64) -> NotificationReport;
}

/// What happened to one candidate recipient.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientOutcome {
    Delivered { user_id: String },
    Unresolved { user_id: String, error: String },
    Failed { user_id: String, error: String },
}

impl RecipientOutcome {
    pub fn user_id(&self) -> &str {
        match self {
            RecipientOutcome::Delivered { user_id }
            | RecipientOutcome::Unresolved { user_id, .. }
            | RecipientOutcome::Failed { user_id, .. } => user_id,
        }
    }
}

/// Aggregate of one alert fan-out. Never an error: failures are counted here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationReport {
    pub candidates: usize,
    pub delivered: usize,
    pub unresolved: usize,
    pub failed: usize,
    pub profile_error: Option<String>,
    pub outcomes: Vec<RecipientOutcome>,
}

impl NotificationReport {
    fn from_outcomes(outcomes: Vec<RecipientOutcome>) -> Self {
        let mut report = NotificationReport {
            candidates: outcomes.len(),
            ..Default::default()
        };
        for o in &outcomes {
            match o {
                RecipientOutcome::Delivered { .. } => report.delivered += 1,
                RecipientOutcome::Unresolved { .. } => report.unresolved += 1,
                RecipientOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

pub struct NotificationPipeline {
    profiles: Arc<dyn ProfileDirectory>,
    identity: Arc<dyn IdentityProvider>,
    mail: Arc<dyn MailTransport>,
    template: AlertTemplate,
    concurrency: usize,
    call_timeout: Duration,
}

impl NotificationPipeline {
    pub fn new(
        profiles: Arc<dyn ProfileDirectory>,
        identity: Arc<dyn IdentityProvider>,
        mail: Arc<dyn MailTransport>,
        template: AlertTemplate,
    ) -> Self {
        Self {
            profiles,
            identity,
            mail,
            template,
            concurrency: 4,
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, NotifyError>
    where
        F: Future<Output = Result<T, NotifyError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(NotifyError::Timeout { operation }),
        }
    }

    async fn resolve(&self, profile: SubscriberProfile) -> Result<NotificationRecipient, NotifyError> {
        let email = self
            .bounded("resolve_contact", self.identity.resolve_contact(&profile.user_id))
            .await?;
        if email.trim().is_empty() {
            return Err(NotifyError::NotFound);
        }
        Ok(NotificationRecipient { email, profile })
    }

    async fn deliver(&self, profile: SubscriberProfile, category: Category, rate: f64) -> RecipientOutcome {
        let user_id = profile.user_id.clone();

        let recipient = match self.resolve(profile).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(recipient_id = %user_id, %category, error = %e, "skipping recipient, contact not resolved");
                metrics::counter!("tou_recipient_resolution_errors_total").increment(1);
                return RecipientOutcome::Unresolved {
                    user_id,
                    error: e.to_string(),
                };
            }
        };

        let email = self.template.render(&recipient.email, category, rate);
        match self.bounded("send", self.mail.send(&email)).await {
            Ok(()) => {
                tracing::info!(recipient_id = %user_id, %category, rate, "alert sent");
                metrics::counter!("tou_alerts_sent_total").increment(1);
                RecipientOutcome::Delivered { user_id }
            }
            Err(e) => {
                tracing::error!(recipient_id = %user_id, %category, error = %e, "alert delivery failed");
                metrics::counter!("tou_alert_delivery_errors_total").increment(1);
                RecipientOutcome::Failed {
                    user_id,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl AlertNotifier for NotificationPipeline {
    async fn notify(&self, category: Category, rate: f64) -> NotificationReport {
        let subscribers = match self.bounded("email_subscribers", self.profiles.email_subscribers()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(%category, error = %e, "could not load email subscribers, no alerts sent");
                return NotificationReport {
                    profile_error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let outcomes: Vec<RecipientOutcome> = stream::iter(subscribers)
            .map(|profile| self.deliver(profile, category, rate))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = NotificationReport::from_outcomes(outcomes);
        tracing::info!(
            %category,
            rate,
            candidates = report.candidates,
            delivered = report.delivered,
            unresolved = report.unresolved,
            failed = report.failed,
            "alert fan-out finished"
        );
        report
    }
}
