//! Threshold alerts: subscriber lookup, contact resolution and mail dispatch.

use tou_client::SubscriberProfile;

pub mod directory;
pub mod mail;
pub mod pipeline;
pub mod template;

pub use directory::PgUserDirectory;
pub use mail::HttpMailTransport;
pub use pipeline::{AlertNotifier, NotificationPipeline, NotificationReport, RecipientOutcome};
pub use template::AlertTemplate;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("profile query failed: {0}")]
    ProfileQuery(String),
    #[error("contact resolution failed: {0}")]
    Resolution(String),
    #[error("no contact address for user")]
    NotFound,
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
}

/// A rendered alert ready for the mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Profile collaborator: who opted into email alerts.
#[async_trait::async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn email_subscribers(&self) -> Result<Vec<SubscriberProfile>, NotifyError>;
}

/// Identity collaborator: user id to contact address.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_contact(&self, user_id: &str) -> Result<String, NotifyError>;
}

#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &AlertEmail) -> Result<(), NotifyError>;
}
