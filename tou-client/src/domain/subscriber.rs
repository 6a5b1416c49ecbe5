use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How a user asked to be told about high tariff rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Email,
    Push,
    Sms,
    None,
}

impl NotificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMethod::Email => "email",
            NotificationMethod::Push => "push",
            NotificationMethod::Sms => "sms",
            NotificationMethod::None => "none",
        }
    }
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationMethod::Email),
            "push" => Ok(NotificationMethod::Push),
            "sms" => Ok(NotificationMethod::Sms),
            "none" | "" => Ok(NotificationMethod::None),
            other => Err(format!("unknown notification method '{other}'")),
        }
    }
}

/// Profile row of a user, as stored by the profile collaborator.
///
/// Read-only here; only `user_id` and `notification_method` drive alerting.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub user_id: String,
    pub notification_method: String,
    pub user_category: Option<String>,
    pub electricity_provider: Option<String>,
    pub report_frequency: Option<String>,
}

impl SubscriberProfile {
    pub fn method(&self) -> Option<NotificationMethod> {
        self.notification_method.parse().ok()
    }
}

/// A subscriber whose contact address has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecipient {
    pub email: String,
    pub profile: SubscriberProfile,
}
