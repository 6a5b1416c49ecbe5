use sqlx::PgPool;
use tou_client::{db::subscriber_queries, NotificationMethod, SubscriberProfile};

use super::{IdentityProvider, NotifyError, ProfileDirectory};

/// Profile and identity lookups against the shared document store.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProfileDirectory for PgUserDirectory {
    async fn email_subscribers(&self) -> Result<Vec<SubscriberProfile>, NotifyError> {
        subscriber_queries::profiles_by_method(&self.pool, NotificationMethod::Email)
            .await
            .map_err(|e| NotifyError::ProfileQuery(e.to_string()))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for PgUserDirectory {
    async fn resolve_contact(&self, user_id: &str) -> Result<String, NotifyError> {
        match subscriber_queries::contact_email(&self.pool, user_id).await {
            Ok(Some(email)) => Ok(email),
            Ok(None) => Err(NotifyError::NotFound),
            Err(e) => Err(NotifyError::Resolution(e.to_string())),
        }
    }
}
