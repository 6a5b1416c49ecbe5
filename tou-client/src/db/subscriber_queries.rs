use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{NotificationMethod, SubscriberProfile};

/// Profiles whose notification preference matches `method`.
pub async fn profiles_by_method(
    pool: &PgPool,
    method: NotificationMethod,
) -> Result<Vec<SubscriberProfile>> {
    let rows = sqlx::query_as::<_, SubscriberProfile>(
        r#"
        SELECT
            user_id,
            notification_method,
            user_category,
            electricity_provider,
            report_frequency
        FROM user_profiles
        WHERE notification_method = $1
        ORDER BY user_id
        "#,
    )
    .bind(method.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Contact email registered with the identity store, if any.
///
/// A user that exists without an email yields `Ok(None)`, same as a missing user.
pub async fn contact_email(pool: &PgPool, user_id: &str) -> Result<Option<String>> {
    let email: Option<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT email
        FROM auth_users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(email.flatten().filter(|e| !e.trim().is_empty()))
}
