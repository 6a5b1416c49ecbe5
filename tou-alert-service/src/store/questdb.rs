use std::time::Duration;

use sqlx::postgres::PgPool;
use tou_client::TouRecord;

use super::{event_id, with_timeout, RateStore, StoreError};

/// Appends rates over QuestDB's Postgres wire protocol.
///
/// A failed append is reported once; the next tick writes a fresh record instead
/// of retrying this one.
///
/// The timeout only bounds how long a tick waits. An insert that QuestDB commits
/// after the deadline is still reported as `StoreError::Timeout`, so such a row
/// can exist without a successful tick; its `event_id` identifies it.
pub struct QuestDbRateStore {
    pool: PgPool,
    append_timeout: Duration,
}

impl QuestDbRateStore {
    pub fn new(pool: PgPool, append_timeout: Duration) -> Self {
        Self {
            pool,
            append_timeout,
        }
    }

    async fn insert(&self, record: &TouRecord) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO tou_rates (ts, category, event_id, rate) VALUES ($1, $2, $3, $4)")
            .bind(record.timestamp)
            .bind(record.category.as_str())
            .bind(event_id(record))
            .bind(record.rate)
            .execute(&self.pool)
            .await
            .map(|_| ())
    }
}

#[async_trait::async_trait]
impl RateStore for QuestDbRateStore {
    async fn append(&self, record: &TouRecord) -> Result<(), StoreError> {
        let res = with_timeout(self.append_timeout, async {
            self.insert(record)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))
        })
        .await;

        match &res {
            Ok(()) => metrics::counter!("questdb_appended_records_total").increment(1),
            Err(e) => {
                tracing::error!(error = %e, category = %record.category, "questdb rate append failed");
                metrics::counter!("tou_store_append_errors_total").increment(1);
            }
        }
        res
    }
}
