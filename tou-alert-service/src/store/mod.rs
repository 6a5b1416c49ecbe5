use std::{sync::Mutex, time::Duration};

use tou_client::TouRecord;

pub mod questdb;
pub mod questdb_ilp;

pub use questdb::QuestDbRateStore;
pub use questdb_ilp::QuestDbIlpRateStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("append failed: {0}")]
    Transient(String),
    #[error("append timed out after {0:?}")]
    Timeout(Duration),
}

/// Append-only destination for computed rates.
///
/// Implementations must tolerate concurrent appends from overlapping ticks.
#[async_trait::async_trait]
pub trait RateStore: Send + Sync {
    async fn append(&self, record: &TouRecord) -> Result<(), StoreError>;
}

/// Bound an append by `limit`.
pub(crate) async fn with_timeout<F>(limit: Duration, fut: F) -> Result<(), StoreError>
where
    F: std::future::Future<Output = Result<(), StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Content hash of a record, written alongside it so replays can be deduplicated.
pub fn event_id(record: &TouRecord) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&record.timestamp.unix_timestamp_nanos().to_le_bytes());
    let category = record.category.as_str();
    h.update(&(category.len() as u32).to_le_bytes());
    h.update(category.as_bytes());
    h.update(&record.rate.to_bits().to_le_bytes());
    h.finalize().to_hex().to_string()
}

/// In-process store; also used by `run_tick --dry-run`.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    records: Mutex<Vec<TouRecord>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TouRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RateStore for MemoryRateStore {
    async fn append(&self, record: &TouRecord) -> Result<(), StoreError> {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;
    use tou_client::Category;

    #[test]
    fn event_id_is_deterministic_and_content_sensitive() {
        let a = TouRecord::new(Category::Domestic, 7.12, datetime!(2024-05-01 14:00:00 UTC));
        let b = a.clone();
        let c = TouRecord::new(Category::Industrial, 7.12, datetime!(2024-05-01 14:00:00 UTC));

        assert_eq!(event_id(&a), event_id(&b));
        assert_ne!(event_id(&a), event_id(&c));
        assert_eq!(event_id(&a).len(), 64);
    }

    #[tokio::test]
    async fn memory_store_accepts_concurrent_appends() {
        let store = Arc::new(MemoryRateStore::new());
        let mut joins = Vec::new();
        for (i, category) in Category::ALL.into_iter().cycle().take(30).enumerate() {
            let store = store.clone();
            joins.push(tokio::spawn(async move {
                let rec = TouRecord::new(category, i as f64, datetime!(2024-05-01 14:00:00 UTC));
                store.append(&rec).await
            }));
        }
        for j in joins {
            j.await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 30);
    }

    #[tokio::test]
    async fn slow_append_times_out() {
        let res = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(StoreError::Timeout(_))));
    }
}
