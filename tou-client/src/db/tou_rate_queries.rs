use anyhow::{Context, Result};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{Category, TouRecord};

#[derive(Debug, Clone, sqlx::FromRow)]
struct TouRateRow {
    ts: OffsetDateTime,
    category: String,
    rate: f64,
}

impl TryFrom<TouRateRow> for TouRecord {
    type Error = anyhow::Error;

    fn try_from(row: TouRateRow) -> Result<Self> {
        let category = row
            .category
            .parse::<Category>()
            .with_context(|| format!("tou_rates row at {} has a bad category", row.ts))?;
        Ok(TouRecord::new(category, row.rate, row.ts))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SummaryRow {
    count: i64,
    average: Option<f64>,
    peak: Option<f64>,
    off_peak: Option<f64>,
}

/// Aggregate view of a category's rate history.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSummary {
    pub category: Category,
    pub count: i64,
    pub average: f64,
    pub peak: f64,
    pub off_peak: f64,
    pub latest: Option<TouRecord>,
}

/// Newest-first rate history for a single category.
pub async fn recent_rates(pool: &PgPool, category: Category, limit: i64) -> Result<Vec<TouRecord>> {
    let rows = sqlx::query_as::<_, TouRateRow>(
        r#"
        SELECT
            ts,
            category,
            rate
        FROM tou_rates
        WHERE category = $1
        ORDER BY ts DESC
        LIMIT $2
        "#,
    )
    .bind(category.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TouRecord::try_from).collect()
}

/// Average/peak/off-peak of a category's rates since `since`.
///
/// Returns `None` when nothing was recorded in the window.
pub async fn rate_summary(
    pool: &PgPool,
    category: Category,
    since: OffsetDateTime,
) -> Result<Option<RateSummary>> {
    let row = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT
            COUNT(*)  AS count,
            AVG(rate) AS average,
            MAX(rate) AS peak,
            MIN(rate) AS off_peak
        FROM tou_rates
        WHERE category = $1
          AND ts >= $2
        "#,
    )
    .bind(category.as_str())
    .bind(since)
    .fetch_one(pool)
    .await?;

    let latest = recent_rates(pool, category, 1).await?.into_iter().next();
    Ok(summarize(category, row, latest))
}

fn summarize(category: Category, row: SummaryRow, latest: Option<TouRecord>) -> Option<RateSummary> {
    if row.count == 0 {
        return None;
    }

    Some(RateSummary {
        category,
        count: row.count,
        average: row.average.unwrap_or_default(),
        peak: row.peak.unwrap_or_default(),
        off_peak: row.off_peak.unwrap_or_default(),
        latest,
    })
}
