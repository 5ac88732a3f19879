//! Daily per-feature usage metering.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use tidytask_core::{Error, FeatureFlag, FeatureSet, Result, UsageStore};

/// PostgreSQL implementation of [`UsageStore`], one counter row per
/// `(owner_id, feature, usage_date)`.
#[derive(Clone)]
pub struct PgUsageStore {
    pool: Pool<Postgres>,
}

impl PgUsageStore {
    /// Create a new PgUsageStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn count_today(&self, owner_id: Uuid, feature: FeatureFlag) -> Result<i64> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM feature_usage WHERE owner_id = $1 AND feature = $2 AND usage_date = $3",
        )
        .bind(owner_id)
        .bind(feature.as_str())
        .bind(Self::today())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count.map(i64::from).unwrap_or(0))
    }

    async fn record(&self, owner_id: Uuid, features: &FeatureSet) -> Result<()> {
        if features.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = features.names();
        sqlx::query(
            r#"
            INSERT INTO feature_usage (owner_id, feature, usage_date, count)
            SELECT $1, f, $3, 1 FROM UNNEST($2::text[]) AS f
            ON CONFLICT (owner_id, feature, usage_date)
            DO UPDATE SET count = feature_usage.count + 1
            "#,
        )
        .bind(owner_id)
        .bind(&names)
        .bind(Self::today())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
