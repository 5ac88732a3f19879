//! Account lookups: subscription tier and enrichment preferences.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use tidytask_core::{EnrichmentPreferences, Error, PreferenceStore, Result, Tier, TierLookup};

/// PostgreSQL account repository.
///
/// Preferences are stored as a loose JSONB map on `account`; conversion to
/// [`EnrichmentPreferences`] happens here and nowhere else.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: Pool<Postgres>,
}

impl PgAccountRepository {
    /// Create a new PgAccountRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Persist preferences for an owner.
    pub async fn save_preferences(
        &self,
        owner_id: Uuid,
        preferences: &EnrichmentPreferences,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE account SET enrichment_preferences = $1 WHERE id = $2")
                .bind(Json(preferences.to_map()))
                .bind(owner_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("account {}", owner_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PgAccountRepository {
    async fn preferences(&self, owner_id: Uuid) -> Result<EnrichmentPreferences> {
        let row = sqlx::query("SELECT enrichment_preferences FROM account WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            debug!(%owner_id, "No account row, using default preferences");
            return Ok(EnrichmentPreferences::all_auto());
        };

        // Values that are not strings are treated as missing.
        let raw: Json<HashMap<String, serde_json::Value>> =
            row.try_get("enrichment_preferences")?;
        let map: HashMap<String, String> = raw
            .0
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect();
        Ok(EnrichmentPreferences::from_map(&map))
    }
}

#[async_trait]
impl TierLookup for PgAccountRepository {
    async fn tier(&self, owner_id: Uuid) -> Result<Tier> {
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM account WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match tier {
            None => Ok(Tier::Free),
            Some(raw) => Ok(raw.parse().unwrap_or_else(|_| {
                warn!(%owner_id, tier = %raw, "Unknown tier, treating as free");
                Tier::Free
            })),
        }
    }
}
