//! Availability repository implementation.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use mesa_core::{
    week_key, week_start, AvailabilityProfile, AvailabilityRepository, Error, Result, TimeLabel,
    RECURRING_KEY,
};

/// PostgreSQL implementation of [`AvailabilityRepository`].
///
/// One row per user+week (or user+`'recurring'`), slots stored as a jsonb
/// map of ISO day to label array. Writes are whole-row overwrites.
pub struct PgAvailabilityRepository {
    pool: PgPool,
}

impl PgAvailabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_record(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<AvailabilityProfile>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, week_key, recurring, slots
            FROM availability_profile
            WHERE user_id = $1 AND week_key = $2
            "#,
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| {
            let slots: serde_json::Value = r.get("slots");
            let slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>> =
                serde_json::from_value(slots)?;
            let recurring: bool = r.get("recurring");
            let week_key: String = r.get("week_key");
            let week_start = if recurring {
                None
            } else {
                Some(week_key.parse().map_err(|_| {
                    Error::Internal(format!("malformed week key '{}'", week_key))
                })?)
            };
            Ok(AvailabilityProfile {
                user_id: r.get("user_id"),
                recurring,
                week_start,
                slots_by_day,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl AvailabilityRepository for PgAvailabilityRepository {
    async fn get(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<AvailabilityProfile>> {
        let week = week_start(reference_date);
        if let Some(profile) = self.fetch_record(user_id, &week_key(reference_date)).await? {
            return Ok(Some(profile));
        }
        // Fall back to the recurring template, remapped to the queried
        // week at read time only.
        Ok(self
            .fetch_record(user_id, RECURRING_KEY)
            .await?
            .map(|template| template.resolve_for_week(week)))
    }

    async fn put(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
        slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
        recurring: bool,
    ) -> Result<()> {
        let key = if recurring {
            RECURRING_KEY.to_string()
        } else {
            week_key(reference_date)
        };
        let slots = serde_json::to_value(&slots_by_day)?;

        sqlx::query(
            r#"
            INSERT INTO availability_profile (user_id, week_key, recurring, slots, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (user_id, week_key) DO UPDATE
            SET recurring = EXCLUDED.recurring,
                slots = EXCLUDED.slots,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&key)
        .bind(recurring)
        .bind(slots)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
