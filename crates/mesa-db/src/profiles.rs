//! User-profile repository implementation (read-only to the engine).

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mesa_core::{Error, ProfileRepository, Result, UserProfile};

const PROFILE_COLUMNS: &str =
    "uid, display_name, topics, diet, favorite_locations, contact_detail, survey_completed";

/// PostgreSQL implementation of [`ProfileRepository`].
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile> {
    let topics: serde_json::Value = row.get("topics");
    let favorite_locations: serde_json::Value = row.get("favorite_locations");
    Ok(UserProfile {
        uid: row.get("uid"),
        display_name: row.get("display_name"),
        topics: serde_json::from_value::<BTreeSet<String>>(topics)?,
        diet: row.get("diet"),
        favorite_locations: serde_json::from_value::<BTreeSet<String>>(favorite_locations)?,
        contact_detail: row.get("contact_detail"),
        survey_completed: row.get("survey_completed"),
    })
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn fetch(&self, uid: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_profile WHERE uid = $1",
            PROFILE_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| profile_from_row(&r)).transpose()
    }

    async fn list_survey_completed(&self) -> Result<Vec<UserProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_profile WHERE survey_completed = TRUE ORDER BY uid",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(profile_from_row).collect()
    }
}
