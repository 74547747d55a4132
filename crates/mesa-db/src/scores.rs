//! Compatibility-score ledger repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mesa_core::{CompatibilityScore, Error, PairKey, Result, ScoreRepository};

/// PostgreSQL implementation of [`ScoreRepository`]. One row per unordered
/// pair, keyed by the canonical `'lo|hi'` pair key.
pub struct PgScoreRepository {
    pool: PgPool,
}

impl PgScoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn score_from_row(row: &PgRow) -> CompatibilityScore {
    CompatibilityScore {
        pair: PairKey {
            lo: row.get("lo_user"),
            hi: row.get("hi_user"),
        },
        score: row.get("score"),
        last_updated: row.get("last_updated"),
    }
}

#[async_trait]
impl ScoreRepository for PgScoreRepository {
    async fn get(&self, pair: &PairKey) -> Result<Option<CompatibilityScore>> {
        let row = sqlx::query(
            r#"
            SELECT lo_user, hi_user, score, last_updated
            FROM compatibility_score
            WHERE pair_key = $1
            "#,
        )
        .bind(pair.storage_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(score_from_row))
    }

    async fn insert_if_absent(&self, score: CompatibilityScore) -> Result<CompatibilityScore> {
        // ON CONFLICT DO NOTHING + re-read keeps the lazy baseline write
        // idempotent: concurrent first-reads of the same pair converge on
        // whichever row won the insert.
        sqlx::query(
            r#"
            INSERT INTO compatibility_score (pair_key, lo_user, hi_user, score, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pair_key) DO NOTHING
            "#,
        )
        .bind(score.pair.storage_key())
        .bind(&score.pair.lo)
        .bind(&score.pair.hi)
        .bind(score.score)
        .bind(score.last_updated)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.get(&score.pair).await?.ok_or_else(|| {
            Error::Internal(format!(
                "compatibility score for {} vanished after insert",
                score.pair
            ))
        })
    }

    async fn put(&self, score: CompatibilityScore) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO compatibility_score (pair_key, lo_user, hi_user, score, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pair_key) DO UPDATE
            SET score = EXCLUDED.score,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(score.pair.storage_key())
        .bind(&score.pair.lo)
        .bind(&score.pair.hi)
        .bind(score.score)
        .bind(score.last_updated)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
