//! Match-proposal repository implementation.
//!
//! The accept/decline state machine requires per-proposal atomicity:
//! `update_versioned` performs the proposal write and the optional derived
//! notification insert in one transaction, guarded by a version
//! compare-and-swap, so two concurrent accepts can never both believe they
//! are first.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use mesa_core::{
    Acceptance, Error, MatchProposal, Notification, ProposalRepository, ProposalStatus, Result,
};

const PROPOSAL_COLUMNS: &str = "id, initiator_id, candidate_id, proposed_time, \
     proposed_location, status, created_at, compatibility_snapshot, acceptances, version";

/// PostgreSQL implementation of [`ProposalRepository`].
pub struct PgProposalRepository {
    pool: PgPool,
}

impl PgProposalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn proposal_from_row(row: &PgRow) -> Result<MatchProposal> {
    let status: String = row.get("status");
    let acceptances: serde_json::Value = row.get("acceptances");
    Ok(MatchProposal {
        id: row.get("id"),
        initiator_id: row.get("initiator_id"),
        candidate_id: row.get("candidate_id"),
        proposed_time: row.get("proposed_time"),
        proposed_location: row.get("proposed_location"),
        status: ProposalStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        compatibility_snapshot: row.get("compatibility_snapshot"),
        acceptances: serde_json::from_value::<BTreeMap<String, Acceptance>>(acceptances)?,
        version: row.get("version"),
    })
}

#[async_trait]
impl ProposalRepository for PgProposalRepository {
    async fn insert(&self, proposal: &MatchProposal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO match_proposal (
                id, initiator_id, candidate_id, proposed_time, proposed_location,
                status, created_at, compatibility_snapshot, acceptances, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(proposal.id)
        .bind(&proposal.initiator_id)
        .bind(&proposal.candidate_id)
        .bind(proposal.proposed_time)
        .bind(&proposal.proposed_location)
        .bind(proposal.status.as_str())
        .bind(proposal.created_at)
        .bind(proposal.compatibility_snapshot)
        .bind(serde_json::to_value(&proposal.acceptances)?)
        .bind(proposal.version)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<MatchProposal>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM match_proposal WHERE id = $1",
            PROPOSAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| proposal_from_row(&r)).transpose()
    }

    async fn pending_for(&self, user_id: &str) -> Result<Vec<MatchProposal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM match_proposal \
             WHERE initiator_id = $1 AND status = 'pending' \
             ORDER BY created_at",
            PROPOSAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn update_versioned(
        &self,
        proposal: &MatchProposal,
        expected_version: i64,
        notification: Option<&Notification>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            r#"
            UPDATE match_proposal
            SET status = $1, acceptances = $2, version = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(proposal.status.as_str())
        .bind(serde_json::to_value(&proposal.acceptances)?)
        .bind(proposal.version)
        .bind(proposal.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Someone else won the race; write nothing.
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(false);
        }

        if let Some(notification) = notification {
            sqlx::query(
                r#"
                INSERT INTO notification (id, recipient_id, kind, proposal_id, body, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(notification.id)
            .bind(&notification.recipient_id)
            .bind(&notification.kind)
            .bind(notification.proposal_id)
            .bind(&notification.body)
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(true)
    }
}
