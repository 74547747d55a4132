//! Repository traits for the mesa storage seams.
//!
//! These traits define the interfaces that concrete storage backends must
//! satisfy. `mesa-db` ships the PostgreSQL implementations; `mesa-engine`
//! ships an in-memory implementation for tests. The engine depends only on
//! these traits, so all matching/lifecycle semantics are backend-agnostic.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::timegrid::TimeLabel;

/// Store for per-user availability declarations.
///
/// Writes are whole-document overwrites; concurrent writers to the same
/// user+week race with last-writer-wins semantics (accepted: a single user
/// editing their own data).
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Resolve the profile for the Monday-aligned week containing
    /// `reference_date`. Falls back to the recurring template (remapped to
    /// the queried week at read time, never persisted) when no
    /// week-specific record exists.
    async fn get(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<AvailabilityProfile>>;

    /// Full overwrite of the addressed record: the week containing
    /// `reference_date`, or the recurring template when `recurring` is set.
    async fn put(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
        slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
        recurring: bool,
    ) -> Result<()>;
}

/// Read-only access to survey-maintained user profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn fetch(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// All users with a completed preference survey — the candidate
    /// universe for ranking.
    async fn list_survey_completed(&self) -> Result<Vec<UserProfile>>;
}

/// Ledger of pairwise compatibility scores.
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    async fn get(&self, pair: &PairKey) -> Result<Option<CompatibilityScore>>;

    /// Idempotent baseline write: inserts only when no record exists for
    /// the pair and returns the stored record either way, so concurrent
    /// first-reads of the same pair converge on a single row.
    async fn insert_if_absent(&self, score: CompatibilityScore) -> Result<CompatibilityScore>;

    /// Upsert an adjusted score.
    async fn put(&self, score: CompatibilityScore) -> Result<()>;
}

/// Store for match proposals and their atomically attached notifications.
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Persist a freshly created proposal. A unique-violation failure means
    /// a concurrent refresh already proposed the same pending pair.
    async fn insert(&self, proposal: &MatchProposal) -> Result<()>;

    async fn fetch(&self, id: Uuid) -> Result<Option<MatchProposal>>;

    /// Proposals in `pending` status initiated by `user_id`, oldest first.
    async fn pending_for(&self, user_id: &str) -> Result<Vec<MatchProposal>>;

    /// Compare-and-swap write of a mutated proposal. The caller passes the
    /// proposal with its version already bumped and the version it read;
    /// the write succeeds only when the stored version still equals
    /// `expected_version`. The proposal write and the optional notification
    /// insert are one atomic unit. Returns `false` (writing nothing) on a
    /// version conflict.
    async fn update_versioned(
        &self,
        proposal: &MatchProposal,
        expected_version: i64,
        notification: Option<&Notification>,
    ) -> Result<bool>;
}
