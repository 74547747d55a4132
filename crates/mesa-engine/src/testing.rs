//! In-memory storage backend for engine tests.
//!
//! Always compiled (not `#[cfg(test)]`) so downstream integration tests can
//! drive the full engine without a database. `update_versioned` performs
//! the version check under the proposal-map lock, which makes it a true
//! compare-and-swap: the concurrency tests exercise exactly the same
//! atomicity contract the PostgreSQL backend provides transactionally.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use mesa_core::{
    week_key, AvailabilityProfile, AvailabilityRepository, CompatibilityScore, Error,
    MatchProposal, Notification, PairKey, ProfileRepository, ProposalRepository, ProposalStatus,
    Result, ScoreRepository, TimeLabel, UserProfile, RECURRING_KEY,
};

/// Mutex-guarded maps implementing every mesa repository trait.
#[derive(Default)]
pub struct MemoryStore {
    availability: Mutex<HashMap<(String, String), AvailabilityProfile>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    scores: Mutex<HashMap<String, CompatibilityScore>>,
    proposals: Mutex<HashMap<Uuid, MatchProposal>>,
    notifications: Mutex<Vec<Notification>>,
    fail_score_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn add_profile(&self, profile: UserProfile) {
        self.lock(&self.profiles)
            .insert(profile.uid.clone(), profile);
    }

    /// Pre-seed a ledger row, e.g. a 0.0 incompatibility marker.
    pub fn seed_score(&self, pair: PairKey, score: f64) {
        self.lock(&self.scores).insert(
            pair.storage_key(),
            CompatibilityScore {
                pair,
                score,
                last_updated: chrono::Utc::now(),
            },
        );
    }

    /// Make every score write fail, to test the swallow-and-log contract.
    pub fn fail_score_writes(&self, fail: bool) {
        *self.lock(&self.fail_score_writes) = fail;
    }

    pub fn score_row_count(&self) -> usize {
        self.lock(&self.scores).len()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock(&self.notifications).clone()
    }

    pub fn proposal(&self, id: Uuid) -> Option<MatchProposal> {
        self.lock(&self.proposals).get(&id).cloned()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn score_write_failure(&self) -> Option<Error> {
        if *self.lock(&self.fail_score_writes) {
            Some(Error::Internal("simulated score-store outage".to_string()))
        } else {
            None
        }
    }
}

#[async_trait]
impl AvailabilityRepository for MemoryStore {
    async fn get(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<AvailabilityProfile>> {
        let week = mesa_core::week_start(reference_date);
        let map = self.lock(&self.availability);
        if let Some(profile) = map.get(&(user_id.to_string(), week_key(reference_date))) {
            return Ok(Some(profile.clone()));
        }
        Ok(map
            .get(&(user_id.to_string(), RECURRING_KEY.to_string()))
            .map(|template| template.resolve_for_week(week)))
    }

    async fn put(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
        slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
        recurring: bool,
    ) -> Result<()> {
        let (key, week_start) = if recurring {
            (RECURRING_KEY.to_string(), None)
        } else {
            (
                week_key(reference_date),
                Some(mesa_core::week_start(reference_date)),
            )
        };
        let profile = AvailabilityProfile {
            user_id: user_id.to_string(),
            recurring,
            week_start,
            slots_by_day,
        };
        self.lock(&self.availability)
            .insert((user_id.to_string(), key), profile);
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn fetch(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(self.lock(&self.profiles).get(uid).cloned())
    }

    async fn list_survey_completed(&self) -> Result<Vec<UserProfile>> {
        let mut all: Vec<UserProfile> = self
            .lock(&self.profiles)
            .values()
            .filter(|p| p.survey_completed)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(all)
    }
}

#[async_trait]
impl ScoreRepository for MemoryStore {
    async fn get(&self, pair: &PairKey) -> Result<Option<CompatibilityScore>> {
        Ok(self.lock(&self.scores).get(&pair.storage_key()).cloned())
    }

    async fn insert_if_absent(&self, score: CompatibilityScore) -> Result<CompatibilityScore> {
        if let Some(err) = self.score_write_failure() {
            return Err(err);
        }
        let mut map = self.lock(&self.scores);
        Ok(map
            .entry(score.pair.storage_key())
            .or_insert(score)
            .clone())
    }

    async fn put(&self, score: CompatibilityScore) -> Result<()> {
        if let Some(err) = self.score_write_failure() {
            return Err(err);
        }
        self.lock(&self.scores)
            .insert(score.pair.storage_key(), score);
        Ok(())
    }
}

#[async_trait]
impl ProposalRepository for MemoryStore {
    async fn insert(&self, proposal: &MatchProposal) -> Result<()> {
        self.lock(&self.proposals)
            .insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<MatchProposal>> {
        Ok(self.lock(&self.proposals).get(&id).cloned())
    }

    async fn pending_for(&self, user_id: &str) -> Result<Vec<MatchProposal>> {
        let mut pending: Vec<MatchProposal> = self
            .lock(&self.proposals)
            .values()
            .filter(|p| p.initiator_id == user_id && p.status == ProposalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    async fn update_versioned(
        &self,
        proposal: &MatchProposal,
        expected_version: i64,
        notification: Option<&Notification>,
    ) -> Result<bool> {
        let mut map = self.lock(&self.proposals);
        let Some(stored) = map.get_mut(&proposal.id) else {
            return Err(Error::NotFound(format!("proposal {}", proposal.id)));
        };
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = proposal.clone();
        if let Some(notification) = notification {
            self.lock(&self.notifications).push(notification.clone());
        }
        Ok(true)
    }
}
