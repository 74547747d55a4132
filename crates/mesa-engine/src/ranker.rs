//! Candidate ranking: who should this user share a meal with next.

use std::sync::Arc;

use tracing::{debug, trace};

use mesa_core::{Error, ProfileRepository, Result, UserProfile};

use crate::ledger::ScoreLedger;

/// Upper bound on candidates returned per invocation. Bounds the worst-case
/// fan-out of proposal creation.
pub const MAX_CANDIDATES: usize = 3;

/// A candidate ordered for proposal generation.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub profile: UserProfile,
    /// Pairwise compatibility score at ranking time.
    pub score: f64,
    /// Tie-break key: shared favorite-location count with the requester.
    pub shared_locations: usize,
}

/// Scores and orders all eligible users for a requester.
#[derive(Clone)]
pub struct CandidateRanker {
    profiles: Arc<dyn ProfileRepository>,
    ledger: ScoreLedger,
}

impl CandidateRanker {
    pub fn new(profiles: Arc<dyn ProfileRepository>, ledger: ScoreLedger) -> Self {
        CandidateRanker { profiles, ledger }
    }

    /// Rank candidates for `user_id`.
    ///
    /// Excluded: the requester themselves, users without a completed
    /// survey, and pairs whose score is exactly 0 (the explicit
    /// incompatibility marker). Order: descending score, then descending
    /// shared favorite-location count, then uid for a stable result.
    pub async fn rank(&self, user_id: &str) -> Result<Vec<RankedCandidate>> {
        let requester = self
            .profiles
            .fetch(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user profile {}", user_id)))?;

        let mut ranked = Vec::new();
        for candidate in self.profiles.list_survey_completed().await? {
            if candidate.uid == user_id {
                continue;
            }
            if !candidate.survey_completed {
                continue;
            }
            let score = self.ledger.get_score(user_id, &candidate.uid).await?;
            if score <= f64::EPSILON {
                trace!(candidate = %candidate.uid, "skipping explicitly incompatible pair");
                continue;
            }
            let shared_locations = requester
                .favorite_locations
                .intersection(&candidate.favorite_locations)
                .count();
            ranked.push(RankedCandidate {
                profile: candidate,
                score,
                shared_locations,
            });
        }

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.shared_locations.cmp(&a.shared_locations))
                .then_with(|| a.profile.uid.cmp(&b.profile.uid))
        });
        ranked.truncate(MAX_CANDIDATES);

        debug!(
            user_id,
            candidate_count = ranked.len(),
            "ranked meal candidates"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use mesa_core::PairKey;
    use std::collections::BTreeSet;

    fn profile(uid: &str, locations: &[&str], completed: bool) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            display_name: None,
            topics: BTreeSet::new(),
            diet: None,
            favorite_locations: locations.iter().map(|s| s.to_string()).collect(),
            contact_detail: None,
            survey_completed: completed,
        }
    }

    fn ranker(store: &Arc<MemoryStore>) -> CandidateRanker {
        CandidateRanker::new(
            store.clone(),
            ScoreLedger::new(store.clone(), store.clone()),
        )
    }

    #[tokio::test]
    async fn excludes_self_and_incomplete_surveys() {
        let store = Arc::new(MemoryStore::default());
        store.add_profile(profile("alice", &[], true));
        store.add_profile(profile("bob", &[], true));
        store.add_profile(profile("carol", &[], false));

        let ranked = ranker(&store).rank("alice").await.unwrap();
        let uids: Vec<&str> = ranked.iter().map(|c| c.profile.uid.as_str()).collect();
        assert_eq!(uids, vec!["bob"]);
    }

    #[tokio::test]
    async fn zero_score_marks_explicit_incompatibility() {
        let store = Arc::new(MemoryStore::default());
        store.add_profile(profile("alice", &[], true));
        store.add_profile(profile("bob", &[], true));
        store.seed_score(PairKey::new("alice", "bob"), 0.0);

        let ranked = ranker(&store).rank("alice").await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn orders_by_score_then_location_overlap() {
        let store = Arc::new(MemoryStore::default());
        store.add_profile(profile("alice", &["cafeteria", "bakery"], true));
        store.add_profile(profile("bob", &["cafeteria"], true));
        store.add_profile(profile("carol", &["cafeteria", "bakery"], true));
        store.add_profile(profile("dave", &[], true));
        store.seed_score(PairKey::new("alice", "bob"), 6.0);
        store.seed_score(PairKey::new("alice", "carol"), 6.0);
        store.seed_score(PairKey::new("alice", "dave"), 8.0);

        let ranked = ranker(&store).rank("alice").await.unwrap();
        let uids: Vec<&str> = ranked.iter().map(|c| c.profile.uid.as_str()).collect();
        // dave leads on raw score; carol beats bob on location overlap.
        assert_eq!(uids, vec!["dave", "carol", "bob"]);
    }

    #[tokio::test]
    async fn caps_the_candidate_list() {
        let store = Arc::new(MemoryStore::default());
        store.add_profile(profile("alice", &[], true));
        for i in 0..6 {
            store.add_profile(profile(&format!("user{}", i), &[], true));
        }

        let ranked = ranker(&store).rank("alice").await.unwrap();
        assert_eq!(ranked.len(), MAX_CANDIDATES);
    }

    #[tokio::test]
    async fn unknown_requester_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        assert!(matches!(
            ranker(&store).rank("ghost").await,
            Err(Error::NotFound(_))
        ));
    }
}
