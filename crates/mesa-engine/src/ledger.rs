//! Priority-score ledger: lazy baselines and best-effort adjustments.
//!
//! Scores are advisory ranking signals, not correctness-critical values.
//! Reads compute-and-persist a baseline on first lookup; adjustments clamp
//! into bounds and are contractually infallible toward their callers so
//! score maintenance can never block a match-lifecycle transition.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use mesa_core::{
    CompatibilityScore, Error, PairKey, ProfileRepository, Result, ScoreRepository, UserProfile,
    BASELINE_MAX, BASELINE_MIN, SCORE_MAX, SCORE_MIDPOINT, SCORE_MIN,
};

/// Score delta on a first acceptance.
pub const DELTA_FIRST_ACCEPT: f64 = 1.0;
/// Score delta on a completed mutual match.
pub const DELTA_MUTUAL_MATCH: f64 = 3.0;
/// Score delta on a decline.
pub const DELTA_DECLINE: f64 = -1.0;

/// Dimension weight for topic-preference overlap.
const WEIGHT_TOPICS: f64 = 2.0;
/// Dimension weight for dietary exact-match.
const WEIGHT_DIET: f64 = 1.0;
/// Dimension weight for favorite-location overlap.
const WEIGHT_LOCATIONS: f64 = 1.0;

/// Persistent symmetric pairwise compatibility ledger.
#[derive(Clone)]
pub struct ScoreLedger {
    scores: Arc<dyn ScoreRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl ScoreLedger {
    pub fn new(scores: Arc<dyn ScoreRepository>, profiles: Arc<dyn ProfileRepository>) -> Self {
        ScoreLedger { scores, profiles }
    }

    /// Current score for the unordered pair, computing and persisting a
    /// baseline when no record exists. The baseline write is idempotent:
    /// concurrent first-reads converge on a single ledger row.
    pub async fn get_score(&self, a: &str, b: &str) -> Result<f64> {
        let pair = PairKey::new(a, b);
        if let Some(existing) = self.scores.get(&pair).await? {
            return Ok(existing.score);
        }

        let profile_a = self.profiles.fetch(&pair.lo).await?.unwrap_or_default();
        let profile_b = self.profiles.fetch(&pair.hi).await?.unwrap_or_default();
        let score = baseline(&profile_a, &profile_b);
        debug!(pair_key = %pair, score, "seeding baseline compatibility score");

        let stored = self
            .scores
            .insert_if_absent(CompatibilityScore {
                pair,
                score,
                last_updated: Utc::now(),
            })
            .await?;
        Ok(stored.score)
    }

    /// Apply `delta` to the pair's score, clamped to `[0, 10]`.
    ///
    /// Never raises: every failure is logged and swallowed, because score
    /// maintenance must not abort or roll back the proposal transition
    /// that triggered it.
    pub async fn adjust(&self, a: &str, b: &str, delta: f64) {
        if let Err(err) = self.try_adjust(a, b, delta).await {
            warn!(
                pair_key = %PairKey::new(a, b),
                score_delta = delta,
                error = %err,
                "score adjustment failed; continuing without it"
            );
        }
    }

    async fn try_adjust(&self, a: &str, b: &str, delta: f64) -> Result<()> {
        let pair = PairKey::new(a, b);
        let current = self.get_score(a, b).await?;
        let next = (current + delta).clamp(SCORE_MIN, SCORE_MAX);
        self.scores
            .put(CompatibilityScore {
                pair,
                score: next,
                last_updated: Utc::now(),
            })
            .await
    }

    /// Validation hook for diagnostics: surfaces storage errors instead of
    /// swallowing them. Only the read path uses this.
    pub async fn get_score_checked(&self, a: &str, b: &str) -> Result<f64> {
        if a == b {
            return Err(Error::InvalidInput(
                "cannot score a user against themselves".to_string(),
            ));
        }
        self.get_score(a, b).await
    }
}

/// Weighted survey-overlap heuristic, normalized to `0..=10` per dimension
/// and clamped to the conservative `[3, 7]` band so outcome reinforcement
/// has room to move in both directions.
///
/// Dimensions missing data on either side contribute zero weight (not zero
/// score); with no populated dimension at all the midpoint default (5) is
/// returned.
pub fn baseline(a: &UserProfile, b: &UserProfile) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    if !a.topics.is_empty() && !b.topics.is_empty() {
        weighted_sum += WEIGHT_TOPICS * jaccard(&a.topics, &b.topics) * SCORE_MAX;
        total_weight += WEIGHT_TOPICS;
    }

    if let (Some(diet_a), Some(diet_b)) = (&a.diet, &b.diet) {
        let sub = if diet_a == diet_b { SCORE_MAX } else { 0.0 };
        weighted_sum += WEIGHT_DIET * sub;
        total_weight += WEIGHT_DIET;
    }

    if !a.favorite_locations.is_empty() && !b.favorite_locations.is_empty() {
        weighted_sum +=
            WEIGHT_LOCATIONS * jaccard(&a.favorite_locations, &b.favorite_locations) * SCORE_MAX;
        total_weight += WEIGHT_LOCATIONS;
    }

    if total_weight == 0.0 {
        return SCORE_MIDPOINT;
    }
    (weighted_sum / total_weight).clamp(BASELINE_MIN, BASELINE_MAX)
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
