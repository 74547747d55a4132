//! Core data models for the mesa matching engine.
//!
//! These types are shared across all mesa crates and represent the core
//! domain entities: availability profiles, compatibility scores, match
//! proposals, and the derived views/notifications handed to collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::timegrid::TimeLabel;

// =============================================================================
// AVAILABILITY
// =============================================================================

/// Free-time declaration for one user, either week-specific or a recurring
/// template reused for any week without its own record.
///
/// Saved wholesale on every write (never merged). Slot sets carry set
/// semantics by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityProfile {
    pub user_id: String,
    /// Template profile applied to any week without a specific record.
    pub recurring: bool,
    /// Monday of the addressed week. `None` for the recurring template.
    pub week_start: Option<NaiveDate>,
    pub slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
}

impl AvailabilityProfile {
    /// Remap a recurring template onto the week starting at `week` (a
    /// Monday). Day keys move to the matching weekday of the target week;
    /// the remap happens at read time only and is never persisted.
    pub fn resolve_for_week(&self, week: NaiveDate) -> AvailabilityProfile {
        let mut slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>> = BTreeMap::new();
        for (day, slots) in &self.slots_by_day {
            let mapped = week + Duration::days(day.weekday().num_days_from_monday() as i64);
            slots_by_day.entry(mapped).or_default().extend(slots.iter().copied());
        }
        AvailabilityProfile {
            user_id: self.user_id.clone(),
            recurring: self.recurring,
            week_start: Some(week),
            slots_by_day,
        }
    }
}

// =============================================================================
// USER PROFILES (supplied by the survey collaborator, read-only here)
// =============================================================================

/// Survey-maintained profile. The engine only reads it: preference fields
/// feed the baseline score, favorite locations feed negotiation, and
/// `contact_detail` is revealed exclusively on a completed mutual match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: Option<String>,
    /// Stated discussion-topic preferences.
    pub topics: BTreeSet<String>,
    /// Categorical dietary preference, compared for exact match.
    pub diet: Option<String>,
    pub favorite_locations: BTreeSet<String>,
    pub contact_detail: Option<String>,
    pub survey_completed: bool,
}

/// Public subset of a profile embedded in proposal views. Never carries
/// contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCard {
    pub uid: String,
    pub display_name: Option<String>,
    pub topics: BTreeSet<String>,
    pub favorite_locations: BTreeSet<String>,
}

impl From<&UserProfile> for CandidateCard {
    fn from(profile: &UserProfile) -> Self {
        CandidateCard {
            uid: profile.uid.clone(),
            display_name: profile.display_name.clone(),
            topics: profile.topics.clone(),
            favorite_locations: profile.favorite_locations.clone(),
        }
    }
}

// =============================================================================
// COMPATIBILITY SCORES
// =============================================================================

/// Canonical unordered user pair. Construction orders the two ids by string
/// comparison so each pair has exactly one ledger record regardless of
/// argument order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub lo: String,
    pub hi: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey { lo: a.to_string(), hi: b.to_string() }
        } else {
            PairKey { lo: b.to_string(), hi: a.to_string() }
        }
    }

    /// Flat storage key, `"lo|hi"`. User ids never contain `|` (they are
    /// auth-issued opaque ids).
    pub fn storage_key(&self) -> String {
        format!("{}|{}", self.lo, self.hi)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.lo, self.hi)
    }
}

/// Persistent advisory compatibility value for one unordered pair, bounded
/// to `[0, 10]`. Seeded lazily from survey overlap, nudged by match
/// outcomes, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub pair: PairKey,
    pub score: f64,
    pub last_updated: DateTime<Utc>,
}

/// Lower bound of any score.
pub const SCORE_MIN: f64 = 0.0;
/// Upper bound of any score.
pub const SCORE_MAX: f64 = 10.0;
/// Conservative floor applied to freshly computed baselines.
pub const BASELINE_MIN: f64 = 3.0;
/// Conservative ceiling applied to freshly computed baselines.
pub const BASELINE_MAX: f64 = 7.0;
/// Midpoint default when no compatibility dimension has data.
pub const SCORE_MIDPOINT: f64 = 5.0;

// =============================================================================
// MATCH PROPOSALS
// =============================================================================

/// Lifecycle state of a proposal. `Matched` and `Declined` are terminal;
/// no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Created, neither party has responded.
    Pending,
    /// Exactly one party has accepted.
    Accepted,
    /// Both parties accepted; contact details revealed.
    Matched,
    /// A party declined before completion.
    Declined,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Matched => "matched",
            ProposalStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Matched | ProposalStatus::Declined)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "accepted" => Ok(ProposalStatus::Accepted),
            "matched" => Ok(ProposalStatus::Matched),
            "declined" => Ok(ProposalStatus::Declined),
            other => Err(Error::InvalidInput(format!(
                "unknown proposal status '{}'",
                other
            ))),
        }
    }
}

/// Which side of a proposal a caller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Initiator,
    Candidate,
}

/// One recorded acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    pub accepted_at: DateTime<Utc>,
    /// True for the acceptance that moved the proposal out of `pending`.
    pub was_first: bool,
}

/// A single directed matching attempt with a concrete time and location,
/// awaiting double opt-in. Retained indefinitely as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub id: Uuid,
    pub initiator_id: String,
    pub candidate_id: String,
    pub proposed_time: NaiveDateTime,
    pub proposed_location: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    /// Compatibility score at proposal-creation time.
    pub compatibility_snapshot: f64,
    /// At most two entries, keyed by user id; one per distinct party.
    pub acceptances: BTreeMap<String, Acceptance>,
    /// Optimistic-concurrency token; bumped on every state write.
    pub version: i64,
}

impl MatchProposal {
    pub fn new(
        initiator_id: &str,
        candidate_id: &str,
        proposed_time: NaiveDateTime,
        proposed_location: String,
        compatibility_snapshot: f64,
    ) -> Self {
        MatchProposal {
            id: Uuid::now_v7(),
            initiator_id: initiator_id.to_string(),
            candidate_id: candidate_id.to_string(),
            proposed_time,
            proposed_location,
            status: ProposalStatus::Pending,
            created_at: Utc::now(),
            compatibility_snapshot,
            acceptances: BTreeMap::new(),
            version: 0,
        }
    }

    /// Role of `user_id` on this proposal, or `None` for strangers.
    pub fn party_role(&self, user_id: &str) -> Option<PartyRole> {
        if user_id == self.initiator_id {
            Some(PartyRole::Initiator)
        } else if user_id == self.candidate_id {
            Some(PartyRole::Candidate)
        } else {
            None
        }
    }

    /// The counterpart of `user_id`. Callers must have verified party
    /// membership first.
    pub fn other_party(&self, user_id: &str) -> &str {
        if user_id == self.initiator_id {
            &self.candidate_id
        } else {
            &self.initiator_id
        }
    }
}

/// Result of an accept call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptResult {
    /// First acceptance recorded; waiting on the counterpart.
    Accepted,
    /// Second acceptance completed the match.
    Matched,
    /// Proposal was already matched; idempotent success.
    AlreadyMatched,
}

/// Outcome returned to an accepting caller. `revealed_contact` is present
/// only once the proposal is matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub status: AcceptResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_contact: Option<String>,
}

/// Proposal hydrated with the counterpart's public profile subset, as
/// exposed to the UI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposalView {
    pub id: Uuid,
    pub status: ProposalStatus,
    pub proposed_time: NaiveDateTime,
    pub proposed_location: String,
    pub compatibility_snapshot: f64,
    pub created_at: DateTime<Utc>,
    pub candidate: CandidateCard,
}

impl MatchProposalView {
    pub fn new(proposal: &MatchProposal, candidate: &UserProfile) -> Self {
        MatchProposalView {
            id: proposal.id,
            status: proposal.status,
            proposed_time: proposal.proposed_time,
            proposed_location: proposal.proposed_location.clone(),
            compatibility_snapshot: proposal.compatibility_snapshot,
            created_at: proposal.created_at,
            candidate: CandidateCard::from(candidate),
        }
    }
}

// =============================================================================
// NOTIFICATIONS (derived, best-effort)
// =============================================================================

/// Best-effort artifact written alongside a completed match so the party
/// that accepted first learns the match went through. Not authoritative
/// state; its only correctness obligation is to never block the transition
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub kind: String,
    pub proposal_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Notification for the counterpart of the acceptance that completed a
    /// match.
    pub fn match_completed(recipient_id: &str, proposal: &MatchProposal) -> Self {
        Notification {
            id: Uuid::now_v7(),
            recipient_id: recipient_id.to_string(),
            kind: "match_completed".to_string(),
            proposal_id: proposal.id,
            body: format!(
                "Your meal match is confirmed for {} at {}",
                proposal.proposed_time, proposal.proposed_location
            ),
            created_at: Utc::now(),
        }
    }
}
