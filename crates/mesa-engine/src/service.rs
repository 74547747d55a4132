//! The matchmaking façade: ranking pipeline, proposal generation, and the
//! trigger surface exposed to external collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mesa_core::{
    AcceptOutcome, AvailabilityRepository, Error, EventBus, MatchEvent, MatchProposal,
    MatchProposalView, ProfileRepository, ProposalRepository, Randomizer, Result, ScoreRepository,
    TimeLabel,
};

use crate::ledger::ScoreLedger;
use crate::lifecycle::MatchLifecycle;
use crate::negotiator::SlotNegotiator;
use crate::ranker::CandidateRanker;

/// Entry point for every engine operation. Holds the storage seams and the
/// component pipeline; cheap to clone behind an `Arc` in server state.
pub struct Matchmaker {
    availability: Arc<dyn AvailabilityRepository>,
    profiles: Arc<dyn ProfileRepository>,
    proposals: Arc<dyn ProposalRepository>,
    ledger: ScoreLedger,
    ranker: CandidateRanker,
    negotiator: SlotNegotiator,
    lifecycle: MatchLifecycle,
    bus: EventBus,
}

impl Matchmaker {
    pub fn new(
        availability: Arc<dyn AvailabilityRepository>,
        profiles: Arc<dyn ProfileRepository>,
        scores: Arc<dyn ScoreRepository>,
        proposals: Arc<dyn ProposalRepository>,
        rng: Arc<dyn Randomizer>,
        bus: EventBus,
    ) -> Self {
        let ledger = ScoreLedger::new(scores, profiles.clone());
        let ranker = CandidateRanker::new(profiles.clone(), ledger.clone());
        let negotiator = SlotNegotiator::new(rng);
        let lifecycle = MatchLifecycle::new(
            proposals.clone(),
            profiles.clone(),
            ledger.clone(),
            bus.clone(),
        );
        Matchmaker {
            availability,
            profiles,
            proposals,
            ledger,
            ranker,
            negotiator,
            lifecycle,
            bus,
        }
    }

    /// Rank candidates and turn them into concrete pending proposals.
    ///
    /// If the user already has pending proposals, those are hydrated and
    /// returned without generating anything new — one outstanding batch at
    /// a time. Candidates without availability overlap are skipped; every
    /// persisted proposal's time lies in both parties' declared
    /// availability.
    pub async fn rank_and_propose(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
    ) -> Result<Vec<MatchProposalView>> {
        let pending = self.proposals.pending_for(user_id).await?;
        if !pending.is_empty() {
            debug!(
                user_id,
                candidate_count = pending.len(),
                "returning outstanding pending proposals"
            );
            return self.hydrate(&pending).await;
        }

        let requester = self
            .profiles
            .fetch(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user profile {}", user_id)))?;
        let Some(ours) = self.availability.get(user_id, reference_date).await? else {
            debug!(user_id, "no availability on file, nothing to propose");
            return Ok(Vec::new());
        };

        let mut views = Vec::new();
        for candidate in self.ranker.rank(user_id).await? {
            let Some(theirs) = self
                .availability
                .get(&candidate.profile.uid, reference_date)
                .await?
            else {
                continue;
            };
            let Some(time) = self.negotiator.negotiate(&ours, &theirs) else {
                debug!(
                    user_id,
                    candidate = %candidate.profile.uid,
                    "no availability overlap, skipping candidate"
                );
                continue;
            };
            let location = self.negotiator.choose_location(&requester, &candidate.profile);
            let proposal =
                MatchProposal::new(user_id, &candidate.profile.uid, time, location, candidate.score);
            match self.proposals.insert(&proposal).await {
                Ok(()) => {
                    self.bus.emit(MatchEvent::ProposalCreated {
                        proposal_id: proposal.id,
                        initiator_id: proposal.initiator_id.clone(),
                        candidate_id: proposal.candidate_id.clone(),
                    });
                    views.push(MatchProposalView::new(&proposal, &candidate.profile));
                }
                // A concurrent refresh already proposed this pair.
                Err(err) if err.is_unique_violation() => continue,
                Err(err) => return Err(err),
            }
        }
        info!(
            user_id,
            candidate_count = views.len(),
            "generated meal proposals"
        );
        Ok(views)
    }

    /// Overwrite availability, then kick the ranking pipeline as a
    /// detached task. The write's success is independent of the trigger.
    pub async fn save_availability(
        self: &Arc<Self>,
        user_id: &str,
        reference_date: NaiveDate,
        slots_by_day: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
        recurring: bool,
    ) -> Result<()> {
        self.availability
            .put(user_id, reference_date, slots_by_day, recurring)
            .await?;
        self.trigger_refresh(user_id, reference_date);
        Ok(())
    }

    /// Fire-and-forget invoke of the ranking pipeline. Failures are logged,
    /// never surfaced: the save that triggered this must not fail with it.
    pub fn trigger_refresh(self: &Arc<Self>, user_id: &str, reference_date: NaiveDate) {
        let matchmaker = Arc::clone(self);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = matchmaker.rank_and_propose(&user_id, reference_date).await {
                warn!(
                    user_id,
                    error = %err,
                    "background proposal refresh failed"
                );
            }
        });
    }

    pub async fn accept(&self, user_id: &str, proposal_id: Uuid) -> Result<AcceptOutcome> {
        self.lifecycle.accept(user_id, proposal_id).await
    }

    pub async fn decline(&self, user_id: &str, proposal_id: Uuid) -> Result<()> {
        self.lifecycle.decline(user_id, proposal_id).await
    }

    /// Read-only compatibility diagnostic.
    pub async fn get_score(&self, a: &str, b: &str) -> Result<f64> {
        self.ledger.get_score_checked(a, b).await
    }

    /// Availability read-through for the UI layer.
    pub async fn get_availability(
        &self,
        user_id: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<mesa_core::AvailabilityProfile>> {
        self.availability.get(user_id, reference_date).await
    }

    async fn hydrate(&self, proposals: &[MatchProposal]) -> Result<Vec<MatchProposalView>> {
        let mut views = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            match self.profiles.fetch(&proposal.candidate_id).await? {
                Some(candidate) => views.push(MatchProposalView::new(proposal, &candidate)),
                None => {
                    debug!(
                        proposal_id = %proposal.id,
                        candidate = %proposal.candidate_id,
                        "candidate profile missing, omitting from view"
                    );
                }
            }
        }
        Ok(views)
    }
}
