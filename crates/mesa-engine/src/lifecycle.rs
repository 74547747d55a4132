//! Double-opt-in state machine for match proposals.
//!
//! States: `pending → accepted → matched`, with `pending/accepted →
//! declined`. `matched` and `declined` are terminal. Every transition is a
//! compare-and-swap against the proposal's version, so two concurrent
//! accepts from the two parties serialize: exactly one records
//! `was_first`, and only the second acceptance completes the match and
//! reveals contact details.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use mesa_core::{
    AcceptOutcome, AcceptResult, Acceptance, Error, EventBus, MatchEvent, MatchProposal,
    Notification, ProfileRepository, ProposalRepository, ProposalStatus, Result,
};

use crate::ledger::{ScoreLedger, DELTA_DECLINE, DELTA_FIRST_ACCEPT, DELTA_MUTUAL_MATCH};

/// Upper bound on CAS attempts. A proposal has two parties, so contention
/// resolves within one conflict per party; anything beyond this means the
/// store is misbehaving.
const MAX_CAS_ATTEMPTS: usize = 5;

/// Owns proposal records and the accept/decline state machine.
#[derive(Clone)]
pub struct MatchLifecycle {
    proposals: Arc<dyn ProposalRepository>,
    profiles: Arc<dyn ProfileRepository>,
    ledger: ScoreLedger,
    bus: EventBus,
}

impl MatchLifecycle {
    pub fn new(
        proposals: Arc<dyn ProposalRepository>,
        profiles: Arc<dyn ProfileRepository>,
        ledger: ScoreLedger,
        bus: EventBus,
    ) -> Self {
        MatchLifecycle {
            proposals,
            profiles,
            ledger,
            bus,
        }
    }

    /// Record `user_id`'s acceptance of a proposal.
    ///
    /// The first acceptance moves the proposal to `accepted`; the second
    /// completes the match and returns the counterpart's contact detail.
    /// Accepting an already-matched proposal is idempotent success;
    /// accepting a declined proposal fails with `InvalidState`.
    pub async fn accept(&self, user_id: &str, proposal_id: Uuid) -> Result<AcceptOutcome> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut proposal = self.load_for_party(user_id, proposal_id).await?;
            match proposal.status {
                ProposalStatus::Matched => {
                    // Re-acceptance is not an error; re-reveal the contact
                    // without touching acceptances or the score.
                    let contact = self.contact_of(proposal.other_party(user_id)).await?;
                    return Ok(AcceptOutcome {
                        status: AcceptResult::AlreadyMatched,
                        revealed_contact: contact,
                    });
                }
                ProposalStatus::Declined => {
                    return Err(Error::InvalidState(format!(
                        "proposal {} was declined and cannot be revived",
                        proposal_id
                    )));
                }
                ProposalStatus::Pending => {
                    let expected = proposal.version;
                    proposal.acceptances.insert(
                        user_id.to_string(),
                        Acceptance {
                            accepted_at: Utc::now(),
                            was_first: true,
                        },
                    );
                    proposal.status = ProposalStatus::Accepted;
                    proposal.version += 1;
                    if self
                        .proposals
                        .update_versioned(&proposal, expected, None)
                        .await?
                    {
                        info!(%proposal_id, user_id, status = %proposal.status, "first acceptance recorded");
                        self.ledger
                            .adjust(
                                &proposal.initiator_id,
                                &proposal.candidate_id,
                                DELTA_FIRST_ACCEPT,
                            )
                            .await;
                        self.bus.emit(MatchEvent::ProposalAccepted {
                            proposal_id,
                            user_id: user_id.to_string(),
                        });
                        return Ok(AcceptOutcome {
                            status: AcceptResult::Accepted,
                            revealed_contact: None,
                        });
                    }
                    // Version conflict: the counterpart got there first.
                    // Re-read and take the second-acceptance path.
                }
                ProposalStatus::Accepted => {
                    if proposal.acceptances.contains_key(user_id) {
                        // Same party accepting twice while waiting on the
                        // counterpart: nothing to do.
                        return Ok(AcceptOutcome {
                            status: AcceptResult::Accepted,
                            revealed_contact: None,
                        });
                    }
                    let expected = proposal.version;
                    let counterpart = proposal.other_party(user_id).to_string();
                    proposal.acceptances.insert(
                        user_id.to_string(),
                        Acceptance {
                            accepted_at: Utc::now(),
                            was_first: false,
                        },
                    );
                    proposal.status = ProposalStatus::Matched;
                    proposal.version += 1;
                    let notification = Notification::match_completed(&counterpart, &proposal);
                    if self
                        .proposals
                        .update_versioned(&proposal, expected, Some(&notification))
                        .await?
                    {
                        info!(%proposal_id, user_id, status = %proposal.status, "mutual match completed");
                        self.ledger
                            .adjust(
                                &proposal.initiator_id,
                                &proposal.candidate_id,
                                DELTA_MUTUAL_MATCH,
                            )
                            .await;
                        self.bus.emit(MatchEvent::MatchCompleted { proposal_id });
                        let contact = self.contact_of(&counterpart).await?;
                        return Ok(AcceptOutcome {
                            status: AcceptResult::Matched,
                            revealed_contact: contact,
                        });
                    }
                }
            }
        }
        Err(Error::Internal(format!(
            "proposal {} version conflicts persisted across {} attempts",
            proposal_id, MAX_CAS_ATTEMPTS
        )))
    }

    /// Decline a proposal. Idempotent on an already-declined proposal;
    /// rejected on a matched one — a completed match cannot be
    /// retroactively invalidated.
    pub async fn decline(&self, user_id: &str, proposal_id: Uuid) -> Result<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut proposal = self.load_for_party(user_id, proposal_id).await?;
            match proposal.status {
                ProposalStatus::Declined => return Ok(()),
                ProposalStatus::Matched => {
                    return Err(Error::InvalidState(format!(
                        "proposal {} is already matched and cannot be declined",
                        proposal_id
                    )));
                }
                ProposalStatus::Pending | ProposalStatus::Accepted => {
                    let expected = proposal.version;
                    proposal.status = ProposalStatus::Declined;
                    proposal.version += 1;
                    if self
                        .proposals
                        .update_versioned(&proposal, expected, None)
                        .await?
                    {
                        info!(%proposal_id, user_id, status = %proposal.status, "proposal declined");
                        self.ledger
                            .adjust(&proposal.initiator_id, &proposal.candidate_id, DELTA_DECLINE)
                            .await;
                        self.bus.emit(MatchEvent::ProposalDeclined {
                            proposal_id,
                            user_id: user_id.to_string(),
                        });
                        return Ok(());
                    }
                }
            }
        }
        Err(Error::Internal(format!(
            "proposal {} version conflicts persisted across {} attempts",
            proposal_id, MAX_CAS_ATTEMPTS
        )))
    }

    async fn load_for_party(&self, user_id: &str, proposal_id: Uuid) -> Result<MatchProposal> {
        let proposal = self
            .proposals
            .fetch(proposal_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("proposal {}", proposal_id)))?;
        if proposal.party_role(user_id).is_none() {
            return Err(Error::PermissionDenied(format!(
                "user {} is not a party to proposal {}",
                user_id, proposal_id
            )));
        }
        Ok(proposal)
    }

    async fn contact_of(&self, uid: &str) -> Result<Option<String>> {
        match self.profiles.fetch(uid).await? {
            Some(profile) => Ok(profile.contact_detail),
            None => {
                warn!(user_id = uid, "counterpart profile missing at reveal time");
                Ok(None)
            }
        }
    }
}
