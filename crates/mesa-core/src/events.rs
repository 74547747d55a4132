//! Match lifecycle events and the broadcast bus.
//!
//! Lifecycle transitions publish events for downstream consumers (SSE,
//! webhooks, delivery workers). Emission is lossy and best-effort: a full
//! or receiver-less channel never blocks or fails the state transition
//! that produced the event.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Domain events emitted by the matching engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    ProposalCreated {
        proposal_id: Uuid,
        initiator_id: String,
        candidate_id: String,
    },
    ProposalAccepted {
        proposal_id: Uuid,
        user_id: String,
    },
    MatchCompleted {
        proposal_id: Uuid,
    },
    ProposalDeclined {
        proposal_id: Uuid,
        user_id: String,
    },
}

/// Broadcast bus for [`MatchEvent`]s. Cheap to clone; every subscriber gets
/// an independent receiver.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Emit an event. Send failures (no subscribers) are ignored.
    pub fn emit(&self, event: MatchEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_EVENT_CAPACITY)
    }
}
