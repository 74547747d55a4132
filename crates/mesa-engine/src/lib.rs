//! # mesa-engine
//!
//! The matching and confirmation engine: candidate ranking, slot/location
//! negotiation, the pairwise priority-score ledger, and the double-opt-in
//! match lifecycle with at-most-one-reveal semantics.
//!
//! Everything here is generic over the `mesa-core` repository traits;
//! `mesa-db` provides the PostgreSQL backend and [`testing::MemoryStore`]
//! provides an in-memory one for tests.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mesa_core::{EventBus, ThreadRandomizer};
//! use mesa_engine::Matchmaker;
//!
//! let matchmaker = Arc::new(Matchmaker::new(
//!     db.availability.clone(),
//!     db.profiles.clone(),
//!     db.scores.clone(),
//!     db.proposals.clone(),
//!     Arc::new(ThreadRandomizer),
//!     EventBus::default(),
//! ));
//!
//! let proposals = matchmaker.rank_and_propose("uid-123", today).await?;
//! ```

pub mod ledger;
pub mod lifecycle;
pub mod negotiator;
pub mod ranker;
pub mod service;
pub mod testing;

pub use ledger::{baseline, ScoreLedger, DELTA_DECLINE, DELTA_FIRST_ACCEPT, DELTA_MUTUAL_MATCH};
pub use lifecycle::MatchLifecycle;
pub use negotiator::{SlotNegotiator, DEFAULT_LOCATIONS};
pub use ranker::{CandidateRanker, RankedCandidate, MAX_CANDIDATES};
pub use service::Matchmaker;
