//! # mesa-core
//!
//! Core types, traits, and abstractions for the mesa meal-matching engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other mesa crates depend on: the domain models, the
//! error taxonomy, the storage-repository traits, the time-grid helpers,
//! the randomness seam, and the lifecycle event bus.

pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod rng;
pub mod timegrid;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, MatchEvent};
pub use models::*;
pub use rng::{Randomizer, SeededRandomizer, ThreadRandomizer};
pub use timegrid::{week_key, week_start, TimeLabel, RECURRING_KEY, SLOT_MINUTES};
pub use traits::{
    AvailabilityRepository, ProfileRepository, ProposalRepository, ScoreRepository,
};
