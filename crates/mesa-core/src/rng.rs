//! Randomness seam for tie-break policy.
//!
//! Day shuffling and slot/location picks are random by design (to avoid
//! day-1 bias across repeated negotiations), but tests need exact outputs.
//! The engine therefore draws all randomness through [`Randomizer`]:
//! production wires [`ThreadRandomizer`], tests wire a [`SeededRandomizer`]
//! and assert concrete proposals.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Object-safe randomness source. Works on lengths/indices so the trait
/// stays object-safe while callers shuffle or pick from arbitrary slices.
pub trait Randomizer: Send + Sync {
    /// A uniformly random permutation of `0..n`.
    fn permutation(&self, n: usize) -> Vec<usize>;

    /// A uniformly random index into a slice of length `len`, or `None`
    /// when empty.
    fn pick_index(&self, len: usize) -> Option<usize>;
}

/// Production randomizer over the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandomizer;

impl Randomizer for ThreadRandomizer {
    fn permutation(&self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rand::thread_rng());
        indices
    }

    fn pick_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(rand::thread_rng().gen_range(0..len))
        }
    }
}

/// Deterministic randomizer for tests.
#[derive(Debug)]
pub struct SeededRandomizer {
    rng: Mutex<StdRng>,
}

impl SeededRandomizer {
    pub fn new(seed: u64) -> Self {
        SeededRandomizer {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Randomizer for SeededRandomizer {
    fn permutation(&self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        indices.shuffle(&mut *rng);
        indices
    }

    fn pick_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Some(rng.gen_range(0..len))
    }
}
