//! Slot and location negotiation between two availability profiles.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::trace;

use mesa_core::{AvailabilityProfile, Randomizer, TimeLabel, UserProfile};

/// Fallback locations when neither party has stated favorites.
pub const DEFAULT_LOCATIONS: &[&str] = &["Campus cafeteria", "Market hall", "Station food court"];

/// Finds a concrete overlapping slot and a location for a pairing.
#[derive(Clone)]
pub struct SlotNegotiator {
    rng: Arc<dyn Randomizer>,
}

impl SlotNegotiator {
    pub fn new(rng: Arc<dyn Randomizer>) -> Self {
        SlotNegotiator { rng }
    }

    /// First non-empty slot intersection over the requester's days in
    /// randomized order (avoids day-1 bias across repeated calls), with a
    /// uniformly random slot from that intersection.
    ///
    /// `None` means no overlap exists and the pairing must be skipped:
    /// every created proposal's time lies in both parties' declared
    /// availability for that day.
    pub fn negotiate(
        &self,
        ours: &AvailabilityProfile,
        theirs: &AvailabilityProfile,
    ) -> Option<NaiveDateTime> {
        let days: Vec<_> = ours.slots_by_day.keys().copied().collect();
        for index in self.rng.permutation(days.len()) {
            let day = days[index];
            let our_slots = ours.slots_by_day.get(&day)?;
            let Some(their_slots) = theirs.slots_by_day.get(&day) else {
                continue;
            };
            let shared: Vec<TimeLabel> = our_slots.intersection(their_slots).copied().collect();
            if let Some(pick) = self.rng.pick_index(shared.len()) {
                return Some(shared[pick].on_day(day));
            }
            trace!(%day, "no slot overlap on day, trying next");
        }
        None
    }

    /// Uniformly random pick from the shared favorite locations; falls
    /// back to the candidate's favorites, then to the fixed default list.
    pub fn choose_location(&self, requester: &UserProfile, candidate: &UserProfile) -> String {
        let shared: Vec<&String> = requester
            .favorite_locations
            .intersection(&candidate.favorite_locations)
            .collect();
        if let Some(pick) = self.rng.pick_index(shared.len()) {
            return shared[pick].clone();
        }

        let theirs: Vec<&String> = candidate.favorite_locations.iter().collect();
        if let Some(pick) = self.rng.pick_index(theirs.len()) {
            return theirs[pick].clone();
        }

        let pick = self
            .rng
            .pick_index(DEFAULT_LOCATIONS.len())
            .unwrap_or_default();
        DEFAULT_LOCATIONS[pick].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mesa_core::{SeededRandomizer, ThreadRandomizer};
    use std::collections::{BTreeMap, BTreeSet};

    fn availability(uid: &str, days: &[(&str, &[&str])]) -> AvailabilityProfile {
        let mut slots_by_day = BTreeMap::new();
        for (day, labels) in days {
            let day: NaiveDate = day.parse().unwrap();
            let set: BTreeSet<TimeLabel> = labels.iter().map(|l| l.parse().unwrap()).collect();
            slots_by_day.insert(day, set);
        }
        AvailabilityProfile {
            user_id: uid.to_string(),
            recurring: false,
            week_start: None,
            slots_by_day,
        }
    }

    fn locations_profile(uid: &str, locations: &[&str]) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            favorite_locations: locations.iter().map(|s| s.to_string()).collect(),
            ..UserProfile::default()
        }
    }

    #[test]
    fn negotiated_slot_lies_in_both_availabilities() {
        let a = availability("alice", &[("2023-08-01", &["12:00", "12:30", "13:00"])]);
        let b = availability("bob", &[("2023-08-01", &["12:30", "13:00", "13:30"])]);

        // Any seed must land on a shared slot, never 12:00 or 13:30.
        for seed in 0..50 {
            let negotiator = SlotNegotiator::new(Arc::new(SeededRandomizer::new(seed)));
            let time = negotiator.negotiate(&a, &b).unwrap();
            assert_eq!(time.date().to_string(), "2023-08-01");
            let slot = time.time().format("%H:%M").to_string();
            assert!(slot == "12:30" || slot == "13:00", "picked {}", slot);
        }
    }

    #[test]
    fn negotiation_skips_days_without_overlap() {
        let a = availability(
            "alice",
            &[
                ("2023-08-01", &["09:00"]),
                ("2023-08-02", &["12:00", "12:30"]),
            ],
        );
        let b = availability("bob", &[("2023-08-02", &["12:30"])]);

        for seed in 0..20 {
            let negotiator = SlotNegotiator::new(Arc::new(SeededRandomizer::new(seed)));
            let time = negotiator.negotiate(&a, &b).unwrap();
            assert_eq!(time.to_string(), "2023-08-02 12:30:00");
        }
    }

    #[test]
    fn no_overlap_yields_none() {
        let a = availability("alice", &[("2023-08-01", &["09:00", "09:30"])]);
        let b = availability("bob", &[("2023-08-01", &["18:00"])]);
        let negotiator = SlotNegotiator::new(Arc::new(ThreadRandomizer));
        assert!(negotiator.negotiate(&a, &b).is_none());
    }

    #[test]
    fn empty_profiles_yield_none() {
        let a = availability("alice", &[]);
        let b = availability("bob", &[("2023-08-01", &["12:00"])]);
        let negotiator = SlotNegotiator::new(Arc::new(ThreadRandomizer));
        assert!(negotiator.negotiate(&a, &b).is_none());
        assert!(negotiator.negotiate(&b, &a).is_none());
    }

    #[test]
    fn location_prefers_shared_favorites() {
        let negotiator = SlotNegotiator::new(Arc::new(ThreadRandomizer));
        let a = locations_profile("alice", &["bakery", "cafeteria"]);
        let b = locations_profile("bob", &["cafeteria", "ramen bar"]);
        assert_eq!(negotiator.choose_location(&a, &b), "cafeteria");
    }

    #[test]
    fn location_falls_back_to_candidate_favorites() {
        let negotiator = SlotNegotiator::new(Arc::new(ThreadRandomizer));
        let a = locations_profile("alice", &["bakery"]);
        let b = locations_profile("bob", &["ramen bar"]);
        assert_eq!(negotiator.choose_location(&a, &b), "ramen bar");
    }

    #[test]
    fn location_falls_back_to_defaults() {
        let negotiator = SlotNegotiator::new(Arc::new(ThreadRandomizer));
        let a = locations_profile("alice", &[]);
        let b = locations_profile("bob", &[]);
        let chosen = negotiator.choose_location(&a, &b);
        assert!(DEFAULT_LOCATIONS.contains(&chosen.as_str()));
    }
}
