//! End-to-end engine tests over the in-memory store: proposal generation,
//! the double-opt-in state machine, and its concurrency guarantees.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use mesa_core::{
    AcceptResult, AvailabilityRepository, Error, EventBus, PairKey, ProposalStatus,
    SeededRandomizer, TimeLabel, UserProfile,
};
use mesa_engine::testing::MemoryStore;
use mesa_engine::Matchmaker;

fn profile(uid: &str, contact: &str) -> UserProfile {
    UserProfile {
        uid: uid.to_string(),
        display_name: Some(uid.to_uppercase()),
        topics: ["food"].iter().map(|s| s.to_string()).collect(),
        diet: None,
        favorite_locations: ["cafeteria"].iter().map(|s| s.to_string()).collect(),
        contact_detail: Some(contact.to_string()),
        survey_completed: true,
    }
}

fn slots(days: &[(&str, &[&str])]) -> BTreeMap<NaiveDate, BTreeSet<TimeLabel>> {
    days.iter()
        .map(|(day, labels)| {
            (
                day.parse().unwrap(),
                labels.iter().map(|l| l.parse().unwrap()).collect(),
            )
        })
        .collect()
}

fn matchmaker(store: &Arc<MemoryStore>, seed: u64) -> Arc<Matchmaker> {
    Arc::new(Matchmaker::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(SeededRandomizer::new(seed)),
        EventBus::default(),
    ))
}

/// Two users with overlapping lunch availability on 2023-08-01.
async fn seed_pair(store: &Arc<MemoryStore>) {
    store.add_profile(profile("alice", "alice@example.com"));
    store.add_profile(profile("bob", "bob@example.com"));
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
    AvailabilityRepository::put(
        store.as_ref(),
        "alice",
        reference,
        slots(&[("2023-08-01", &["12:00", "12:30", "13:00"])]),
        false,
    )
    .await
    .unwrap();
    AvailabilityRepository::put(
        store.as_ref(),
        "bob",
        reference,
        slots(&[("2023-08-01", &["12:30", "13:00", "13:30"])]),
        false,
    )
    .await
    .unwrap();
}

async fn propose_one(engine: &Arc<Matchmaker>) -> Uuid {
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
    let views = engine.rank_and_propose("alice", reference).await.unwrap();
    assert_eq!(views.len(), 1);
    views[0].id
}

#[tokio::test]
async fn proposal_time_lies_in_both_availabilities() {
    for seed in 0..30 {
        let store = Arc::new(MemoryStore::default());
        seed_pair(&store).await;
        let engine = matchmaker(&store, seed);
        let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();

        let views = engine.rank_and_propose("alice", reference).await.unwrap();
        assert_eq!(views.len(), 1);
        let time = views[0].proposed_time;
        assert_eq!(time.date().to_string(), "2023-08-01");
        let slot = time.time().format("%H:%M").to_string();
        assert!(
            slot == "12:30" || slot == "13:00",
            "seed {} picked {}",
            seed,
            slot
        );
    }
}

#[tokio::test]
async fn pending_proposals_suppress_regeneration() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 7);
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();

    let first = engine.rank_and_propose("alice", reference).await.unwrap();
    let second = engine.rank_and_propose("alice", reference).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    // Same proposal comes back hydrated instead of a new one.
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(second[0].candidate.uid, "bob");
}

#[tokio::test]
async fn no_overlap_means_no_proposal() {
    let store = Arc::new(MemoryStore::default());
    store.add_profile(profile("alice", "alice@example.com"));
    store.add_profile(profile("bob", "bob@example.com"));
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
    AvailabilityRepository::put(
        store.as_ref(),
        "alice",
        reference,
        slots(&[("2023-08-01", &["09:00"])]),
        false,
    )
    .await
    .unwrap();
    AvailabilityRepository::put(
        store.as_ref(),
        "bob",
        reference,
        slots(&[("2023-08-01", &["18:00"])]),
        false,
    )
    .await
    .unwrap();

    let engine = matchmaker(&store, 1);
    let views = engine.rank_and_propose("alice", reference).await.unwrap();
    assert!(views.is_empty());
}

#[tokio::test]
async fn recurring_template_feeds_negotiation() {
    let store = Arc::new(MemoryStore::default());
    store.add_profile(profile("alice", "alice@example.com"));
    store.add_profile(profile("bob", "bob@example.com"));
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
    AvailabilityRepository::put(
        store.as_ref(),
        "alice",
        reference,
        slots(&[("2023-08-01", &["12:30"])]),
        false,
    )
    .await
    .unwrap();
    // Bob only has a recurring template, declared in a January week; its
    // Tuesday must remap onto 2023-08-01.
    AvailabilityRepository::put(
        store.as_ref(),
        "bob",
        NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
        slots(&[("2023-01-03", &["12:30", "13:00"])]),
        true,
    )
    .await
    .unwrap();

    let engine = matchmaker(&store, 3);
    let views = engine.rank_and_propose("alice", reference).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].proposed_time.to_string(), "2023-08-01 12:30:00");
}

#[tokio::test]
async fn mutual_accept_reveals_contact_to_the_second_acceptor() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 11);
    let id = propose_one(&engine).await;

    let first = engine.accept("alice", id).await.unwrap();
    assert_eq!(first.status, AcceptResult::Accepted);
    assert_eq!(first.revealed_contact, None);

    let second = engine.accept("bob", id).await.unwrap();
    assert_eq!(second.status, AcceptResult::Matched);
    assert_eq!(second.revealed_contact.as_deref(), Some("alice@example.com"));

    let stored = store.proposal(id).unwrap();
    assert_eq!(stored.status, ProposalStatus::Matched);
    assert_eq!(stored.acceptances.len(), 2);
    assert!(stored.acceptances["alice"].was_first);
    assert!(!stored.acceptances["bob"].was_first);

    // Completion notified the first acceptor, and the +1/+3 adjustments
    // landed on the baseline.
    let notifications = store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, "alice");
    let score = engine.get_score("alice", "bob").await.unwrap();
    let baseline = mesa_engine::baseline(&profile("alice", "x"), &profile("bob", "y"));
    let expected = ((baseline + 1.0).clamp(0.0, 10.0) + 3.0).clamp(0.0, 10.0);
    assert_eq!(score, expected);
}

#[tokio::test]
async fn accept_order_is_symmetric() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 13);
    let id = propose_one(&engine).await;

    // Candidate first, initiator second.
    let first = engine.accept("bob", id).await.unwrap();
    assert_eq!(first.status, AcceptResult::Accepted);
    let second = engine.accept("alice", id).await.unwrap();
    assert_eq!(second.status, AcceptResult::Matched);
    assert_eq!(second.revealed_contact.as_deref(), Some("bob@example.com"));
}

#[tokio::test]
async fn re_accept_after_match_is_idempotent() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 17);
    let id = propose_one(&engine).await;

    engine.accept("alice", id).await.unwrap();
    engine.accept("bob", id).await.unwrap();
    let before = store.proposal(id).unwrap();
    let score_before = engine.get_score("alice", "bob").await.unwrap();

    let again = engine.accept("alice", id).await.unwrap();
    assert_eq!(again.status, AcceptResult::AlreadyMatched);
    assert_eq!(again.revealed_contact.as_deref(), Some("bob@example.com"));

    let after = store.proposal(id).unwrap();
    assert_eq!(after.acceptances, before.acceptances);
    assert_eq!(after.version, before.version);
    assert_eq!(engine.get_score("alice", "bob").await.unwrap(), score_before);
}

#[tokio::test]
async fn double_accept_from_same_party_does_not_match() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 19);
    let id = propose_one(&engine).await;

    engine.accept("alice", id).await.unwrap();
    let again = engine.accept("alice", id).await.unwrap();
    assert_eq!(again.status, AcceptResult::Accepted);
    assert_eq!(again.revealed_contact, None);
    assert_eq!(store.proposal(id).unwrap().status, ProposalStatus::Accepted);
}

#[tokio::test]
async fn declined_proposals_cannot_be_revived() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 23);
    let id = propose_one(&engine).await;

    engine.decline("bob", id).await.unwrap();
    assert!(matches!(
        engine.accept("alice", id).await,
        Err(Error::InvalidState(_))
    ));
    // Declining again is idempotent.
    engine.decline("alice", id).await.unwrap();
    assert_eq!(store.proposal(id).unwrap().status, ProposalStatus::Declined);
}

#[tokio::test]
async fn matched_proposals_cannot_be_declined() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 29);
    let id = propose_one(&engine).await;

    engine.accept("alice", id).await.unwrap();
    engine.accept("bob", id).await.unwrap();
    assert!(matches!(
        engine.decline("bob", id).await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(store.proposal(id).unwrap().status, ProposalStatus::Matched);
}

#[tokio::test]
async fn strangers_are_rejected_and_missing_proposals_are_not_found() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    store.add_profile(profile("mallory", "mallory@example.com"));
    let engine = matchmaker(&store, 31);
    let id = propose_one(&engine).await;

    assert!(matches!(
        engine.accept("mallory", id).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        engine.decline("mallory", id).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        engine.decline("alice", Uuid::now_v7()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn decline_applies_negative_adjustment() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 37);
    let id = propose_one(&engine).await;

    let before = engine.get_score("alice", "bob").await.unwrap();
    engine.decline("bob", id).await.unwrap();
    assert_eq!(engine.get_score("alice", "bob").await.unwrap(), before - 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_produce_exactly_one_first_and_a_match() {
    // Run the race repeatedly: whatever the interleaving, exactly one
    // acceptance observes was_first and the final state is matched with
    // both entries present.
    for round in 0..50 {
        let store = Arc::new(MemoryStore::default());
        seed_pair(&store).await;
        let engine = matchmaker(&store, round);
        let id = propose_one(&engine).await;

        let e1 = engine.clone();
        let e2 = engine.clone();
        let a = tokio::spawn(async move { e1.accept("alice", id).await });
        let b = tokio::spawn(async move { e2.accept("bob", id).await });
        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        let statuses = [ra.status, rb.status];
        assert!(
            statuses.contains(&AcceptResult::Accepted) && statuses.contains(&AcceptResult::Matched),
            "round {}: got {:?}",
            round,
            statuses
        );
        // Only the completing acceptance reveals a contact.
        let reveals = [&ra, &rb]
            .iter()
            .filter(|o| o.revealed_contact.is_some())
            .count();
        assert_eq!(reveals, 1, "round {}", round);

        let stored = store.proposal(id).unwrap();
        assert_eq!(stored.status, ProposalStatus::Matched);
        assert_eq!(stored.acceptances.len(), 2);
        let firsts = stored
            .acceptances
            .values()
            .filter(|a| a.was_first)
            .count();
        assert_eq!(firsts, 1, "round {}", round);

        // +1 then +3 on top of the baseline, clamped, regardless of
        // interleaving.
        let score = engine.get_score("alice", "bob").await.unwrap();
        let baseline = mesa_engine::baseline(&profile("alice", "x"), &profile("bob", "y"));
        let expected = ((baseline + 1.0).clamp(0.0, 10.0) + 3.0).clamp(0.0, 10.0);
        assert_eq!(score, expected, "round {}", round);
    }
}

#[tokio::test]
async fn score_ledger_failure_does_not_block_transitions() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    let engine = matchmaker(&store, 41);
    let id = propose_one(&engine).await;

    store.fail_score_writes(true);
    let first = engine.accept("alice", id).await.unwrap();
    assert_eq!(first.status, AcceptResult::Accepted);
    let second = engine.accept("bob", id).await.unwrap();
    assert_eq!(second.status, AcceptResult::Matched);
    assert_eq!(store.proposal(id).unwrap().status, ProposalStatus::Matched);
}

#[tokio::test]
async fn zero_scored_pairs_are_never_proposed() {
    let store = Arc::new(MemoryStore::default());
    seed_pair(&store).await;
    store.seed_score(PairKey::new("alice", "bob"), 0.0);
    let engine = matchmaker(&store, 43);
    let reference = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();

    let views = engine.rank_and_propose("alice", reference).await.unwrap();
    assert!(views.is_empty());
}
