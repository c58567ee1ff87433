mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use common::{FailingNotifier, Notice, RecordingNotifier, actors, drain_lifecycle, giveaway, next_lifecycle};
use raffler::clock::ManualClock;
use raffler::error::SchedulerError;
use raffler::scheduler::{FinalizeOutcome, Membership};
use raffler::store::{EntityStore, MemoryStore};
use raffler_core::ActorId;

#[tokio::test]
async fn overdue_giveaway_draws_distinct_winners() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let (notifier, mut rx) = RecordingNotifier::new();
    let scheduler = common::scheduler(store.clone(), notifier, Arc::new(ManualClock::new(now)));
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 2, TimeDelta::minutes(-1), &["A", "B", "C"]))
        .await
        .unwrap();

    let Notice::Terminal { id: done, winners } = next_lifecycle(&mut rx).await else {
        panic!("expected a terminal notification");
    };
    assert_eq!(done, id);
    assert_eq!(winners.len(), 2);
    let distinct: HashSet<_> = winners.iter().collect();
    assert_eq!(distinct.len(), 2);
    assert!(winners.iter().all(|w| actors(&["A", "B", "C"]).contains(w)));

    assert!(store.get(&id).await.unwrap().is_none());
    assert_eq!(scheduler.live_count(), 0);
}

#[tokio::test]
async fn giveaway_without_participants_ends_with_no_winners() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let (notifier, mut rx) = RecordingNotifier::new();
    let scheduler = common::scheduler(store.clone(), notifier, Arc::new(ManualClock::new(now)));
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 3, TimeDelta::hours(1), &[]))
        .await
        .unwrap();
    let outcome = scheduler.finalize(&id).await.unwrap();

    assert_eq!(outcome, Some(FinalizeOutcome::Winners(Vec::new())));
    assert_eq!(
        next_lifecycle(&mut rx).await,
        Notice::Terminal {
            id,
            winners: Vec::new()
        }
    );
}

#[tokio::test]
async fn cancel_leaves_no_trace() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let (notifier, mut rx) = RecordingNotifier::new();
    let scheduler = common::scheduler(store.clone(), notifier, Arc::new(ManualClock::new(now)));
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 1, TimeDelta::hours(1), &["A", "B"]))
        .await
        .unwrap();
    let mod_user = ActorId::new("moderator");
    assert!(scheduler.cancel(&id, &mod_user).await.unwrap());

    assert_eq!(
        next_lifecycle(&mut rx).await,
        Notice::Cancelled {
            id: id.clone(),
            by: mod_user
        }
    );
    assert!(store.is_empty());
    assert_eq!(scheduler.live_count(), 0);
    assert_eq!(scheduler.deadline(&id), None);

    assert_eq!(scheduler.finalize(&id).await.unwrap(), None);
    tokio::task::yield_now().await;
    assert!(drain_lifecycle(&mut rx).is_empty());
}

#[tokio::test]
async fn membership_changes_are_persisted_and_rendered() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let (notifier, mut rx) = RecordingNotifier::new();
    let clock = Arc::new(ManualClock::new(now));
    let scheduler = common::scheduler(store.clone(), notifier, clock.clone());
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 1, TimeDelta::hours(1), &[]))
        .await
        .unwrap();
    let amy = ActorId::new("amy");
    let bob = ActorId::new("bob");

    assert_eq!(scheduler.join(&id, &amy).await.unwrap(), Membership::Joined);
    assert_eq!(scheduler.join(&id, &bob).await.unwrap(), Membership::Joined);
    assert_eq!(scheduler.leave(&id, &amy).await.unwrap(), Membership::Left);

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.participants.iter().cloned().collect::<Vec<_>>(), vec![bob.clone()]);
    assert_eq!(rx.try_recv().unwrap(), Notice::Status(id.clone()));

    clock.advance(TimeDelta::hours(2));
    let err = scheduler.join(&id, &amy).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Closed(_)));
}

#[tokio::test]
async fn heavy_ticket_holder_usually_wins() {
    let now = Utc::now();
    let mut wins = 0;
    for seed in 0..200u64 {
        let store = Arc::new(MemoryStore::new());
        let (notifier, _rx) = RecordingNotifier::new();
        let scheduler = raffler::scheduler::LifecycleScheduler::new(
            store,
            notifier,
            raffler::scheduler::SchedulerOptions {
                scheduler: raffler::config::SchedulerConfig {
                    seed: Some(seed),
                    ..raffler::config::SchedulerConfig::default()
                },
                clock: Arc::new(ManualClock::new(now)),
                tickets: Arc::new(common::FixedTickets(
                    [(ActorId::new("whale"), 9)].into_iter().collect(),
                )),
                ..raffler::scheduler::SchedulerOptions::default()
            },
        );
        scheduler.open_for_creates();
        let id = scheduler
            .create(giveaway(now, 1, TimeDelta::hours(1), &["whale", "minnow"]))
            .await
            .unwrap();
        if let Some(FinalizeOutcome::Winners(w)) = scheduler.finalize(&id).await.unwrap() {
            if w == vec![ActorId::new("whale")] {
                wins += 1;
            }
        }
        scheduler.shutdown();
    }
    // expected share is 0.9
    assert!((150..=195).contains(&wins), "whale won {wins} of 200");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finalize_and_cancel_race_yields_one_terminal() {
    let now = Utc::now();
    for _ in 0..50 {
        let store = Arc::new(MemoryStore::new());
        let (notifier, mut rx) = RecordingNotifier::new();
        let scheduler =
            common::scheduler(store.clone(), notifier, Arc::new(ManualClock::new(now)));
        common::recover(&scheduler).await;

        let id = scheduler
            .create(giveaway(now, 1, TimeDelta::hours(1), &["A", "B"]))
            .await
            .unwrap();

        let finalizer = {
            let scheduler = Arc::clone(&scheduler);
            let id = id.clone();
            tokio::spawn(async move { scheduler.finalize(&id).await })
        };
        let canceller = {
            let scheduler = Arc::clone(&scheduler);
            let id = id.clone();
            tokio::spawn(async move { scheduler.cancel(&id, &ActorId::new("org")).await })
        };

        let finalized = finalizer.await.unwrap().unwrap().is_some();
        let cancelled = match canceller.await.unwrap() {
            Ok(done) => done,
            Err(SchedulerError::NotFound(_)) => false,
            Err(e) => panic!("unexpected cancel error: {e}"),
        };
        assert!(finalized ^ cancelled, "finalized={finalized} cancelled={cancelled}");

        let notices = drain_lifecycle(&mut rx);
        assert_eq!(notices.len(), 1, "{notices:?}");
        assert!(store.is_empty());
        assert_eq!(scheduler.live_count(), 0);
    }
}

#[tokio::test]
async fn failed_terminal_notification_keeps_the_finalize() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(FailingNotifier::default());
    let scheduler = common::scheduler(store.clone(), notifier.clone(), Arc::new(ManualClock::new(now)));
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 1, TimeDelta::hours(1), &["A"]))
        .await
        .unwrap();
    let outcome = scheduler.finalize(&id).await.unwrap();

    assert_eq!(outcome, Some(FinalizeOutcome::Winners(actors(&["A"]))));
    assert!(store.is_empty());
    assert_eq!(scheduler.live_count(), 0);
    assert_eq!(notifier.attempts(), 1);

    assert_eq!(scheduler.finalize(&id).await.unwrap(), None);
    assert_eq!(notifier.attempts(), 1);
}

#[tokio::test]
async fn failed_cancel_notification_keeps_the_cancel() {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(FailingNotifier::default());
    let scheduler = common::scheduler(store.clone(), notifier.clone(), Arc::new(ManualClock::new(now)));
    common::recover(&scheduler).await;

    let id = scheduler
        .create(giveaway(now, 1, TimeDelta::hours(1), &["A", "B"]))
        .await
        .unwrap();
    assert!(scheduler.cancel(&id, &ActorId::new("organizer")).await.unwrap());

    assert!(store.is_empty());
    assert_eq!(scheduler.live_count(), 0);
    assert_eq!(notifier.attempts(), 1);

    assert_eq!(scheduler.finalize(&id).await.unwrap(), None);
    let again = scheduler.cancel(&id, &ActorId::new("organizer")).await;
    assert!(matches!(again, Err(SchedulerError::NotFound(_))));
    assert_eq!(notifier.attempts(), 1);
}
