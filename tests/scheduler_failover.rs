//! Lane scheduling integration tests
//!
//! Drives the scheduler against scripted models and checks retries,
//! failover, the per-run primary flag and cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dailybrief::calibrate::TierCalibrator;
use dailybrief::domain::{ContentKind, ItemStatus, RawItem};
use dailybrief::llm::{ModelError, ScriptedModel};
use dailybrief::scheduler::{
    LaneConfig, LaneId, LaneSet, ProviderLane, RecordingClock, Scheduler, SchedulerConfig, WriteFunnel,
};
use dailybrief::store::{SqliteStore, Store};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn items(prefix: &str, n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| {
            RawItem::new(
                format!("{}-src{}", prefix, i),
                "Source",
                ContentKind::Video,
                format!("Episode {}", i),
                format!("https://example.com/{}/{}", prefix, i),
                Utc::now(),
                Some("transcript".to_string()),
            )
            .with_word_count(6000)
        })
        .collect()
}

fn model(name: &str) -> ScriptedModel {
    ScriptedModel::new(
        name,
        json!({
            "core_summary": "A summary.",
            "key_insights": ["one"],
            "tier": "worth_a_look",
            "freshness": "fresh",
            "content_type": "interview"
        }),
    )
}

fn rate_limited() -> Result<serde_json::Value, ModelError> {
    Err(ModelError::RateLimited { retry_after: None })
}

fn lane(id: LaneId, model: &Arc<ScriptedModel>, concurrency: usize) -> ProviderLane {
    ProviderLane::new(id, model.clone(), LaneConfig::new(concurrency))
}

fn all_on_primary() -> SchedulerConfig {
    SchedulerConfig {
        primary_share: 1.0,
        seed: Some(11),
        ..Default::default()
    }
}

fn funnel_with(batch: &[RawItem]) -> WriteFunnel<SqliteStore> {
    let mut store = SqliteStore::open_in_memory().unwrap();
    for item in batch {
        store.save_raw(item).unwrap();
    }
    WriteFunnel::new(store, TierCalibrator::default())
}

fn status(store: &SqliteStore, item: &RawItem) -> ItemStatus {
    store.get_raw(&item.id).unwrap().unwrap().status
}

#[tokio::test]
async fn test_rate_limits_flip_primary_for_the_run() {
    let a = Arc::new(model("lane-a").script(vec![rate_limited(), rate_limited(), rate_limited()]));
    let b = Arc::new(model("lane-b"));
    let clock = Arc::new(RecordingClock::new());
    let scheduler = Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 1)), Some(lane(LaneId::B, &b, 1))), all_on_primary())
        .with_clock(clock.clone());
    let batch = items("flip", 4);

    let (store, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(30), Duration::from_secs(60), Duration::from_secs(90)]
    );
    assert!(report.flipped);
    assert_eq!(report.configured_primary, Some(LaneId::A));
    assert_eq!(report.final_primary, Some(LaneId::B));
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 4);
    assert_eq!(report.funnel.succeeded, 4);
    assert_eq!(report.progress.rerouted, 1);
    assert_eq!(report.funnel.per_lane.get(&LaneId::B).map(|t| t.succeeded), Some(4));
    for item in &batch {
        assert_eq!(status(&store, item), ItemStatus::Processed);
    }

    // A new run starts from the configured weighting again
    let next = items("next", 2);
    let (_, report) = scheduler
        .run(next.clone(), funnel_with(&next), CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.flipped);
    assert_eq!(report.final_primary, Some(LaneId::A));
    assert_eq!(a.calls(), 5);
    assert_eq!(b.calls(), 4);
}

#[tokio::test]
async fn test_secondary_exhaustion_does_not_move_primary() {
    let a = Arc::new(model("lane-a"));
    let b = Arc::new(model("lane-b").script(vec![rate_limited(), rate_limited(), rate_limited()]));
    let clock = Arc::new(RecordingClock::new());
    let scheduler = Scheduler::new(
        LaneSet::new(Some(lane(LaneId::A, &a, 1)), Some(lane(LaneId::B, &b, 1))),
        SchedulerConfig {
            primary_share: 0.0,
            seed: Some(5),
            ..Default::default()
        },
    )
    .with_clock(clock.clone());
    let batch = items("secondary", 2);

    let (_, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.secondary_planned, 2);
    assert!(!report.flipped);
    assert_eq!(report.final_primary, Some(LaneId::A));
    assert_eq!(report.progress.rerouted, 1);
    assert_eq!(report.funnel.succeeded, 2);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 4);
}

#[tokio::test]
async fn test_transient_errors_back_off_one_two_four() {
    let server_error = || {
        Err(ModelError::Server {
            status: 503,
            message: "unavailable".into(),
        })
    };
    let a = Arc::new(model("lane-a").script(vec![server_error(), server_error(), server_error(), server_error()]));
    let b = Arc::new(model("lane-b"));
    let clock = Arc::new(RecordingClock::new());
    let scheduler = Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 1)), Some(lane(LaneId::B, &b, 1))), all_on_primary())
        .with_clock(clock.clone());
    let batch = items("transient", 1);

    let (store, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(a.calls(), 4);
    assert_eq!(b.calls(), 0);
    assert!(!report.flipped);
    assert_eq!(report.funnel.failed, 1);
    assert_eq!(status(&store, &batch[0]), ItemStatus::Failed);
}

#[tokio::test]
async fn test_quota_exhaustion_reroutes_without_waiting() {
    let a = Arc::new(model("lane-a").script(vec![Err(ModelError::QuotaExhausted("limit: 0".into()))]));
    let b = Arc::new(model("lane-b"));
    let clock = Arc::new(RecordingClock::new());
    let scheduler = Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 1)), Some(lane(LaneId::B, &b, 1))), all_on_primary())
        .with_clock(clock.clone());
    let batch = items("quota", 1);

    let (_, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert!(clock.sleeps().is_empty());
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(report.funnel.succeeded, 1);
    assert!(report.flipped);
}

#[tokio::test]
async fn test_single_lane_exhaustion_fails_item() {
    let a = Arc::new(model("lane-a").script(vec![rate_limited(), rate_limited(), rate_limited()]));
    let clock = Arc::new(RecordingClock::new());
    let scheduler =
        Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 2)), None), all_on_primary()).with_clock(clock.clone());
    let batch = items("single", 1);

    let (store, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(clock.total(), Duration::from_secs(180));
    assert_eq!(a.calls(), 3);
    assert_eq!(report.funnel.failed, 1);
    assert!(!report.flipped);
    assert_eq!(status(&store, &batch[0]), ItemStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_lane_concurrency_is_bounded() {
    let a = Arc::new(model("lane-a").with_delay(Duration::from_secs(1)));
    let b = Arc::new(model("lane-b").with_delay(Duration::from_secs(1)));
    let scheduler = Scheduler::new(
        LaneSet::new(Some(lane(LaneId::A, &a, 2)), Some(lane(LaneId::B, &b, 1))),
        SchedulerConfig {
            seed: Some(3),
            ..Default::default()
        },
    )
    .with_clock(Arc::new(RecordingClock::new()));
    let batch = items("bound", 10);

    let (_, report) = scheduler
        .run(batch.clone(), funnel_with(&batch), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.funnel.succeeded, 10);
    assert_eq!(a.calls(), 7);
    assert_eq!(b.calls(), 3);
    assert_eq!(a.max_in_flight(), 2);
    assert_eq!(b.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_lets_in_flight_calls_finish() {
    let a = Arc::new(model("lane-a").with_delay(Duration::from_secs(1)));
    let scheduler = Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 1)), None), all_on_primary())
        .with_clock(Arc::new(RecordingClock::new()));
    let batch = items("cancel", 3);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trigger.cancel();
    });

    let (store, report) = scheduler.run(batch.clone(), funnel_with(&batch), cancel).await.unwrap();

    assert_eq!(a.calls(), 2);
    assert_eq!(report.funnel.succeeded, 2);
    assert_eq!(report.funnel.cancelled, 1);
    let pending = batch.iter().filter(|i| status(&store, i) == ItemStatus::Pending).count();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_cancelled_before_start_dispatches_nothing() {
    let a = Arc::new(model("lane-a"));
    let scheduler = Scheduler::new(LaneSet::new(Some(lane(LaneId::A, &a, 4)), None), all_on_primary())
        .with_clock(Arc::new(RecordingClock::new()));
    let batch = items("early", 5);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (store, report) = scheduler.run(batch.clone(), funnel_with(&batch), cancel).await.unwrap();

    assert_eq!(a.calls(), 0);
    assert_eq!(report.funnel.cancelled, 5);
    for item in &batch {
        assert_eq!(status(&store, item), ItemStatus::Pending);
    }
}
