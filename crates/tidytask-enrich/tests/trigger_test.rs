//! Worker pool behavior: scheduling, coalescing, backpressure, restarts.

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use helpers::{Harness, MemoryTaskStore};
use tidytask_core::{FeatureFlag, FeatureSet};
use tidytask_enrich::trigger::{self, PipelineEvent};
use tidytask_enrich::{EnrichConfig, EnrichJob};
use tidytask_inference::MockCompletionBackend;

const REPLY: &str = r#"{"title": "Water plants", "title_changed": true, "complexity": 1}"#;

/// Wait until an event matching `pred` arrives.
async fn wait_for<F>(rx: &mut broadcast::Receiver<PipelineEvent>, mut pred: F) -> PipelineEvent
where
    F: FnMut(&PipelineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {}", e),
            }
        }
    })
    .await
    .expect("event arrived in time")
}

fn config() -> EnrichConfig {
    Harness::config().with_workers(2).with_queue_capacity(16)
}

#[tokio::test]
async fn test_enqueue_runs_pipeline_in_background() {
    let h = Harness::new(MockCompletionBackend::new().with_fixed_response(REPLY));
    let task_id = h.add_task("water plants", None);
    let mut updates = h.bus.subscribe();

    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(config())), &config());
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, task_id));

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Completed { .. })).await;
    let PipelineEvent::Completed {
        job,
        written,
        restarted,
    } = event
    else {
        unreachable!();
    };
    assert_eq!(job, EnrichJob::new(h.owner_id, task_id));
    assert_eq!(
        written,
        FeatureSet::from([FeatureFlag::CleanTitle, FeatureFlag::Complexity])
    );
    assert!(!restarted);

    let published = updates.recv().await.unwrap();
    assert_eq!(published.message.record_id, task_id);
    assert_eq!(
        h.tasks.get(task_id).unwrap().ai_cleaned_title.as_deref(),
        Some("Water plants")
    );
}

#[tokio::test]
async fn test_duplicate_trigger_is_coalesced_while_queued() {
    let h = Harness::new(
        MockCompletionBackend::new()
            .with_fixed_response(REPLY)
            .with_latency(Duration::from_millis(200)),
    );
    let first = h.add_task("water plants", None);
    let second = h.add_task("feed cat", None);
    let cfg = config().with_workers(1);

    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(cfg.clone())), &cfg);
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, first));
    wait_for(&mut events, |e| matches!(e, PipelineEvent::Started { .. })).await;

    assert!(trigger.enqueue(h.owner_id, second));
    assert!(!trigger.enqueue(h.owner_id, second));
    assert_eq!(trigger.queued(), 1);

    wait_for(
        &mut events,
        |e| matches!(e, PipelineEvent::Completed { job, .. } if job.task_id == second),
    )
    .await;
    assert_eq!(h.backend.call_count(), 2);
    assert_eq!(trigger.queued(), 0);
}

#[tokio::test]
async fn test_full_queue_drops_trigger() {
    let h = Harness::new(
        MockCompletionBackend::new()
            .with_fixed_response(REPLY)
            .with_latency(Duration::from_millis(200)),
    );
    let running = h.add_task("a", None);
    let waiting = h.add_task("b", None);
    let dropped = h.add_task("c", None);
    let cfg = config().with_workers(1).with_queue_capacity(1);

    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(cfg.clone())), &cfg);
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, running));
    wait_for(&mut events, |e| matches!(e, PipelineEvent::Started { .. })).await;

    assert!(trigger.enqueue(h.owner_id, waiting));
    assert!(!trigger.enqueue(h.owner_id, dropped));

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Dropped { .. })).await;
    assert_eq!(
        event,
        PipelineEvent::Dropped {
            job: EnrichJob::new(h.owner_id, dropped)
        }
    );
}

#[tokio::test]
async fn test_content_change_schedules_bounded_restart() {
    let tasks = MemoryTaskStore::default();
    let task_id = Uuid::new_v4();
    let editor = tasks.clone();
    let edited = Arc::new(AtomicBool::new(false));
    let backend = MockCompletionBackend::new()
        .with_fixed_response(REPLY)
        .with_hook(move |_| {
            if !edited.swap(true, Ordering::SeqCst) {
                editor.edit_title(task_id, "water the plants");
            }
        });
    let h = Harness::with_tasks(tasks, backend);
    h.insert_task(task_id, "water plants", None);

    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(config())), &config());
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, task_id));

    let first = wait_for(&mut events, |e| matches!(e, PipelineEvent::Completed { .. })).await;
    assert!(matches!(
        first,
        PipelineEvent::Completed { job, restarted: true, .. } if job.depth == 0
    ));

    let second = wait_for(&mut events, |e| matches!(e, PipelineEvent::Completed { .. })).await;
    let PipelineEvent::Completed { job, written, .. } = second else {
        unreachable!();
    };
    assert_eq!(job.depth, 1);
    assert!(written.contains(FeatureFlag::CleanTitle));

    let row = h.tasks.get(task_id).unwrap();
    assert_eq!(row.title, "water the plants");
    assert_eq!(row.ai_cleaned_title.as_deref(), Some("Water plants"));
    assert_eq!(h.backend.call_count(), 2);
}

#[tokio::test]
async fn test_missing_task_emits_skipped() {
    let h = Harness::new(MockCompletionBackend::new());
    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(config())), &config());
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, Uuid::new_v4()));

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Skipped { .. })).await;
    assert!(matches!(event, PipelineEvent::Skipped { reason, .. } if reason.as_str() == "missing"));
}

#[tokio::test]
async fn test_disabled_trigger_accepts_nothing() {
    let h = Harness::new(MockCompletionBackend::new());
    let task_id = h.add_task("water plants", None);
    let cfg = config().with_enabled(false);

    let (trigger, handle) = trigger::start(Arc::new(h.pipeline_with(cfg.clone())), &cfg);

    assert!(!trigger.enqueue(h.owner_id, task_id));
    handle.shutdown_and_wait().await.unwrap();
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn test_shutdown_after_pool_stopped_is_ok() {
    let h = Harness::new(MockCompletionBackend::new());
    let cfg = config().with_enabled(false);

    let (_trigger, handle) = trigger::start(Arc::new(h.pipeline_with(cfg.clone())), &cfg);

    // The second signal only resolves once the dispatcher has exited.
    handle.shutdown().await.unwrap();
    handle.shutdown().await.unwrap();
    handle.shutdown().await.unwrap();
    handle.shutdown_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_runs() {
    let h = Harness::new(
        MockCompletionBackend::new()
            .with_fixed_response(REPLY)
            .with_latency(Duration::from_millis(100)),
    );
    let task_id = h.add_task("water plants", None);

    let (trigger, handle) = trigger::start(Arc::new(h.pipeline_with(config())), &config());
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, task_id));
    wait_for(&mut events, |e| matches!(e, PipelineEvent::Started { .. })).await;

    handle.shutdown_and_wait().await.unwrap();

    assert!(h.tasks.get(task_id).unwrap().ai_cleaned_title.is_some());
    wait_for(&mut events, |e| matches!(e, PipelineEvent::WorkerStopped)).await;
    assert!(!trigger.enqueue(h.owner_id, task_id));
}

#[tokio::test(start_paused = true)]
async fn test_run_exceeding_timeout_fails_without_writing() {
    let h = Harness::new(
        MockCompletionBackend::new()
            .with_fixed_response(REPLY)
            .with_latency(Duration::from_secs(10)),
    );
    let task_id = h.add_task("water plants", None);
    let cfg = config().with_run_timeout_secs(1);

    let (trigger, _handle) = trigger::start(Arc::new(h.pipeline_with(cfg.clone())), &cfg);
    let mut events = trigger.events();

    assert!(trigger.enqueue(h.owner_id, task_id));

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Failed { .. })).await;
    let PipelineEvent::Failed { error, .. } = event else {
        unreachable!();
    };
    assert!(error.contains("timeout"));
    assert!(h.tasks.writes().is_empty());
}
