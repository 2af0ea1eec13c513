mod helpers;

use std::sync::Arc;
use std::time::Duration;

use stockmeta::models::job::{JobId, JobStatus};
use stockmeta::models::stats::QueueStats;
use stockmeta::services::export::CSV_HEADER;
use stockmeta::services::scheduler::RunState;
use tokio_util::sync::CancellationToken;

use helpers::{named_images, scheduler_with, GatedClient, InstantClient};

#[tokio::test]
async fn test_five_images_three_slots() {
    let client = GatedClient::new();
    let (scheduler, mut settlements) = scheduler_with(client.clone(), 3);

    let created = scheduler.submit(named_images(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]));
    let ids: Vec<JobId> = created.iter().map(|job| job.id).collect();

    assert_eq!(scheduler.in_flight(), 3);
    assert_eq!(scheduler.queued(), ids[3..].to_vec());
    assert_eq!(scheduler.run_state(), RunState::Running);

    let stats = scheduler.stats();
    assert_eq!(stats.processing, 3);
    assert_eq!(stats.pending, 2);

    // One call returns: its slot is refilled by the oldest queued job.
    client.release(1);
    assert_eq!(settlements.step().await, Some(JobStatus::Completed));
    assert_eq!(scheduler.in_flight(), 3);
    assert_eq!(scheduler.queued(), vec![ids[4]]);
    assert_eq!(scheduler.job(ids[3]).unwrap().status, JobStatus::InFlight);

    client.release(4);
    for _ in 0..4 {
        assert_eq!(settlements.step().await, Some(JobStatus::Completed));
        assert!(scheduler.in_flight() <= 3);
    }

    assert!(scheduler.is_drained());
    assert_eq!(scheduler.run_state(), RunState::Idle);
    assert_eq!(client.calls(), 5);
    assert!(client.peak() <= 3);

    let stats = scheduler.stats();
    assert_eq!(stats.completed, 5);
    assert!(stats.is_batch_complete());

    let csv = scheduler.export_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], CSV_HEADER.join(","));
    assert_eq!(lines[1], "a.jpg,Analyzed a.jpg,\"stock, photo\",,");
}

#[tokio::test]
async fn test_single_slot_processes_in_submission_order() {
    let client = Arc::new(InstantClient::default());
    let (scheduler, mut settlements) = scheduler_with(client, 1);
    let created = scheduler.submit(named_images(&["1.jpg", "2.jpg", "3.jpg"]));

    for (done, job) in created.iter().enumerate() {
        assert_eq!(scheduler.job(job.id).unwrap().status, JobStatus::InFlight);
        assert_eq!(settlements.step().await, Some(JobStatus::Completed));

        let statuses: Vec<JobStatus> = scheduler.jobs().iter().map(|j| j.status).collect();
        assert!(statuses[..=done].iter().all(|s| *s == JobStatus::Completed));
    }
    assert!(scheduler.is_drained());
}

#[tokio::test]
async fn test_failed_call_does_not_block_batch() {
    let client = Arc::new(InstantClient::default());
    let (scheduler, mut settlements) = scheduler_with(client, 2);
    scheduler.submit(named_images(&["ok-1.jpg", "fail.jpg", "ok-2.jpg"]));

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(settlements.step().await);
    }
    assert_eq!(outcomes.iter().filter(|o| **o == Some(JobStatus::Failed)).count(), 1);

    let jobs = scheduler.jobs();
    assert_eq!(jobs[1].status, JobStatus::Failed);
    assert_eq!(jobs[1].error.as_deref(), Some("model rejected image"));
    assert!(jobs[1].title.is_none());

    // Failed rows export with blank metadata.
    let csv = scheduler.export_csv();
    assert!(csv.lines().any(|line| line == "fail.jpg,,,,"));

    let stats = scheduler.stats();
    assert_eq!((stats.completed, stats.failed), (2, 1));
    assert!(stats.is_batch_complete());
}

#[tokio::test]
async fn test_ticks_while_saturated_are_no_ops() {
    let client = GatedClient::new();
    let (scheduler, _settlements) = scheduler_with(client.clone(), 3);
    scheduler.submit(named_images(&["a", "b", "c", "d"]));

    for _ in 0..5 {
        assert_eq!(scheduler.tick(), 0);
    }
    assert_eq!(scheduler.start(), 0);
    assert_eq!(scheduler.in_flight(), 3);
    assert_eq!(scheduler.queue_depth(), 1);

    tokio::task::yield_now().await;
    assert!(client.calls() <= 3);
}

#[tokio::test]
async fn test_clear_discards_late_settlements() {
    let client = GatedClient::new();
    let (scheduler, mut settlements) = scheduler_with(client.clone(), 3);
    scheduler.submit(named_images(&["a", "b", "c", "d"]));
    assert_eq!(scheduler.in_flight(), 3);

    assert_eq!(scheduler.clear(), 4);
    assert!(scheduler.is_drained());
    assert_eq!(scheduler.stats(), QueueStats::default());

    // The three abandoned calls return after the clear.
    client.release(3);
    for _ in 0..3 {
        assert_eq!(settlements.step().await, None);
    }
    assert!(scheduler.jobs().is_empty());
    assert_eq!(scheduler.in_flight(), 0);

    // A fresh batch gets the full set of slots.
    let created = scheduler.submit(named_images(&["x", "y"]));
    assert_eq!(scheduler.in_flight(), 2);
    client.release(2);
    assert_eq!(settlements.step().await, Some(JobStatus::Completed));
    assert_eq!(settlements.step().await, Some(JobStatus::Completed));

    let titles: Vec<Option<String>> = created
        .iter()
        .map(|job| scheduler.job(job.id).unwrap().title)
        .collect();
    assert_eq!(titles, vec![Some("Analyzed x".to_string()), Some("Analyzed y".to_string())]);
}

#[tokio::test]
async fn test_wait_drained_with_running_loop() {
    let client = Arc::new(InstantClient::default());
    let (scheduler, settlement_loop) = scheduler_with(client.clone(), 3);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(settlement_loop.run(shutdown.clone()));

    let names: Vec<String> = (0..12).map(|i| format!("img-{i}.jpg")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    scheduler.submit(named_images(&refs));

    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_drained())
        .await
        .expect("batch should drain");

    let stats = scheduler.stats();
    assert_eq!(stats.completed, 12);
    assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 12);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_drained_signal_transitions() {
    let client = Arc::new(InstantClient::default());
    let (scheduler, mut settlements) = scheduler_with(client, 3);
    let mut drained = scheduler.subscribe_drained();
    assert!(*drained.borrow_and_update());

    scheduler.submit(named_images(&["a", "b"]));
    drained.changed().await.unwrap();
    assert!(!*drained.borrow_and_update());

    settlements.step().await;
    assert!(!drained.has_changed().unwrap());

    settlements.step().await;
    drained.changed().await.unwrap();
    assert!(*drained.borrow_and_update());
}

#[tokio::test]
async fn test_empty_submission_stays_drained() {
    let client = Arc::new(InstantClient::default());
    let (scheduler, _settlements) = scheduler_with(client.clone(), 3);

    assert!(scheduler.submit(Vec::new()).is_empty());
    assert!(scheduler.is_drained());
    assert_eq!(scheduler.run_state(), RunState::Idle);
    assert_eq!(scheduler.export_csv(), CSV_HEADER.join(","));
}
