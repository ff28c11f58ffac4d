use syllabus_core::models::SyncErrorKind;
use syllabus_core::stream::{ProgressEvent, ProgressEventKind, ProgressLevel, RunStreamManager};

#[tokio::test]
async fn late_subscriber_replays_history_in_publish_order() {
    let manager = RunStreamManager::new();
    let run_id = manager.create_run().await;

    manager
        .publish(&run_id, ProgressEvent::status("Pipeline started (full)."))
        .await;
    manager
        .publish(
            &run_id,
            ProgressEvent::log("Fetched 3 courses.", ProgressLevel::Info),
        )
        .await;

    let mut receiver = manager.subscribe(&run_id).await.expect("subscribe");
    let first = receiver.recv().await.expect("replayed status");
    assert_eq!(first.event, ProgressEventKind::Status);
    assert_eq!(first.message, "Pipeline started (full).");
    let second = receiver.recv().await.expect("replayed log");
    assert_eq!(second.message, "Fetched 3 courses.");

    // Live events continue on the same channel.
    manager
        .publish(
            &run_id,
            ProgressEvent::log("Persisting records.", ProgressLevel::Info),
        )
        .await;
    let third = receiver.recv().await.expect("live event");
    assert_eq!(third.message, "Persisting records.");

    // History holds everything published so far, without duplication.
    assert_eq!(manager.history(&run_id).await.len(), 3);
}

#[tokio::test]
async fn mark_done_closes_live_subscribers_after_the_terminal_event() {
    let manager = RunStreamManager::new();
    let run_id = manager.create_run().await;
    let mut receiver = manager.subscribe(&run_id).await.expect("subscribe");

    manager
        .mark_done(
            &run_id,
            ProgressEvent::done("Pipeline completed.", ProgressLevel::Info),
        )
        .await;

    let last = receiver.recv().await.expect("terminal event");
    assert_eq!(last.event, ProgressEventKind::Done);
    assert!(receiver.recv().await.is_none(), "channel must close");
    assert!(manager.is_completed(&run_id).await);
}

#[tokio::test]
async fn late_publish_after_completion_is_kept_in_history() {
    let manager = RunStreamManager::new();
    let run_id = manager.create_run().await;

    manager
        .mark_done(
            &run_id,
            ProgressEvent::done("Pipeline completed.", ProgressLevel::Info),
        )
        .await;
    manager
        .publish(
            &run_id,
            ProgressEvent::log("adapter close failed", ProgressLevel::Warning),
        )
        .await;

    // The late event lands in history for diagnostics but the run stays
    // completed, so a new subscriber replays everything and then ends.
    let history = manager.history(&run_id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].message, "adapter close failed");
    assert!(manager.is_completed(&run_id).await);

    let mut receiver = manager.subscribe(&run_id).await.expect("subscribe");
    assert_eq!(
        receiver.recv().await.expect("done").event,
        ProgressEventKind::Done
    );
    assert_eq!(
        receiver.recv().await.expect("late log").message,
        "adapter close failed"
    );
    assert!(receiver.recv().await.is_none());
}

#[tokio::test]
async fn post_completion_subscriber_gets_history_then_end_of_stream() {
    let manager = RunStreamManager::new();
    let run_id = manager.create_run().await;

    manager
        .publish(&run_id, ProgressEvent::status("Pipeline started (full)."))
        .await;
    manager
        .mark_done(
            &run_id,
            ProgressEvent::done("Pipeline failed: boom", ProgressLevel::Error),
        )
        .await;

    let mut receiver = manager.subscribe(&run_id).await.expect("subscribe");
    assert_eq!(
        receiver.recv().await.expect("status").event,
        ProgressEventKind::Status
    );
    let done = receiver.recv().await.expect("done");
    assert_eq!(done.level, ProgressLevel::Error);
    assert!(receiver.recv().await.is_none());
}

#[tokio::test]
async fn unknown_run_is_rejected() {
    let manager = RunStreamManager::new();
    let error = manager
        .subscribe("no-such-run")
        .await
        .expect_err("unknown runs are invalid input");
    assert_eq!(error.kind, SyncErrorKind::InvalidInput);
}

#[tokio::test]
async fn events_serialize_to_sse_frames() {
    let event = ProgressEvent::log("Created task: Submit survey", ProgressLevel::Info)
        .with_url("https://lms.test/mod/m1");
    let frame = event.sse_frame();

    assert!(frame.starts_with("data: {"));
    assert!(frame.ends_with("\n\n"));
    assert!(frame.contains("\"event\":\"log\""));
    assert!(frame.contains("\"url\":\"https://lms.test/mod/m1\""));

    let plain = ProgressEvent::status("Pipeline started (full).").sse_frame();
    assert!(!plain.contains("\"url\""), "absent urls are omitted");
}
