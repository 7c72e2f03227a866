//! Integration tests for pausing, resuming and restoring a downloader.
//!
//! # What is tested
//!
//! - A pause returns the checkpoints the transport produced, and a resume
//!   hands exactly those checkpoints back
//! - Pending tasks are paused without touching their checkpoints
//! - A completion applied before the suspension wins the race, and the other
//!   way round
//! - Pausing with nothing in flight is a no-op
//! - Concurrent pause calls share one batch
//! - Tasks added during a pause start once it completes
//! - A record saved to the task state database restores the same layout

mod common;

use common::*;
use dtg_download::{
    Downloader, DownloaderConfig, DownloaderError, DownloaderEvent, DownloaderImpl,
    DownloaderState, ResumeCheckpoint, TaskStateRepositoryPort, TaskStatus,
};
use dtg_store::{SqliteTaskStateRepository, setup_database};

fn paused_events(observer: &RecordingObserver) -> usize {
    observer
        .events()
        .iter()
        .filter(|e| matches!(e, DownloaderEvent::TasksPaused { .. }))
        .count()
}

#[tokio::test]
async fn pause_captures_checkpoints_and_resume_reuses_them() {
    let (downloader, transport, observer) = started(&["a.mp4", "b.aac"], 2);
    transport.transfer("a.mp4").await.progress(10);
    transport.transfer("b.aac").await.progress(20);
    eventually(|| observer.progress_of("a.mp4") == 10 && observer.progress_of("b.aac") == 20)
        .await;

    let paused = downloader.pause().await.unwrap();
    let keys: Vec<_> = paused.iter().map(|t| t.key().to_string()).collect();
    assert_eq!(keys, vec![url("a.mp4"), url("b.aac")]);
    assert_eq!(
        paused[0].resume_checkpoint,
        Some(ResumeCheckpoint::at(10).with_validator("etag-1"))
    );
    assert_eq!(
        paused[1].resume_checkpoint,
        Some(ResumeCheckpoint::at(20).with_validator("etag-1"))
    );

    observer.wait_for_state(DownloaderState::Paused).await;
    assert_eq!(downloader.records().count(TaskStatus::Paused), 2);

    downloader.resume().unwrap();
    let all = transport.wait_started(4).await;
    for before in &paused {
        let after = all[2..]
            .iter()
            .find(|t| t.content_url == before.key())
            .unwrap();
        assert_eq!(after.resume_checkpoint, before.resume_checkpoint);
    }
}

#[tokio::test]
async fn pending_tasks_pause_with_checkpoint_unchanged() {
    let transport = ScriptedTransport::new();
    let items = vec![
        task("a.mp4"),
        task("b.aac").with_resume_checkpoint(ResumeCheckpoint::at(5)),
    ];
    let downloader = DownloaderImpl::new(config(1), items, transport.clone()).unwrap();
    downloader.start().unwrap();
    transport.transfer("a.mp4").await;

    let paused = downloader.pause().await.unwrap();
    assert_eq!(paused.len(), 2);
    assert_eq!(paused[0].key(), url("a.mp4"));
    assert_eq!(
        paused[0].resume_checkpoint.as_ref().map(|c| c.offset),
        Some(0)
    );
    assert_eq!(paused[1].resume_checkpoint, Some(ResumeCheckpoint::at(5)));
    // Only the active task was ever handed to the transport.
    assert_eq!(transport.started_urls(), vec![url("a.mp4")]);
}

#[tokio::test]
async fn completion_applied_before_suspension_wins() {
    let (downloader, transport, observer) = started(&["a.mp4"], 1);
    let a = transport.transfer("a.mp4").await;

    // The completion is queued ahead of the suspend request.
    a.complete();
    let paused = downloader.pause().await.unwrap();

    assert!(paused.is_empty());
    observer.wait_for(finished("a.mp4")).await;
    observer.wait_for_state(DownloaderState::Idle).await;
    drain_events(&downloader).await;
    assert_eq!(paused_events(&observer), 0);
    assert_eq!(downloader.records().count(TaskStatus::Completed), 1);
}

#[tokio::test]
async fn suspension_applied_before_completion_wins() {
    let (downloader, transport, observer) = started(&["a.mp4"], 1);
    let a = transport.transfer("a.mp4").await;

    let paused = downloader.pause().await.unwrap();
    assert_eq!(paused.len(), 1);

    // The transfer already returned; a late success has nowhere to go.
    assert!(!a.try_send(Step::Complete));
    drain_events(&downloader).await;
    assert!(
        !observer
            .events()
            .iter()
            .any(|e| matches!(e, DownloaderEvent::TaskFinished { .. }))
    );
    assert_eq!(downloader.state(), DownloaderState::Paused);
}

#[tokio::test]
async fn pause_with_nothing_in_flight_is_a_noop() {
    let (downloader, _transport, observer) = started(&[], 1);
    observer.wait_for_state(DownloaderState::Idle).await;

    assert!(downloader.pause().await.unwrap().is_empty());
    assert!(downloader.pause().await.unwrap().is_empty());
    drain_events(&downloader).await;

    assert_eq!(observer.states(), vec![DownloaderState::Idle]);
    assert_eq!(paused_events(&observer), 0);
    assert_eq!(downloader.state(), DownloaderState::Idle);
}

#[tokio::test]
async fn second_pause_on_paused_downloader_is_a_noop() {
    let (downloader, transport, observer) = started(&["a.mp4"], 1);
    transport.transfer("a.mp4").await;
    assert_eq!(downloader.pause().await.unwrap().len(), 1);

    assert!(downloader.pause().await.unwrap().is_empty());
    drain_events(&downloader).await;
    assert_eq!(paused_events(&observer), 1);
}

#[tokio::test]
async fn concurrent_pauses_share_one_batch() {
    let (downloader, transport, observer) =
        started_on(ScriptedTransport::manual_suspend(), &["a.mp4"], 1);
    let a = transport.transfer("a.mp4").await;

    let suspender = tokio::spawn({
        let a = a.clone();
        async move {
            a.wait_suspend_requested().await;
            a.progress(7);
            a.suspend();
        }
    });

    // Both calls register before either awaits.
    let (first, second) = tokio::join!(downloader.pause(), downloader.pause());
    suspender.await.unwrap();
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first, second);
    assert_eq!(first[0].resume_checkpoint.as_ref().map(|c| c.offset), Some(7));
    drain_events(&downloader).await;
    assert_eq!(paused_events(&observer), 1);
}

#[tokio::test]
async fn resume_is_rejected_while_a_pause_is_in_flight() {
    let (downloader, transport, _observer) =
        started_on(ScriptedTransport::manual_suspend(), &["a.mp4"], 1);
    let a = transport.transfer("a.mp4").await;

    let mut pause = tokio_test::task::spawn(downloader.pause());
    tokio_test::assert_pending!(pause.poll());
    a.wait_suspend_requested().await;

    let err = downloader.resume().unwrap_err();
    assert!(matches!(
        err,
        DownloaderError::InvalidState {
            state: DownloaderState::Downloading,
            ..
        }
    ));

    a.suspend();
    assert_eq!(pause.await.unwrap().len(), 1);
    downloader.resume().unwrap();
    transport.wait_started(2).await;
}

#[tokio::test]
async fn tasks_added_during_pause_start_after_it_completes() {
    let (downloader, transport, observer) =
        started_on(ScriptedTransport::manual_suspend(), &["a.mp4"], 1);
    let a = transport.transfer("a.mp4").await;

    let pause = tokio::spawn({
        let downloader = downloader.clone();
        async move { downloader.pause().await }
    });
    a.wait_suspend_requested().await;

    downloader
        .add_download_item_tasks(tasks(&["b.vtt"]))
        .unwrap();
    drain_events(&downloader).await;
    assert_eq!(transport.started_urls(), vec![url("a.mp4")]);

    a.suspend();
    let paused = pause.await.unwrap().unwrap();
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].key(), url("a.mp4"));

    let b = transport.transfer("b.vtt").await;
    b.complete();
    observer.wait_for(finished("b.vtt")).await;
    observer.wait_for_state(DownloaderState::Paused).await;
}

#[tokio::test]
async fn saved_record_restores_layout_and_checkpoints() {
    let (downloader, transport, _observer) = started(&["a.mp4", "b.aac", "c.vtt"], 2);
    let a = transport.transfer("a.mp4").await;
    let b = transport.transfer("b.aac").await;
    a.complete();
    transport.transfer("c.vtt").await;
    b.progress(30);
    eventually(|| downloader.records().count(TaskStatus::Completed) == 1).await;

    let paused = downloader.pause().await.unwrap();
    assert_eq!(paused.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let store = SqliteTaskStateRepository::new(setup_database(&db).await.unwrap());
    store.save_item(&downloader.records()).await.unwrap();
    drop(downloader);
    drop(store);

    let store = SqliteTaskStateRepository::new(setup_database(&db).await.unwrap());
    let record = store.load_item("item-1").await.unwrap();
    assert_eq!(record.session_identifier, "dtg.session.item-1");
    assert_eq!(record.count(TaskStatus::Completed), 1);
    assert_eq!(record.count(TaskStatus::Paused), 2);

    let transport = ScriptedTransport::new();
    let restored = DownloaderImpl::restore(config(2), record, transport.clone()).unwrap();
    assert_eq!(restored.state(), DownloaderState::New);

    restored.start().unwrap();
    assert_eq!(restored.state(), DownloaderState::Paused);
    assert!(transport.started().is_empty());

    restored.resume().unwrap();
    let resumed = transport.wait_started(2).await;
    let b_again = resumed
        .iter()
        .find(|t| t.content_url == url("b.aac"))
        .unwrap();
    assert_eq!(
        b_again.resume_checkpoint,
        Some(ResumeCheckpoint::at(30).with_validator("etag-1"))
    );
}

#[tokio::test]
async fn restore_rejects_a_record_of_another_item() {
    let (downloader, _transport, _observer) = started(&["a.mp4"], 1);
    let record = downloader.records();

    let Err(err) = DownloaderImpl::restore(
        DownloaderConfig::new("item-2"),
        record,
        ScriptedTransport::new(),
    ) else {
        panic!("record of item-1 must not restore item-2");
    };
    assert!(matches!(err, DownloaderError::InvalidConfig { .. }));
}
