//! Integration tests for TaskRunner
//!
//! These tests verify:
//! - Per-task status rollup (success, partial, failed, error)
//! - The end-to-end download folder scenario
//! - Cooperative cancellation between files
//! - Progress and the final tally

mod common;

use camino::Utf8Path;
use common::*;
use std::fs;
use std::sync::Arc;
use tokio::sync::watch;
use unnest::models::{ArchiveTask, TaskStatus};
use unnest::services::{DecodeError, ExternalDecoder, ExtractionOrchestrator, TaskRunner};

fn runner(decoder: FakeDecoder, observer: &Arc<RecordingObserver>) -> TaskRunner<FakeDecoder> {
    TaskRunner::new(ExtractionOrchestrator::new(decoder).with_observer(observer.clone()))
}

#[tokio::test]
async fn test_end_to_end_mixed_folder() {
    let (_src_tmp, src) = utf8_temp_dir();
    let (_out_tmp, out) = utf8_temp_dir();

    let zip_file = write_file(&src, "photos.zip", zip("photos"));
    let misnamed = write_file(&src, "episode.txt", rar("episode"));
    let picture = write_file(&src, "cover.jpg", b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00");

    let decoder = FakeDecoder::new()
        .with("photos", FakeArchive::new().entry("album/a.txt", "a"))
        .with("episode", FakeArchive::new().entry("episode.txt", "subs"));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(decoder, &observer);

    let task = ArchiveTask::new(vec![zip_file, misnamed, picture.clone()], out.clone());
    let summary = runner.run(&[task]).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.task_statuses, vec![TaskStatus::Partial]);

    // The RAR was renamed before the decoder saw it
    let calls = runner.orchestrator().decoder().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].archive, src.join("episode.rar"));
    assert!(!src.join("episode.txt").exists());

    // The picture was never touched
    assert_eq!(fs::read(&picture).unwrap(), b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00");
    assert_eq!(files_under(&out), vec!["album/a.txt", "episode.txt"]);
    assert!(leftover_scratch_dirs(&out).is_empty());

    assert_eq!(observer.finished(), Some(2));
    assert_eq!(observer.logs_containing("succeeded: 2, failed: 1").len(), 1);
}

#[tokio::test]
async fn test_status_rollup_per_task() {
    let (_src_tmp, src) = utf8_temp_dir();
    let (_out_tmp, out) = utf8_temp_dir();

    let good = write_file(&src, "good.zip", zip("good"));
    let bad = write_file(&src, "bad.zip", zip("missing-script"));
    let decoder = FakeDecoder::new().with("good", FakeArchive::new().entry("g.txt", "g"));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(decoder, &observer);

    let tasks = vec![
        ArchiveTask::new(vec![good.clone()], out.join("one")),
        ArchiveTask::new(vec![good.clone(), bad.clone()], out.join("two")),
        ArchiveTask::new(vec![bad.clone()], out.join("three")),
        ArchiveTask::new(Vec::new(), out.join("four")),
    ];
    let summary = runner.run(&tasks).await;

    assert_eq!(
        summary.task_statuses,
        vec![
            TaskStatus::Success,
            TaskStatus::Partial,
            TaskStatus::Failed,
            TaskStatus::Error
        ]
    );
    assert_eq!((summary.succeeded, summary.failed), (2, 2));
    assert!(!summary.cancelled);

    let statuses = observer.statuses();
    for index in 0..4 {
        assert_eq!(statuses[index], (index, TaskStatus::Pending));
    }
    assert!(statuses.contains(&(0, TaskStatus::Processing)));
    assert!(!statuses.contains(&(3, TaskStatus::Processing)));
}

#[tokio::test]
async fn test_uncreatable_destination_is_error() {
    let (_src_tmp, src) = utf8_temp_dir();

    let input = write_file(&src, "a.zip", zip("a"));
    let blocker = write_file(&src, "blocker", b"plain file");
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(FakeDecoder::new(), &observer);

    let summary = runner
        .run(&[ArchiveTask::new(vec![input], blocker.join("out"))])
        .await;

    assert_eq!(summary.task_statuses, vec![TaskStatus::Error]);
    assert!(runner.orchestrator().decoder().calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_tasks_pending() {
    let (_src_tmp, src) = utf8_temp_dir();
    let (_out_tmp, out) = utf8_temp_dir();

    let input = write_file(&src, "a.zip", zip("a"));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let observer = Arc::new(RecordingObserver::default());
    let runner = TaskRunner::new(
        ExtractionOrchestrator::new(FakeDecoder::new())
            .with_observer(observer.clone())
            .with_cancellation(cancel_rx),
    );

    let summary = runner
        .run(&[ArchiveTask::new(vec![input], out.clone())])
        .await;

    assert!(summary.cancelled);
    assert_eq!(summary.task_statuses, vec![TaskStatus::Pending]);
    assert_eq!(summary.succeeded, 0);
    assert!(runner.orchestrator().decoder().calls().is_empty());
    assert_eq!(observer.finished(), Some(0));
}

/// Requests cancellation while the first archive is being decoded.
struct CancellingDecoder {
    inner: FakeDecoder,
    cancel_tx: watch::Sender<bool>,
}

impl ExternalDecoder for CancellingDecoder {
    async fn decode(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> Result<(), DecodeError> {
        let _ = self.cancel_tx.send(true);
        self.inner.decode(archive, output_dir, password).await
    }
}

#[tokio::test]
async fn test_cancel_during_file_finishes_that_file() {
    let (_src_tmp, src) = utf8_temp_dir();
    let (_out_tmp, out) = utf8_temp_dir();

    let first = write_file(&src, "first.zip", zip("first"));
    let second = write_file(&src, "second.zip", zip("second"));
    let third = write_file(&src, "third.zip", zip("third"));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let decoder = CancellingDecoder {
        inner: FakeDecoder::new()
            .with("first", FakeArchive::new().entry("1.txt", "1"))
            .with("second", FakeArchive::new().entry("2.txt", "2"))
            .with("third", FakeArchive::new().entry("3.txt", "3")),
        cancel_tx,
    };
    let observer = Arc::new(RecordingObserver::default());
    let runner = TaskRunner::new(
        ExtractionOrchestrator::new(decoder)
            .with_observer(observer.clone())
            .with_cancellation(cancel_rx),
    );

    let tasks = vec![
        ArchiveTask::new(vec![first, second], out.clone()),
        ArchiveTask::new(vec![third], out.clone()),
    ];
    let summary = runner.run(&tasks).await;

    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        summary.task_statuses,
        vec![TaskStatus::Partial, TaskStatus::Pending]
    );
    assert_eq!(files_under(&out), vec!["1.txt"]);
    assert_eq!(runner.orchestrator().decoder().inner.calls().len(), 1);
}

#[tokio::test]
async fn test_progress_counts_files_across_tasks() {
    let (_src_tmp, src) = utf8_temp_dir();
    let (_out_tmp, out) = utf8_temp_dir();

    let decoder = FakeDecoder::new()
        .with("a", FakeArchive::new().entry("a.txt", "a"))
        .with("b", FakeArchive::new().entry("b.txt", "b"))
        .with("c", FakeArchive::new().entry("c.txt", "c"))
        .with("d", FakeArchive::new().entry("d.txt", "d"));
    let file = |id: &str| write_file(&src, &format!("{}.zip", id), zip(id));
    let tasks = vec![
        ArchiveTask::new(vec![file("a"), file("b")], out.clone()),
        ArchiveTask::new(vec![file("c"), file("d")], out.clone()),
    ];
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(decoder, &observer);

    runner.run(&tasks).await;

    let percents: Vec<u8> = observer.progress().into_iter().map(|(_, p)| p).collect();
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
    assert_eq!(observer.logs_containing("Processing (3/4): c.zip").len(), 1);
}
