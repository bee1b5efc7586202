use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use dropzone_queue::{
    BatchReport, FileRecord, LocalCopyTransfer, ProgressSink, QueueConfig, QueueEvent,
    SourceFile, TransferError, TransferOperation, TransferRequest, UploadObserver, UploadQueue,
    UploadResult, UploadStatus,
};

fn files(n: usize) -> Vec<SourceFile> {
    (0..n)
        .map(|i| SourceFile::new(format!("file{i}.txt"), (i as u64 + 1) * 100))
        .collect()
}

fn config(max_concurrent: usize) -> QueueConfig {
    QueueConfig::builder()
        .max_concurrent(max_concurrent)
        .cancel_grace_ms(20u64)
        .build()
        .unwrap()
}

async fn wait_complete(rx: &mut broadcast::Receiver<QueueEvent>) -> BatchReport {
    loop {
        match rx.recv().await {
            Ok(QueueEvent::Complete(report)) => return report,
            Ok(QueueEvent::Progress(_)) => {}
            Err(e) => panic!("event stream ended: {e}"),
        }
    }
}

#[derive(Default)]
struct Recorder {
    progress_calls: AtomicUsize,
    reports: Mutex<Vec<BatchReport>>,
    done: Notify,
}

impl UploadObserver for Recorder {
    fn on_progress(&self, _records: &[FileRecord]) {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&self, report: &BatchReport) {
        self.reports.lock().unwrap().push(report.clone());
        self.done.notify_one();
    }
}

#[tokio::test]
async fn test_all_succeed_with_bounded_concurrency() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let transfer = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        move |req: TransferRequest| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                for p in [0.0, 50.0, 100.0] {
                    req.progress.report(p);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(UploadResult::ok_with(serde_json::json!({ "index": req.index })))
            }
        }
    };

    let recorder = Arc::new(Recorder::default());
    let queue = UploadQueue::new(config(2), transfer).with_observer(Arc::clone(&recorder));

    let handle = queue.start(files(5)).unwrap();
    handle.wait().await;
    recorder.done.notified().await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let reports = recorder.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.successful_files.len(), 5);
    assert_eq!(report.results.len(), 5);
    assert!(report.results.iter().all(|r| r.success));
    assert_eq!(report.results[3].data, Some(serde_json::json!({ "index": 3 })));
    assert!(report.is_success());

    let stats = queue.stats();
    assert_eq!((stats.completed, stats.failed, stats.cancelled), (5, 0, 0));
    assert!(stats.is_all_completed);
    assert!(!queue.is_uploading());

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert!(recorder.progress_calls.load(Ordering::SeqCst) > 5);
}

#[tokio::test]
async fn test_cancel_all_while_first_file_uploads() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let transfer = move |req: TransferRequest| {
        let started_tx = started_tx.clone();
        async move {
            let _ = started_tx.send(req.index);
            req.cancel.cancelled().await;
            Err(TransferError::Cancelled)
        }
    };

    let queue = UploadQueue::new(config(1), transfer);
    let mut events = queue.subscribe();
    let handle = queue.start(files(3)).unwrap();

    assert_eq!(started_rx.recv().await, Some(0));
    assert_eq!(queue.snapshot()[0].status, UploadStatus::Uploading);

    queue.cancel_all();
    assert!(queue.is_cancelling());
    for record in queue.snapshot() {
        assert_eq!(record.status, UploadStatus::Cancelled);
        assert_eq!(record.progress, 0.0);
    }
    assert!(queue.stats().is_all_completed);

    let report = wait_complete(&mut events).await;
    assert!(report.successful_files.is_empty());
    assert!(report
        .results
        .iter()
        .all(|r| !r.success && r.error.as_deref() == Some("Upload cancelled")));

    handle.wait().await;
    assert!(started_rx.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!queue.is_cancelling());
    assert!(!queue.is_uploading());
}

#[tokio::test]
async fn test_one_failure_among_siblings() {
    let transfer = |req: TransferRequest| async move {
        if req.index == 2 {
            Err(TransferError::failed("disk full"))
        } else {
            req.progress.report(100.0);
            Ok(UploadResult::ok())
        }
    };

    let queue = UploadQueue::new(config(3), transfer);
    let mut events = queue.subscribe();
    queue.start(files(4)).unwrap().wait().await;

    let records = queue.snapshot();
    assert_eq!(records[2].status, UploadStatus::Error);
    assert_eq!(records[2].progress, 0.0);
    assert_eq!(records[2].error.as_deref(), Some("disk full"));

    let report = wait_complete(&mut events).await;
    assert_eq!(report.successful_files.len(), 3);
    assert_eq!(report.stats().failed, 1);
    assert!(!report.results[2].success);
    assert_eq!(report.results[2].error.as_deref(), Some("disk full"));
    assert_eq!(report.summary(), "3 succeeded, 1 failed, 0 cancelled");
}

#[tokio::test]
async fn test_unsuccessful_result_uses_default_message() {
    let transfer = |_req: TransferRequest| async move {
        Ok(UploadResult {
            success: false,
            data: None,
            error: None,
        })
    };

    let queue = UploadQueue::new(config(1), transfer);
    queue.start(files(1)).unwrap().wait().await;

    assert_eq!(queue.snapshot()[0].error.as_deref(), Some("Upload failed"));
}

#[tokio::test]
async fn test_cancelled_slot_is_never_transferred() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let transfer = {
        let gate = Arc::clone(&gate);
        move |req: TransferRequest| {
            let gate = Arc::clone(&gate);
            let started_tx = started_tx.clone();
            async move {
                let _ = started_tx.send(req.index);
                let _permit = gate.acquire().await;
                Ok(UploadResult::ok())
            }
        }
    };

    let queue = UploadQueue::new(config(1), transfer);
    let handle = queue.start(files(5)).unwrap();
    assert_eq!(started_rx.recv().await, Some(0));

    assert!(queue.cancel_upload(4));
    assert!(!queue.cancel_upload(4));
    gate.add_permits(10);
    handle.wait().await;

    let mut seen = Vec::new();
    while let Ok(index) = started_rx.try_recv() {
        seen.push(index);
    }
    assert_eq!(seen, vec![1, 2, 3]);

    let records = queue.snapshot();
    assert_eq!(records[4].status, UploadStatus::Cancelled);
    let stats = queue.stats();
    assert_eq!((stats.completed, stats.cancelled), (4, 1));
    assert!(!queue.is_uploading());
}

#[tokio::test]
async fn test_late_success_cannot_resurrect_cancelled_record() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let transfer = {
        let gate = Arc::clone(&gate);
        move |req: TransferRequest| {
            let gate = Arc::clone(&gate);
            let started_tx = started_tx.clone();
            async move {
                let _ = started_tx.send(req.index);
                // Ignores the cancellation token on purpose
                let _permit = gate.acquire().await;
                req.progress.report(100.0);
                Ok(UploadResult::ok())
            }
        }
    };

    let queue = UploadQueue::new(config(2), transfer);
    let mut events = queue.subscribe();
    let handle = queue.start(files(2)).unwrap();
    started_rx.recv().await;
    started_rx.recv().await;

    queue.cancel_all();
    let cancelled = queue.snapshot();
    gate.add_permits(2);
    handle.wait().await;

    assert_eq!(queue.snapshot(), cancelled);
    assert!(cancelled.iter().all(|r| r.status == UploadStatus::Cancelled && r.progress == 0.0));

    let report = wait_complete(&mut events).await;
    assert!(report.successful_files.is_empty());
    tokio::time::sleep(Duration::from_millis(30)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, QueueEvent::Complete(_)), "completion fired twice");
    }
}

#[tokio::test]
async fn test_cancel_all_is_idempotent() {
    let transfer = |req: TransferRequest| async move {
        req.cancel.cancelled().await;
        Err(TransferError::Cancelled)
    };

    let queue = UploadQueue::new(config(2), transfer);
    let handle = queue.start(files(4)).unwrap();
    tokio::task::yield_now().await;

    queue.cancel_all();
    let once = queue.snapshot();
    queue.cancel_all();
    assert_eq!(queue.snapshot(), once);

    handle.wait().await;
    assert_eq!(queue.snapshot(), once);
    assert_eq!(queue.stats().cancelled, 4);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let recorder = Arc::new(Recorder::default());
    let queue = UploadQueue::new(config(2), |_req: TransferRequest| async move {
        Ok(UploadResult::ok())
    })
    .with_observer(Arc::clone(&recorder));
    let mut events = queue.subscribe();

    assert!(queue.start(Vec::new()).is_none());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(events.try_recv().is_err());
    assert_eq!(recorder.progress_calls.load(Ordering::SeqCst), 0);
    assert!(recorder.reports.lock().unwrap().is_empty());
    assert!(!queue.is_uploading());
}

#[tokio::test]
async fn test_progress_never_goes_backwards() {
    let transfer = |req: TransferRequest| async move {
        for p in [10.0, 60.0, 30.0, f64::NAN, 90.0, 150.0] {
            req.progress.report(p);
            tokio::task::yield_now().await;
        }
        Ok(UploadResult::ok())
    };

    let queue = UploadQueue::new(config(1), transfer);
    let mut events = queue.subscribe();
    queue.start(files(1)).unwrap().wait().await;

    let mut seen = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            QueueEvent::Progress(records) => {
                if records[0].status == UploadStatus::Uploading {
                    seen.push(records[0].progress);
                }
            }
            QueueEvent::Complete(_) => break,
        }
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
    assert_eq!(seen.last(), Some(&100.0));
    assert_eq!(queue.snapshot()[0].progress, 100.0);
}

#[tokio::test]
async fn test_panicking_transfer_is_isolated() {
    let transfer = |req: TransferRequest| async move {
        if req.index == 1 {
            panic!("boom");
        }
        Ok(UploadResult::ok())
    };

    let queue = UploadQueue::new(config(2), transfer);
    queue.start(files(3)).unwrap().wait().await;

    let records = queue.snapshot();
    assert_eq!(records[0].status, UploadStatus::Completed);
    assert_eq!(records[1].status, UploadStatus::Error);
    assert!(records[1].error.as_deref().unwrap().contains("boom"));
    assert_eq!(records[2].status, UploadStatus::Completed);
    assert!(!queue.is_uploading());
}

#[tokio::test]
async fn test_reset_during_flight_discards_batch() {
    let gate = Arc::new(Semaphore::new(0));
    let transfer = {
        let gate = Arc::clone(&gate);
        move |_req: TransferRequest| {
            let gate = Arc::clone(&gate);
            async move {
                let _permit = gate.acquire().await;
                Ok(UploadResult::ok())
            }
        }
    };

    let queue = UploadQueue::new(config(2), transfer);
    let mut events = queue.subscribe();
    let handle = queue.start(files(3)).unwrap();
    tokio::task::yield_now().await;

    queue.reset();
    assert!(queue.snapshot().is_empty());
    assert!(queue.files().is_empty());
    assert!(!queue.is_uploading());

    gate.add_permits(10);
    handle.wait().await;

    assert!(queue.snapshot().is_empty());
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, QueueEvent::Complete(_)));
    }
}

#[tokio::test]
async fn test_new_batch_replaces_running_one() {
    let transfer = |req: TransferRequest| async move {
        if req.file.name.starts_with("slow") {
            req.cancel.cancelled().await;
            return Err(TransferError::Cancelled);
        }
        Ok(UploadResult::ok())
    };

    let queue = UploadQueue::new(config(2), transfer);
    let first = queue
        .start(vec![SourceFile::new("slow-a", 1), SourceFile::new("slow-b", 1)])
        .unwrap();
    tokio::task::yield_now().await;

    let mut events = queue.subscribe();
    let second = queue.start(files(3)).unwrap();
    assert!(second.generation() > first.generation());

    first.wait().await;
    second.wait().await;

    let report = wait_complete(&mut events).await;
    assert_eq!(report.records.len(), 3);
    assert!(report.is_success());
    assert_eq!(queue.files().len(), 3);
    assert!(queue.snapshot().iter().all(|r| r.status == UploadStatus::Completed));
}

#[tokio::test]
async fn test_local_copy_writes_file() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = src.path().join("notes.txt");
    std::fs::write(&path, b"hello dropzone").unwrap();
    std::fs::write(dest.path().join("notes.txt"), b"existing").unwrap();

    let transfer = LocalCopyTransfer::new(dest.path()).with_chunk_size(4);
    let queue = UploadQueue::new(config(1), transfer);
    let mut events = queue.subscribe();

    let file = SourceFile::from_path(&path).unwrap();
    queue
        .start(vec![file, SourceFile::new("no-path.txt", 3)])
        .unwrap()
        .wait()
        .await;

    let report = wait_complete(&mut events).await;
    assert!(report.results[0].success);
    let data = report.results[0].data.clone().unwrap();
    assert_eq!(data["bytes"], 14);

    let copied = dest.path().join("notes (1).txt");
    assert_eq!(std::fs::read(&copied).unwrap(), b"hello dropzone");
    assert_eq!(std::fs::read(dest.path().join("notes.txt")).unwrap(), b"existing");

    assert!(!report.results[1].success);
    assert_eq!(report.records[1].status, UploadStatus::Error);
}

#[tokio::test]
async fn test_local_copy_removes_partial_file_on_cancel() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = src.path().join("big.bin");
    std::fs::write(&path, vec![7u8; 256]).unwrap();

    let transfer = LocalCopyTransfer::new(dest.path())
        .with_chunk_size(16)
        .with_throttle(Duration::from_millis(20));
    let cancel = CancellationToken::new();
    let request = TransferRequest {
        index: 0,
        file: SourceFile::from_path(&path).unwrap(),
        progress: ProgressSink::discard(),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(async move { transfer.transfer(request).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(TransferError::Cancelled)));
    assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
}
