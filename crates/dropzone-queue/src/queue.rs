//! The upload queue scheduler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dropzone_core::{
    FileRecord, QueueConfig, SourceFile, TransferError, UploadResult, UploadStats, UploadStatus,
};

use crate::observer::{BatchReport, QueueEvent, UploadObserver};
use crate::transfer::{ProgressSink, TransferOperation, TransferRequest};
use crate::EVENT_CHANNEL_SIZE;

/// Runs batches of file transfers with bounded concurrency.
///
/// Cloning is cheap and every clone drives the same queue, so a clone can be
/// handed to a signal handler to call [`cancel_all`](Self::cancel_all).
#[derive(Clone)]
pub struct UploadQueue {
    config: QueueConfig,
    transfer: Arc<dyn TransferOperation>,
    observers: Vec<Arc<dyn UploadObserver>>,
    shared: Arc<Shared>,
}

/// Handle to the background work of one batch.
///
/// Dropping the handle does not stop the batch.
#[derive(Debug)]
pub struct BatchHandle {
    generation: u64,
    workers: JoinHandle<()>,
}

impl BatchHandle {
    /// The batch generation this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until every worker of the batch has settled.
    pub async fn wait(self) {
        if let Err(e) = self.workers.await {
            tracing::warn!(generation = self.generation, error = %e, "batch supervisor failed");
        }
    }
}

impl UploadQueue {
    /// Create a queue that transfers files with `transfer`.
    pub fn new(config: QueueConfig, transfer: impl TransferOperation) -> Self {
        Self::with_shared_transfer(config, Arc::new(transfer))
    }

    /// Create a queue from an already shared transfer operation.
    pub fn with_shared_transfer(config: QueueConfig, transfer: Arc<dyn TransferOperation>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            config,
            transfer,
            observers: Vec::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(BatchState::default()),
                events,
            }),
        }
    }

    /// Register an observer for every batch started afterwards.
    pub fn with_observer(mut self, observer: impl UploadObserver) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// The queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Start uploading a batch of files.
    ///
    /// An empty batch is a no-op and returns `None`. Otherwise any previous
    /// batch is discarded (its live transfers are cancelled) and up to
    /// `max_concurrent` workers begin pulling files in index order. Outside a
    /// Tokio runtime nothing can run, so the call is refused and returns
    /// `None` without touching the current batch.
    pub fn start(&self, files: Vec<SourceFile>) -> Option<BatchHandle> {
        if files.is_empty() {
            tracing::debug!("ignoring empty batch");
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(files = files.len(), "cannot start a batch outside a Tokio runtime");
            return None;
        };

        let file_count = files.len();
        let worker_count = self.config.worker_count(file_count);

        let (dispatch_tx, dispatch_rx) = if self.observers.is_empty() {
            (None, None)
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        };

        let generation = {
            let mut state = self.shared.lock();
            if state.is_uploading {
                tracing::warn!(
                    generation = state.generation,
                    "starting a new batch while another is active, discarding it"
                );
            }
            state.cancel_live_tokens();

            let generation = state.generation + 1;
            *state = BatchState {
                generation,
                records: files.iter().map(|f| FileRecord::pending(f.name.clone())).collect(),
                tokens: vec![None; file_count],
                payloads: vec![None; file_count],
                files,
                is_uploading: true,
                dispatch: dispatch_tx,
                ..Default::default()
            };
            self.shared.publish(&mut state);
            generation
        };

        tracing::info!(generation, files = file_count, workers = worker_count, "batch started");

        if let Some(rx) = dispatch_rx {
            spawn_dispatcher(&runtime, self.observers.clone(), rx);
        }

        let workers: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker| {
                let shared = Arc::clone(&self.shared);
                let transfer = Arc::clone(&self.transfer);
                runtime.spawn(run_worker(shared, transfer, generation, worker))
            })
            .collect();

        let supervisor = runtime.spawn(async move {
            for result in futures::future::join_all(workers).await {
                if let Err(e) = result {
                    tracing::error!(generation, error = %e, "upload worker aborted");
                }
            }
            tracing::debug!(generation, "all workers settled");
        });

        Some(BatchHandle {
            generation,
            workers: supervisor,
        })
    }

    /// Cancel every pending and in-flight upload of the current batch.
    ///
    /// Live transfers have their tokens cancelled and all non-terminal
    /// records become `Cancelled` with progress 0. Workers stop claiming new
    /// files. After the configured grace period the uploading and cancelling
    /// flags are cleared. Calling this repeatedly is harmless.
    pub fn cancel_all(&self) {
        let (generation, epoch) = {
            let mut state = self.shared.lock();
            state.is_cancelling = true;
            state.aborted = true;
            state.cancel_epoch += 1;
            state.cancel_live_tokens();

            let mut changed = 0;
            for record in &mut state.records {
                if record.cancel() {
                    changed += 1;
                }
            }
            if changed > 0 {
                tracing::info!(generation = state.generation, cancelled = changed, "uploads cancelled");
                self.shared.publish(&mut state);
            }
            (state.generation, state.cancel_epoch)
        };

        let shared = Arc::clone(&self.shared);
        let grace = self.config.cancel_grace();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    shared.finish_cancel(generation, epoch);
                });
            }
            Err(_) => shared.finish_cancel(generation, epoch),
        }
    }

    /// Cancel a single file of the current batch.
    ///
    /// Returns whether the record changed. Terminal records are left alone.
    pub fn cancel_upload(&self, index: usize) -> bool {
        let mut state = self.shared.lock();
        if let Some(token) = state.tokens.get_mut(index).and_then(Option::take) {
            token.cancel();
        }
        let changed = state.records.get_mut(index).is_some_and(FileRecord::cancel);
        if changed {
            tracing::info!(generation = state.generation, index, "upload cancelled");
            self.shared.publish(&mut state);
        }
        changed
    }

    /// Forget the current batch entirely.
    ///
    /// Live transfers are cancelled, records and flags are cleared, and any
    /// work still running for the old batch can no longer touch the queue.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.cancel_live_tokens();
        let generation = state.generation + 1;
        *state = BatchState {
            generation,
            ..Default::default()
        };
        tracing::debug!(generation, "queue reset");
    }

    /// Snapshot of the current records.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.shared.lock().records.clone()
    }

    /// The files of the current batch.
    pub fn files(&self) -> Vec<SourceFile> {
        self.shared.lock().files.clone()
    }

    /// Whether a batch is running.
    pub fn is_uploading(&self) -> bool {
        self.shared.lock().is_uploading
    }

    /// Whether a cancel-all is settling.
    pub fn is_cancelling(&self) -> bool {
        self.shared.lock().is_cancelling
    }

    /// Statistics over the current records.
    pub fn stats(&self) -> UploadStats {
        UploadStats::from_records(&self.shared.lock().records)
    }
}

/// State shared between the queue handle, its workers and progress sinks.
struct Shared {
    state: Mutex<BatchState>,
    events: broadcast::Sender<QueueEvent>,
}

#[derive(Default)]
struct BatchState {
    generation: u64,
    files: Vec<SourceFile>,
    records: Vec<FileRecord>,
    tokens: Vec<Option<CancellationToken>>,
    payloads: Vec<Option<serde_json::Value>>,
    next_index: usize,
    aborted: bool,
    is_uploading: bool,
    is_cancelling: bool,
    cancel_epoch: u64,
    completion_sent: bool,
    dispatch: Option<mpsc::UnboundedSender<QueueEvent>>,
}

impl BatchState {
    fn cancel_live_tokens(&mut self) {
        for token in self.tokens.iter_mut().filter_map(Option::take) {
            token.cancel();
        }
    }

    fn all_terminal(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(FileRecord::is_terminal)
    }

    fn report(&self) -> BatchReport {
        let successful_files = self
            .files
            .iter()
            .zip(&self.records)
            .filter(|(_, r)| r.status == UploadStatus::Completed)
            .map(|(f, _)| f.clone())
            .collect();

        let results = self
            .records
            .iter()
            .zip(&self.payloads)
            .map(|(record, payload)| match record.status {
                UploadStatus::Completed => UploadResult {
                    success: true,
                    data: payload.clone(),
                    error: None,
                },
                UploadStatus::Cancelled => UploadResult::failed(TransferError::Cancelled.to_string()),
                _ => UploadResult::failed(record.status_message()),
            })
            .collect();

        BatchReport {
            successful_files,
            results,
            records: self.records.clone(),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BatchState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere while holding the lock does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send the current snapshot and, once everything is terminal, the
    /// completion report. Runs under the state lock so events keep mutation
    /// order. Snapshots and reports are only built when someone listens; the
    /// completion flags are settled either way.
    fn publish(&self, state: &mut BatchState) {
        let listening = self.has_listeners(state);
        if listening {
            self.emit(state, QueueEvent::Progress(state.records.clone()));
        }

        if state.is_uploading && !state.completion_sent && state.all_terminal() {
            state.is_uploading = false;
            state.completion_sent = true;
            tracing::info!(
                generation = state.generation,
                summary = %UploadStats::from_records(&state.records).summary(),
                "batch complete"
            );
            if listening {
                self.emit(state, QueueEvent::Complete(state.report()));
            }
        }
    }

    fn has_listeners(&self, state: &BatchState) -> bool {
        state.dispatch.is_some() || self.events.receiver_count() > 0
    }

    fn emit(&self, state: &BatchState, event: QueueEvent) {
        if let Some(dispatch) = &state.dispatch {
            let _ = dispatch.send(event.clone());
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Apply a guarded mutation to record `index` of batch `generation`.
    fn update(
        &self,
        generation: u64,
        index: usize,
        mutate: impl FnOnce(&mut FileRecord) -> bool,
    ) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        let changed = state.records.get_mut(index).is_some_and(mutate);
        if changed {
            self.publish(&mut state);
        }
        changed
    }

    /// Claim the next file index, if the batch is still live.
    fn claim_next(&self, generation: u64) -> Option<(usize, SourceFile)> {
        let mut state = self.lock();
        if state.generation != generation || state.aborted {
            return None;
        }
        let index = state.next_index;
        let file = state.files.get(index)?.clone();
        state.next_index += 1;
        Some((index, file))
    }

    /// Move record `index` to Uploading and hand out its token.
    ///
    /// Returns `None` when the record was cancelled before it could start.
    fn begin_transfer(&self, generation: u64, index: usize) -> Option<CancellationToken> {
        let mut state = self.lock();
        if state.generation != generation || state.aborted {
            return None;
        }
        if !state.records.get_mut(index).is_some_and(FileRecord::begin) {
            return None;
        }
        let token = CancellationToken::new();
        state.tokens[index] = Some(token.clone());
        self.publish(&mut state);
        Some(token)
    }

    fn store_payload(&self, generation: u64, index: usize, payload: Option<serde_json::Value>) {
        let mut state = self.lock();
        if state.generation == generation {
            if let Some(slot) = state.payloads.get_mut(index) {
                *slot = payload;
            }
        }
    }

    fn clear_token(&self, generation: u64, index: usize) {
        let mut state = self.lock();
        if state.generation == generation {
            if let Some(slot) = state.tokens.get_mut(index) {
                *slot = None;
            }
        }
    }

    fn finish_cancel(&self, generation: u64, epoch: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.cancel_epoch != epoch {
            return;
        }
        state.is_uploading = false;
        state.is_cancelling = false;
        state.aborted = false;
        tracing::debug!(generation, "cancel settled");
    }
}

/// Clears the token slot of a file once its transfer settles, however it
/// settles.
struct TokenSlot<'a> {
    shared: &'a Shared,
    generation: u64,
    index: usize,
}

impl Drop for TokenSlot<'_> {
    fn drop(&mut self) {
        self.shared.clear_token(self.generation, self.index);
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    transfer: Arc<dyn TransferOperation>,
    generation: u64,
    worker: usize,
) {
    while let Some((index, file)) = shared.claim_next(generation) {
        tracing::debug!(generation, worker, index, name = %file.name, "claimed file");
        upload_one(&shared, transfer.as_ref(), generation, index, file).await;
    }
    tracing::debug!(generation, worker, "worker idle");
}

async fn upload_one(
    shared: &Arc<Shared>,
    transfer: &dyn TransferOperation,
    generation: u64,
    index: usize,
    file: SourceFile,
) {
    let Some(cancel) = shared.begin_transfer(generation, index) else {
        tracing::debug!(generation, index, "skipping cancelled file");
        return;
    };
    let _slot = TokenSlot {
        shared,
        generation,
        index,
    };

    let progress = {
        let shared = Arc::clone(shared);
        ProgressSink::new(move |percent| {
            shared.update(generation, index, |r| r.set_progress(percent));
        })
    };
    let name = file.name.clone();
    let request = TransferRequest {
        index,
        file,
        progress,
        cancel,
    };

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| transfer.transfer(request))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(panic) => Err(panic),
    };

    match outcome {
        Ok(Ok(result)) if result.success => {
            shared.store_payload(generation, index, result.data);
            if shared.update(generation, index, FileRecord::complete) {
                tracing::debug!(generation, index, name = %name, "upload completed");
            }
        }
        Ok(Ok(result)) => {
            let message = result.error_message();
            tracing::warn!(generation, index, name = %name, error = %message, "upload failed");
            shared.update(generation, index, |r| r.fail(message));
        }
        Ok(Err(e)) if e.is_cancelled() => {
            // Normally the cancel path already moved the record. A transfer
            // that gives up on its own still has to reach a terminal state.
            shared.update(generation, index, FileRecord::cancel);
        }
        Ok(Err(e)) => {
            let message = e.record_message();
            tracing::warn!(generation, index, name = %name, error = %message, "upload error");
            shared.update(generation, index, |r| r.fail(message));
        }
        Err(panic) => {
            let message = format!("Upload panicked: {}", panic_message(panic.as_ref()));
            tracing::error!(generation, index, name = %name, "{message}");
            shared.update(generation, index, |r| r.fail(message));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn spawn_dispatcher(
    runtime: &tokio::runtime::Handle,
    observers: Vec<Arc<dyn UploadObserver>>,
    mut rx: mpsc::UnboundedReceiver<QueueEvent>,
) {
    runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            for observer in &observers {
                match &event {
                    QueueEvent::Progress(records) => observer.on_progress(records),
                    QueueEvent::Complete(report) => observer.on_complete(report),
                }
            }
        }
    });
}
