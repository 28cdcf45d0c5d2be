//! Sequential batch driver.
//!
//! A batch is processed one item at a time: item `i + 1` is never started before
//! item `i` reached `Succeeded` or `Failed`. The batch lives inside a
//! `watch` channel owned by the driver task; observers get read-only receivers
//! and a broadcast stream of [`BatchEvent`]s published in the same step as each
//! mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::TranslateError;
use crate::models::batch::{Batch, BatchEvent, BatchPhase, ItemStatus, TransitionError, WorkItem};
use crate::models::payload::ImagePayload;
use crate::models::translation::TranslationResult;
use crate::services::liveness::{LivenessSource, LivenessState};
use crate::services::retry::RetryPolicy;
use crate::services::transport::Transport;

/// Accepts batches of images and drives them through the translation service.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    transport: Arc<dyn Transport>,
    liveness: Arc<dyn LivenessSource>,
    policy: RetryPolicy,
    active: Mutex<Option<ActiveBatch>>,
}

/// Orchestrator-side view of the batch currently owned by a driver task.
struct ActiveBatch {
    state: watch::Receiver<Batch>,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn Transport>,
        liveness: Arc<dyn LivenessSource>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            config,
            transport,
            liveness,
            policy,
            active: Mutex::new(None),
        }
    }

    pub fn liveness(&self) -> LivenessState {
        self.liveness.state()
    }

    /// Create a batch from `payloads` and start processing it in the background.
    ///
    /// Fails with [`TranslateError::ServiceUnavailable`], creating nothing, when the
    /// liveness gate is not open or a previous batch is still running.
    pub fn submit_batch(&self, payloads: Vec<ImagePayload>) -> Result<BatchHandle, TranslateError> {
        let liveness = self.liveness.state();
        if liveness != LivenessState::Available {
            tracing::warn!(%liveness, items = payloads.len(), "Rejecting batch, service not available");
            return Err(TranslateError::ServiceUnavailable(format!(
                "translation service is {liveness}"
            )));
        }

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = active.as_ref() {
            let running = current.state.borrow();
            if !running.is_finished() {
                return Err(TranslateError::ServiceUnavailable(format!(
                    "batch {} is still in progress",
                    running.id
                )));
            }
        }

        let batch = Batch::new(payloads, self.config.use_accelerated);
        let batch_id = batch.id;
        let capacity = event_capacity(batch.len(), self.policy.max_retries());

        let (state_tx, state_rx) = watch::channel(batch);
        let (events_tx, events_rx) = broadcast::channel(capacity);
        let cancel = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            policy: self.policy,
            state: state_tx,
            events: events_tx,
            cancel: Arc::clone(&cancel),
        };
        tokio::spawn(driver.run());

        *active = Some(ActiveBatch {
            state: state_rx.clone(),
            cancel: Arc::clone(&cancel),
        });

        tracing::debug!(%batch_id, "Batch submitted");

        Ok(BatchHandle {
            id: batch_id,
            state: state_rx,
            events: events_rx,
            cancel,
        })
    }

    /// Index of the item in flight (or about to be) in the active batch.
    pub fn current_item_index(&self) -> Option<usize> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active
            .as_ref()
            .and_then(|batch| batch.state.borrow().current_item_index())
    }

    /// Snapshot of the most recently submitted batch.
    pub fn active_batch(&self) -> Option<Batch> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.as_ref().map(|batch| batch.state.borrow().clone())
    }

    /// Stop the active batch after the item currently in flight.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(batch) = active.as_ref() {
            batch.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Ask the service to drop the artifacts behind `result` on a background task.
    ///
    /// Failures are logged and otherwise ignored. Callers that are about to shut
    /// the runtime down should await the returned handle.
    pub fn cleanup(&self, result: &TranslationResult) -> Option<JoinHandle<()>> {
        let Some(file_id) = result.file_id().map(str::to_owned) else {
            tracing::debug!(url = %result.original_image_url, "No cleanup id in result");
            return None;
        };

        let transport = Arc::clone(&self.transport);
        Some(tokio::spawn(async move {
            if let Err(e) = transport.cleanup(&file_id).await {
                tracing::warn!(file_id = %file_id, error = %e, "Cleanup failed");
            }
        }))
    }
}

/// Register descriptions for the metrics the driver emits.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "translate_attempts_total",
        "Translate calls sent to the service, retries included"
    );
    metrics::describe_counter!(
        "items_succeeded_total",
        "Batch items that ended with a translation"
    );
    metrics::describe_counter!(
        "items_failed_total",
        "Batch items that ended with a classified failure"
    );
    metrics::describe_histogram!(
        "item_processing_seconds",
        "Wall-clock time spent on one item, backoff included"
    );
}

/// Upper bound on buffered events; very large batches may lag a slow observer.
const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Enough room for every event a batch can emit, so a live subscriber never lags.
fn event_capacity(items: usize, max_retries: u32) -> usize {
    let per_item = (max_retries as usize).saturating_add(2);
    items
        .saturating_mul(per_item)
        .saturating_add(1)
        .clamp(16, MAX_EVENT_CAPACITY)
}

/// Observer handle returned by [`Orchestrator::submit_batch`].
pub struct BatchHandle {
    id: Uuid,
    state: watch::Receiver<Batch>,
    events: broadcast::Receiver<BatchEvent>,
    cancel: Arc<AtomicBool>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> Batch {
        self.state.borrow().clone()
    }

    /// Receiver that sees the batch after every mutation.
    pub fn watch(&self) -> watch::Receiver<Batch> {
        self.state.clone()
    }

    pub fn current_item_index(&self) -> Option<usize> {
        self.state.borrow().current_item_index()
    }

    /// Terminal items and batch size, for "item N of M" reporting.
    pub fn progress(&self) -> (usize, usize) {
        self.state.borrow().progress()
    }

    /// Event stream starting from now. Use [`next_event`](Self::next_event) to
    /// see every event since submission.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.resubscribe()
    }

    /// Next event since submission; `None` once the batch finished and all
    /// events were consumed.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(batch_id = %self.id, skipped, "Batch observer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Wait for the batch to finish and return its final state.
    pub async fn wait(&self) -> Batch {
        let mut rx = self.state.clone();
        let finished = rx.wait_for(Batch::is_finished).await.map(|batch| batch.clone());
        finished.unwrap_or_else(|_| rx.borrow().clone())
    }
}

/// Background task that exclusively mutates one batch.
struct Driver {
    config: Arc<AppConfig>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    state: watch::Sender<Batch>,
    events: broadcast::Sender<BatchEvent>,
    cancel: Arc<AtomicBool>,
}

impl Driver {
    async fn run(self) {
        let (batch_id, total) = {
            let batch = self.state.borrow();
            (batch.id, batch.len())
        };
        tracing::info!(%batch_id, total, "Starting batch");

        for index in 0..total {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!(%batch_id, next = index, total, "Batch cancelled");
                self.finish(BatchPhase::Cancelled);
                return;
            }

            self.state.send_modify(|batch| batch.cursor = index);
            tracing::info!(%batch_id, item = index + 1, total, "Processing item {} of {}", index + 1, total);
            self.process_item(index).await;
        }

        self.finish(BatchPhase::Completed);
    }

    async fn process_item(&self, index: usize) {
        if !self.transition(index, WorkItem::start) {
            return;
        }

        let (payload, accelerated) = {
            let batch = self.state.borrow();
            (Arc::clone(&batch.items[index].payload), batch.accelerated)
        };

        if let Err(err) = payload.validate(&self.config) {
            tracing::warn!(item = index, error = %err, "Skipping invalid image");
            metrics::counter!("items_failed_total").increment(1);
            self.transition(index, |item| item.fail(err));
            return;
        }

        let started = Instant::now();
        let this = self;
        let transport = &self.transport;
        let payload = &payload;

        let (outcome, attempts) = self
            .policy
            .run(
                move |_attempt| {
                    this.record_attempt(index);
                    metrics::counter!("translate_attempts_total").increment(1);
                    async move { transport.translate(payload, accelerated).await }
                },
                move |attempt, delay, err| this.publish_retry(index, attempt + 1, delay, err),
            )
            .await;

        metrics::histogram!("item_processing_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                tracing::info!(
                    item = index,
                    attempts,
                    regions = result.total_text_regions,
                    processing_time = result.processing_time,
                    "Item translated"
                );
                metrics::counter!("items_succeeded_total").increment(1);
                self.transition(index, |item| item.succeed(result));
            }
            Err(err) => {
                tracing::warn!(
                    item = index,
                    attempts,
                    kind = %err.kind(),
                    error = %err,
                    "Item failed"
                );
                metrics::counter!("items_failed_total").increment(1);
                self.transition(index, |item| item.fail(err));
            }
        }
    }

    /// Apply a status transition and notify observers. Returns false if it was illegal.
    fn transition<F>(&self, index: usize, apply: F) -> bool
    where
        F: FnOnce(&mut WorkItem) -> Result<(), TransitionError>,
    {
        let mut outcome = Ok(());
        let mut event = None;

        self.state.send_if_modified(|batch| {
            let batch_id = batch.id;
            let item = &mut batch.items[index];
            outcome = apply(item);
            if outcome.is_ok() {
                event = Some(BatchEvent::StatusChanged {
                    batch_id,
                    index,
                    status: item.status,
                    attempts: item.attempts,
                });
            }
            outcome.is_ok()
        });

        match outcome {
            Ok(()) => {
                if let Some(event) = event {
                    // No receivers is fine; nobody is watching.
                    let _ = self.events.send(event);
                }
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected batch mutation");
                false
            }
        }
    }

    fn record_attempt(&self, index: usize) {
        self.state.send_if_modified(|batch| match batch.items[index].record_attempt() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Attempt recorded outside of flight");
                false
            }
        });
    }

    fn publish_retry(&self, index: usize, attempt: u32, delay: Duration, err: &TranslateError) {
        let batch_id = self.state.borrow().id;
        let _ = self.events.send(BatchEvent::Retrying {
            batch_id,
            index,
            attempt,
            delay,
            error: err.clone(),
        });
    }

    fn finish(&self, phase: BatchPhase) {
        let mut summary = (Uuid::nil(), 0, 0, 0);
        self.state.send_modify(|batch| {
            batch.finish(phase);
            summary = (
                batch.id,
                batch.count(ItemStatus::Succeeded),
                batch.count(ItemStatus::Failed),
                batch.count(ItemStatus::Pending),
            );
        });

        let (batch_id, succeeded, failed, pending) = summary;
        tracing::info!(%batch_id, %phase, succeeded, failed, pending, "Batch finished");
        let _ = self.events.send(BatchEvent::Finished { batch_id, phase });
    }
}
