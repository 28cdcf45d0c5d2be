use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::services::transport::Transport;

/// Latest known availability of the translation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LivenessState {
    /// No probe has completed yet.
    Checking,
    Available,
    Unavailable,
}

/// Read side of the liveness signal, consulted before accepting new work.
pub trait LivenessSource: Send + Sync {
    fn state(&self) -> LivenessState;
}

/// Single process-wide monitor for binaries (lazily initialized).
static SHARED_MONITOR: OnceLock<Arc<LivenessMonitor>> = OnceLock::new();

/// Get or initialize the process-wide liveness monitor.
///
/// Later calls return the first instance; their arguments are ignored.
pub fn shared(config: &AppConfig, transport: Arc<dyn Transport>) -> Arc<LivenessMonitor> {
    SHARED_MONITOR
        .get_or_init(|| Arc::new(LivenessMonitor::new(config, transport)))
        .clone()
}

/// Polls the service health endpoint on a fixed interval.
///
/// One probe runs immediately on [`start`](Self::start), then one per interval.
/// A failed probe is not retried; the next scheduled probe corrects it.
pub struct LivenessMonitor {
    transport: Arc<dyn Transport>,
    interval: Duration,
    timeout: Duration,
    state: Arc<watch::Sender<LivenessState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessMonitor {
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(LivenessState::Checking);
        Self {
            transport,
            interval: config.liveness_interval(),
            timeout: config.health_timeout(),
            state: Arc::new(state),
            task: Mutex::new(None),
        }
    }

    /// Start polling. Calling it on a running monitor does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let (interval, timeout) = (self.interval, self.timeout);

        tracing::info!(
            interval_secs = interval.as_secs(),
            timeout_secs = timeout.as_secs(),
            "Starting liveness monitor"
        );

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick fires immediately.
                ticker.tick().await;
                let next = probe(transport.as_ref(), timeout).await;
                publish(&state, next);
            }
        }));
    }

    /// Stop polling. The gate falls back to `Checking` since no probe will
    /// refresh the last reading.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            self.state.send_replace(LivenessState::Checking);
            tracing::info!("Liveness monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn subscribe(&self) -> watch::Receiver<LivenessState> {
        self.state.subscribe()
    }

    /// Wait until the first probe has completed and return its reading.
    pub async fn wait_for_reading(&self) -> LivenessState {
        let mut rx = self.subscribe();
        let reading = match rx.wait_for(|state| *state != LivenessState::Checking).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reading
    }
}

impl LivenessSource for LivenessMonitor {
    fn state(&self) -> LivenessState {
        *self.state.borrow()
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().ok().and_then(|task| task.take()) {
            handle.abort();
        }
    }
}

/// Run one health probe bounded by `timeout`.
pub async fn probe(transport: &dyn Transport, timeout: Duration) -> LivenessState {
    match tokio::time::timeout(timeout, transport.check_health()).await {
        Ok(Ok(())) => LivenessState::Available,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Health probe failed");
            LivenessState::Unavailable
        }
        Err(_) => {
            tracing::debug!(timeout_secs = timeout.as_secs(), "Health probe timed out");
            LivenessState::Unavailable
        }
    }
}

fn publish(state: &watch::Sender<LivenessState>, next: LivenessState) {
    let changed = state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });

    if changed {
        match next {
            LivenessState::Available => tracing::info!("Translation service is available"),
            LivenessState::Unavailable => tracing::warn!("Translation service is unavailable"),
            LivenessState::Checking => {}
        }
    }
}
