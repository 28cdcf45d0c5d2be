//! Test doubles for the translation service and the liveness gate

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mangama_client::{
    AppConfig, BatchEvent, BatchHandle, ImagePayload, LivenessSource, LivenessState,
    Orchestrator, TranslateError, TranslationResult, Transport,
};
use tokio::time::Instant;

/// One scripted answer from the fake service.
pub struct Step {
    pub delay: Duration,
    pub outcome: Result<TranslationResult, TranslateError>,
}

impl Step {
    pub fn ok(result: TranslationResult) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(result),
        }
    }

    pub fn err(error: TranslateError) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A translate call as seen by the fake service.
#[derive(Debug, Clone)]
pub struct Call {
    pub file_name: String,
    pub accelerated: bool,
    pub at: Instant,
}

/// Transport that answers each file from a per-file script.
///
/// Files without a script (or with an exhausted one) succeed with a
/// one-region translation.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
    cleanups: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, file_name: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(file_name.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, file_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.file_name == file_name)
            .count()
    }

    pub fn cleanups(&self) -> Vec<String> {
        self.cleanups.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn translate(
        &self,
        payload: &ImagePayload,
        accelerated: bool,
    ) -> Result<TranslationResult, TranslateError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().unwrap().push(Call {
            file_name: payload.file_name.clone(),
            accelerated,
            at: Instant::now(),
        });

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&payload.file_name)
            .and_then(VecDeque::pop_front);
        let step = step.unwrap_or_else(|| Step::ok(crate::fixtures::translation("default", 1)));

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        step.outcome
    }

    async fn check_health(&self) -> Result<(), TranslateError> {
        Ok(())
    }

    async fn cleanup(&self, file_id: &str) -> Result<(), TranslateError> {
        self.cleanups.lock().unwrap().push(file_id.to_string());
        Ok(())
    }
}

/// Liveness gate fixed by the test.
pub struct FixedLiveness(Mutex<LivenessState>);

impl FixedLiveness {
    pub fn new(state: LivenessState) -> Arc<Self> {
        Arc::new(Self(Mutex::new(state)))
    }

    pub fn set(&self, state: LivenessState) {
        *self.0.lock().unwrap() = state;
    }
}

impl LivenessSource for FixedLiveness {
    fn state(&self) -> LivenessState {
        *self.0.lock().unwrap()
    }
}

/// Orchestrator over a scripted service with an open liveness gate.
pub fn orchestrator(transport: &Arc<ScriptedTransport>) -> Orchestrator {
    orchestrator_with(transport, FixedLiveness::new(LivenessState::Available), AppConfig::default())
}

pub fn orchestrator_with(
    transport: &Arc<ScriptedTransport>,
    liveness: Arc<FixedLiveness>,
    config: AppConfig,
) -> Orchestrator {
    Orchestrator::new(Arc::new(config), transport.clone(), liveness)
}

/// Drain every event of a batch until the driver is done.
pub async fn collect_events(handle: &mut BatchHandle) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

pub fn connectivity(message: &str) -> TranslateError {
    TranslateError::Connectivity(message.to_string())
}

pub fn server_error() -> TranslateError {
    TranslateError::Remote {
        status: 500,
        detail: "Processing error: CUDA out of memory".to_string(),
    }
}
