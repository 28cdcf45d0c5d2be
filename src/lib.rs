//! MangaMa batch translation client
//!
//! This library submits manga pages to the MangaMa translation service one at a
//! time, retries transient failures with linear backoff, tracks the lifecycle of
//! every page in a batch, and refuses new work while the service's health
//! endpoint reports it unavailable.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{ErrorKind, TranslateError};
pub use models::batch::{Batch, BatchEvent, BatchPhase, ItemStatus, WorkItem};
pub use models::payload::ImagePayload;
pub use models::translation::TranslationResult;
pub use services::liveness::{LivenessMonitor, LivenessSource, LivenessState};
pub use services::orchestrator::{BatchHandle, Orchestrator};
pub use services::retry::{RetryDecision, RetryPolicy};
pub use services::transport::{HttpTransport, Transport};
