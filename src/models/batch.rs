use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use strum::Display;
use uuid::Uuid;

use crate::error::{ErrorKind, TranslateError};
use crate::models::payload::ImagePayload;
use crate::models::translation::TranslationResult;

/// Lifecycle of one work item. Transitions only move forward:
/// `Pending -> InFlight -> {Succeeded | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("illegal transition {from} -> {to} for item {index}")]
pub struct TransitionError {
    pub index: usize,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// Terminal failure of an item: the last observed error and how many calls were made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    #[serde(serialize_with = "serialize_error")]
    pub error: TranslateError,
    pub attempts: u32,
}

impl ItemFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

fn serialize_error<S: Serializer>(error: &TranslateError, serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Classified {
        kind: ErrorKind,
        message: String,
    }

    Classified {
        kind: error.kind(),
        message: error.to_string(),
    }
    .serialize(serializer)
}

/// One submitted image and its progress through the service.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub index: usize,
    pub file_name: String,
    pub size_bytes: usize,
    #[serde(skip)]
    pub payload: Arc<ImagePayload>,
    pub status: ItemStatus,
    /// Transport calls made so far.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranslationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ItemFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    fn new(index: usize, payload: ImagePayload) -> Self {
        Self {
            index,
            file_name: payload.file_name.clone(),
            size_bytes: payload.len(),
            payload: Arc::new(payload),
            status: ItemStatus::Pending,
            attempts: 0,
            result: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, from: ItemStatus, to: ItemStatus) -> Result<(), TransitionError> {
        if self.status != from {
            return Err(TransitionError {
                index: self.index,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(ItemStatus::Pending, ItemStatus::InFlight)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_attempt(&mut self) -> Result<u32, TransitionError> {
        if self.status != ItemStatus::InFlight {
            return Err(TransitionError {
                index: self.index,
                from: self.status,
                to: ItemStatus::InFlight,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    pub fn succeed(&mut self, result: TranslationResult) -> Result<(), TransitionError> {
        self.transition(ItemStatus::InFlight, ItemStatus::Succeeded)?;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: TranslateError) -> Result<(), TransitionError> {
        self.transition(ItemStatus::InFlight, ItemStatus::Failed)?;
        self.failure = Some(ItemFailure {
            error,
            attempts: self.attempts,
        });
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Running,
    Completed,
    Cancelled,
}

/// Ordered set of work items created from one submission. Items are never
/// added, removed or reordered after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub id: Uuid,
    pub accelerated: bool,
    pub phase: BatchPhase,
    /// Position of the item in flight, or of the next one to start.
    pub cursor: usize,
    pub items: Vec<WorkItem>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(payloads: Vec<ImagePayload>, accelerated: bool) -> Self {
        let items = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| WorkItem::new(index, payload))
            .collect();

        Self {
            id: Uuid::new_v4(),
            accelerated,
            phase: BatchPhase::Running,
            cursor: 0,
            items,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.phase != BatchPhase::Running
    }

    pub fn current_item_index(&self) -> Option<usize> {
        (!self.is_finished() && self.cursor < self.len()).then_some(self.cursor)
    }

    /// Number of items in a terminal state, and the batch size.
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .items
            .iter()
            .filter(|item| item.status.is_terminal())
            .count();
        (done, self.len())
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn completed_results(&self) -> impl Iterator<Item = (&WorkItem, &TranslationResult)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().map(|result| (item, result)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&WorkItem, &ItemFailure)> {
        self.items
            .iter()
            .filter_map(|item| item.failure.as_ref().map(|failure| (item, failure)))
    }

    pub(crate) fn finish(&mut self, phase: BatchPhase) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
    }
}

/// Notification published whenever a batch changes.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    StatusChanged {
        batch_id: Uuid,
        index: usize,
        status: ItemStatus,
        attempts: u32,
    },
    /// The item stays in flight and will be attempted again after `delay`.
    Retrying {
        batch_id: Uuid,
        index: usize,
        /// 1-based number of the attempt that failed.
        attempt: u32,
        delay: Duration,
        error: TranslateError,
    },
    Finished {
        batch_id: Uuid,
        phase: BatchPhase,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> TranslationResult {
        TranslationResult {
            original_image_url: "/static/a_original.png".to_string(),
            translated_image_url: "/static/a_translated.png".to_string(),
            detected_texts: Vec::new(),
            processing_time: 1.0,
            timestamp: "2026-01-01T00:00:00".to_string(),
            total_text_regions: 0,
        }
    }

    fn batch_of(n: usize) -> Batch {
        let payloads = (0..n)
            .map(|i| ImagePayload::new(format!("p{i}.png"), "image/png", vec![0u8; 8]))
            .collect();
        Batch::new(payloads, false)
    }

    #[test]
    fn test_new_batch_is_pending() {
        let batch = batch_of(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.count(ItemStatus::Pending), 3);
        assert_eq!(batch.current_item_index(), Some(0));
        assert_eq!(batch.progress(), (0, 3));
        assert!(batch.items.iter().enumerate().all(|(i, item)| item.index == i));
    }

    #[test]
    fn test_success_path() {
        let mut batch = batch_of(1);
        let item = &mut batch.items[0];
        item.start().unwrap();
        assert_eq!(item.record_attempt().unwrap(), 1);
        item.succeed(sample_result()).unwrap();

        assert_eq!(item.status, ItemStatus::Succeeded);
        assert!(item.result.is_some());
        assert!(item.failure.is_none());
        assert_eq!(batch.completed_results().count(), 1);
    }

    #[test]
    fn test_failure_records_attempts() {
        let mut batch = batch_of(1);
        let item = &mut batch.items[0];
        item.start().unwrap();
        item.record_attempt().unwrap();
        item.record_attempt().unwrap();
        item.fail(TranslateError::Connectivity("refused".into())).unwrap();

        let failure = item.failure.as_ref().unwrap();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.kind(), ErrorKind::ServiceUnavailable);
        assert!(item.result.is_none());
    }

    #[test]
    fn test_transitions_never_go_backward() {
        let mut batch = batch_of(1);
        let item = &mut batch.items[0];

        assert!(item.succeed(sample_result()).is_err());
        assert!(item.record_attempt().is_err());

        item.start().unwrap();
        assert!(item.start().is_err());
        item.fail(TranslateError::Unknown("boom".into())).unwrap();

        assert!(item.start().is_err());
        assert!(item.succeed(sample_result()).is_err());
        assert!(item.fail(TranslateError::Unknown("again".into())).is_err());
        assert_eq!(item.status, ItemStatus::Failed);
    }

    #[test]
    fn test_finished_batch_has_no_cursor() {
        let mut batch = batch_of(2);
        batch.finish(BatchPhase::Cancelled);
        assert!(batch.is_finished());
        assert_eq!(batch.current_item_index(), None);
    }

    #[test]
    fn test_failure_serializes_classified_error() {
        let failure = ItemFailure {
            error: TranslateError::ClientRejected {
                status: 400,
                detail: "Only JPG/PNG images are supported".into(),
            },
            attempts: 1,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error"]["kind"], "client_rejected");
        assert_eq!(json["attempts"], 1);
    }
}
