//! Exception capture sinks.
//!
//! Sinks observe failures; they never decide whether a failure propagates.

use crate::context::ActorId;
use crate::error::ApiError;
use log::error;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Where and on whose behalf a captured failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetadata {
    /// Resource whose request failed.
    pub resource: String,
    /// Resource whose deletion triggered the failed request.
    pub parent: String,
    pub request_id: Uuid,
    pub actor: Option<ActorId>,
}

/// Observer invoked synchronously before a failure is re-raised.
pub trait ExceptionSink: Send + Sync {
    fn capture(&self, error: &ApiError, context_message: &str, metadata: &CaptureMetadata);
}

/// Default sink: one `error` log event per capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExceptionSink;

impl ExceptionSink for LogExceptionSink {
    fn capture(&self, err: &ApiError, context_message: &str, metadata: &CaptureMetadata) {
        error!(
            "event=exception_captured module=sink status=error error_code={} resource={} parent={} request_id={} actor={} message=\"{}\" error={}",
            err.code(),
            metadata.resource,
            metadata.parent,
            metadata.request_id,
            metadata
                .actor
                .map_or_else(|| "none".to_string(), |actor| actor.to_string()),
            context_message,
            err
        );
    }
}

/// One capture kept by `RecordingExceptionSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedException {
    pub error_code: &'static str,
    pub error_message: String,
    pub context_message: String,
    pub metadata: CaptureMetadata,
}

/// Sink that keeps captures in memory, for diagnostics and tests.
#[derive(Debug, Default)]
pub struct RecordingExceptionSink {
    captured: Mutex<Vec<CapturedException>>,
}

impl RecordingExceptionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captures so far, oldest first.
    pub fn captured(&self) -> Vec<CapturedException> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedException>> {
        // A poisoned list still holds every completed capture.
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ExceptionSink for RecordingExceptionSink {
    fn capture(&self, err: &ApiError, context_message: &str, metadata: &CaptureMetadata) {
        self.lock().push(CapturedException {
            error_code: err.code(),
            error_message: err.to_string(),
            context_message: context_message.to_string(),
            metadata: metadata.clone(),
        });
    }
}
