//! Observability for failures the agent recovers from on its own.
//!
//! Cache errors, network failures during interception, malformed push
//! payloads and messaging failures never reach the application. They are
//! reported here instead, so the CLI can log them and tests can assert on them.

use std::sync::Arc;
use tracing::{info, warn};

/// A recovered failure or notable lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
  /// Writing to a partition failed; the write was dropped
  CacheWriteFailed {
    partition: String,
    key: String,
    error: String,
  },
  /// Reading from a partition failed; treated as a miss
  CacheReadFailed {
    partition: String,
    key: String,
    error: String,
  },
  /// A network fetch failed during interception
  NetworkFailed { url: String, error: String },
  /// A superseded partition was removed during activation
  PartitionRemoved { partition: String },
  /// A push payload was not valid JSON and was shown as plain text
  MalformedPushPayload { error: String },
  /// A message could not be delivered to the messaging API
  NotifyFailed { chat_id: String, error: String },
}

/// Receives diagnostics from the agent and the messaging sink.
pub trait Diagnostics: Send + Sync {
  fn record(&self, diagnostic: Diagnostic);
}

pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// Emits every diagnostic as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
  fn record(&self, diagnostic: Diagnostic) {
    match diagnostic {
      Diagnostic::CacheWriteFailed {
        partition,
        key,
        error,
      } => warn!(%partition, %key, %error, "cache write failed"),
      Diagnostic::CacheReadFailed {
        partition,
        key,
        error,
      } => warn!(%partition, %key, %error, "cache read failed, treating as miss"),
      Diagnostic::NetworkFailed { url, error } => warn!(%url, %error, "network fetch failed"),
      Diagnostic::PartitionRemoved { partition } => info!(%partition, "removed old partition"),
      Diagnostic::MalformedPushPayload { error } => {
        warn!(%error, "push payload is not JSON, using it as plain text")
      }
      Diagnostic::NotifyFailed { chat_id, error } => {
        warn!(%chat_id, %error, "failed to deliver message")
      }
    }
  }
}

/// Collects diagnostics for inspection in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
  events: std::sync::Mutex<Vec<Diagnostic>>,
}

#[cfg(test)]
impl RecordingDiagnostics {
  pub fn events(&self) -> Vec<Diagnostic> {
    self.events.lock().unwrap().clone()
  }
}

#[cfg(test)]
impl Diagnostics for RecordingDiagnostics {
  fn record(&self, diagnostic: Diagnostic) {
    self.events.lock().unwrap().push(diagnostic);
  }
}
