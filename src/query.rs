//! Per-operation state as seen by the presentation layer.
//!
//! Every `request` returns an [`OperationHandle`]: a read-only view of one
//! cache entry that reports loading/error/data state and wakes its owner when
//! that state changes.
//!
//! # Example
//!
//! ```ignore
//! let mut handle = orchestrator.request("assetStatistics", window, move || {
//!     let api = api.clone();
//!     async move { api.get_json("pms/assets/statistics.json", window).await }
//! })?;
//!
//! // In an event loop tick
//! if handle.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match handle.state() {
//!     OperationState::Pending => render_spinner(),
//!     OperationState::Ready => render_data(handle.data()),
//!     OperationState::Failed => render_error(handle.error()),
//!     OperationState::Idle => {}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cache::{CacheSource, OperationKey};
use crate::error::FetchFailed;
use crate::window::ReportingWindow;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
  /// Nothing requested yet
  Idle,
  /// A fetch is in flight
  Pending,
  /// The last fetch succeeded
  Ready,
  /// The last fetch failed
  Failed,
}

impl OperationState {
  pub fn is_pending(&self) -> bool {
    matches!(self, OperationState::Pending)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, OperationState::Ready)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, OperationState::Failed)
  }

  /// Ready or Failed.
  pub fn is_settled(&self) -> bool {
    matches!(self, OperationState::Ready | OperationState::Failed)
  }
}

impl fmt::Display for OperationState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      OperationState::Idle => "idle",
      OperationState::Pending => "pending",
      OperationState::Ready => "ready",
      OperationState::Failed => "failed",
    };
    f.write_str(label)
  }
}

/// Point-in-time view of a cache entry.
///
/// `data` is the last successful result. It may be present while the state is
/// `Pending` (refresh in progress) or `Failed` (refresh failed and the error
/// policy keeps stale data). `error` is the last failure and is cleared by the
/// next success.
#[derive(Debug)]
pub struct Snapshot<T> {
  pub state: OperationState,
  pub data: Option<Arc<T>>,
  pub error: Option<FetchFailed>,
  /// When `data` was fetched, on the runtime clock (drives TTL checks)
  pub fetched_at: Option<Instant>,
  /// When `data` was fetched, wall clock (for display)
  pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Snapshot<T> {
  pub(crate) fn idle() -> Self {
    Self {
      state: OperationState::Idle,
      data: None,
      error: None,
      fetched_at: None,
      updated_at: None,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_ref().map(|e| e.message.as_str())
  }

  /// Data is shown but is not the outcome of the latest fetch.
  pub fn is_stale(&self) -> bool {
    self.data.is_some() && !self.state.is_ready()
  }
}

impl<T> Clone for Snapshot<T> {
  fn clone(&self) -> Self {
    Self {
      state: self.state,
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      updated_at: self.updated_at,
    }
  }
}

/// Read-only handle on one `(operation, window)` cache entry.
pub struct OperationHandle<T> {
  operation: OperationKey,
  window: ReportingWindow,
  source: CacheSource,
  receiver: watch::Receiver<Snapshot<T>>,
}

impl<T> OperationHandle<T> {
  pub(crate) fn new(
    operation: OperationKey,
    window: ReportingWindow,
    source: CacheSource,
    receiver: watch::Receiver<Snapshot<T>>,
  ) -> Self {
    Self {
      operation,
      window,
      source,
      receiver,
    }
  }

  pub fn operation(&self) -> &OperationKey {
    &self.operation
  }

  pub fn window(&self) -> &ReportingWindow {
    &self.window
  }

  /// How the request that produced this handle was answered.
  pub fn source(&self) -> CacheSource {
    self.source
  }

  pub fn snapshot(&self) -> Snapshot<T> {
    self.receiver.borrow().clone()
  }

  pub fn state(&self) -> OperationState {
    self.receiver.borrow().state
  }

  pub fn data(&self) -> Option<Arc<T>> {
    self.receiver.borrow().data.clone()
  }

  pub fn error(&self) -> Option<FetchFailed> {
    self.receiver.borrow().error.clone()
  }

  /// Check for a state change without blocking.
  ///
  /// Returns `true` once per change. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.receiver.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next state change.
  ///
  /// Returns `false` once the entry can no longer change.
  pub async fn changed(&mut self) -> bool {
    self.receiver.changed().await.is_ok()
  }

  /// Wait until the entry is Ready or Failed and return that snapshot.
  ///
  /// If the entry is dropped before settling (invalidated while pending),
  /// the last observed snapshot is returned instead.
  pub async fn settled(&mut self) -> Snapshot<T> {
    let settled = self
      .receiver
      .wait_for(|snapshot| snapshot.state.is_settled())
      .await
      .map(|snapshot| Snapshot::clone(&snapshot));

    match settled {
      Ok(snapshot) => snapshot,
      Err(_) => self.receiver.borrow().clone(),
    }
  }
}

impl<T> Clone for OperationHandle<T> {
  fn clone(&self) -> Self {
    Self {
      operation: self.operation.clone(),
      window: self.window,
      source: self.source,
      receiver: self.receiver.clone(),
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for OperationHandle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OperationHandle")
      .field("operation", &self.operation)
      .field("window", &self.window)
      .field("source", &self.source)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
