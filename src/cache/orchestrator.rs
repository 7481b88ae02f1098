//! Orchestrates cached, de-duplicated fetches keyed by reporting window.

use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::aggregate::AggregateHandle;
use super::entry::{Admission, Entry};
use super::traits::{CacheKey, CacheSource, Fetcher, OperationKey};
use crate::error::OrchestratorError;
use crate::query::{OperationHandle, Snapshot};
use crate::window::ReportingWindow;

/// How long a successful result is served without refetching.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// What happens to previously fetched data when a refresh fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
  /// Keep showing the last good data next to the error
  #[default]
  KeepStale,
  /// Discard the data so only the error is shown
  ClearData,
}

/// Coordinates independent, cacheable fetches for dashboard panels.
///
/// Each `(operation, window)` pair has at most one cache entry and at most one
/// fetch in flight. Failures are captured into the entry's state and never
/// reach the caller of [`request`](Self::request) or sibling operations.
///
/// Fetches are spawned on the ambient tokio runtime, so requests must be made
/// from within one.
pub struct DashboardDataOrchestrator<T> {
  entries: Arc<DashMap<CacheKey, Arc<Entry<T>>>>,
  operations: Option<Arc<BTreeSet<OperationKey>>>,
  ttl: Duration,
  error_policy: ErrorPolicy,
}

impl<T: Send + Sync + 'static> DashboardDataOrchestrator<T> {
  /// Create an orchestrator with the default TTL that accepts any operation.
  pub fn new() -> Self {
    Self {
      entries: Arc::new(DashMap::new()),
      operations: None,
      ttl: DEFAULT_TTL,
      error_policy: ErrorPolicy::default(),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
    self.error_policy = error_policy;
    self
  }

  /// Restrict requests to a known set of operations.
  pub fn with_operations<I, K>(mut self, operations: I) -> Self
  where
    I: IntoIterator<Item = K>,
    K: Into<OperationKey>,
  {
    self.operations = Some(Arc::new(operations.into_iter().map(Into::into).collect()));
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn error_policy(&self) -> ErrorPolicy {
    self.error_policy
  }

  /// Request data for one operation and window.
  ///
  /// Fresh cached data is returned without calling `fetch`; a request for a key
  /// that is already being fetched attaches to that fetch. Otherwise `fetch` is
  /// called exactly once and its future runs in the background.
  pub fn request<K, F, Fut, E>(
    &self,
    operation: K,
    window: ReportingWindow,
    fetch: F,
  ) -> Result<OperationHandle<T>, OrchestratorError>
  where
    K: Into<OperationKey>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
  {
    let operation = operation.into();
    self.check_operation(&operation)?;
    window.validate()?;
    Ok(self.admit(CacheKey::new(operation, window), fetch))
  }

  /// Request every operation for the same window.
  ///
  /// All operations and the window are validated before anything is
  /// dispatched. Each operation is then requested independently, so one
  /// failing fetch never affects the others.
  pub fn request_all<I, K>(
    &self,
    operations: I,
    window: ReportingWindow,
  ) -> Result<AggregateHandle<T>, OrchestratorError>
  where
    I: IntoIterator<Item = (K, Fetcher<T>)>,
    K: Into<OperationKey>,
  {
    window.validate()?;
    let operations: Vec<(OperationKey, Fetcher<T>)> = operations
      .into_iter()
      .map(|(key, fetch)| (key.into(), fetch))
      .collect();
    for (operation, _) in &operations {
      self.check_operation(operation)?;
    }

    let handles = operations
      .into_iter()
      .map(|(operation, fetch)| self.admit(CacheKey::new(operation, window), fetch))
      .collect();

    Ok(AggregateHandle::new(window, handles))
  }

  /// Drop cached entries matching the filter; `None` matches anything.
  ///
  /// Results still in flight for dropped entries are discarded. Returns the
  /// number of entries dropped.
  pub fn invalidate(
    &self,
    operation: Option<&OperationKey>,
    window: Option<&ReportingWindow>,
  ) -> usize {
    let mut dropped = Vec::new();
    self.entries.retain(|key, entry| {
      if key.matches(operation, window) {
        dropped.push(Arc::clone(entry));
        false
      } else {
        true
      }
    });

    for entry in &dropped {
      entry.retire();
    }

    if !dropped.is_empty() {
      info!(
        operation = ?operation.map(OperationKey::as_str),
        window = ?window.map(ToString::to_string),
        count = dropped.len(),
        "invalidated cache entries"
      );
    }
    dropped.len()
  }

  /// Current state of an entry, without requesting anything.
  pub fn peek(&self, operation: &OperationKey, window: &ReportingWindow) -> Option<Snapshot<T>> {
    let key = CacheKey::new(operation.clone(), *window);
    self.entries.get(&key).map(|entry| entry.snapshot())
  }

  /// Number of cached entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn check_operation(&self, operation: &OperationKey) -> Result<(), OrchestratorError> {
    match &self.operations {
      Some(known) if !known.contains(operation) => {
        Err(OrchestratorError::UnknownOperation(operation.clone()))
      }
      _ => Ok(()),
    }
  }

  fn admit<F, Fut, E>(&self, key: CacheKey, fetch: F) -> OperationHandle<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
  {
    loop {
      let entry = Arc::clone(
        self
          .entries
          .entry(key.clone())
          .or_insert_with(|| Arc::new(Entry::new(key.operation.clone())))
          .value(),
      );

      let receiver = entry.subscribe();
      let source = match entry.admit(self.ttl, Instant::now()) {
        // lost a race with invalidate; the key now maps to a new entry
        Admission::Retired => continue,
        Admission::Fresh => {
          debug!(key = %key, "serving cached data");
          CacheSource::Cache
        }
        Admission::Joined => {
          debug!(key = %key, "joining in-flight fetch");
          CacheSource::InFlight
        }
        Admission::Dispatch(generation) => {
          debug!(key = %key, generation, "dispatching fetch");
          match std::panic::catch_unwind(AssertUnwindSafe(fetch)) {
            Ok(fut) => self.spawn_fetch(key.clone(), Arc::clone(&entry), generation, fut),
            Err(_) => {
              warn!(key = %key, "fetch panicked before it started");
              entry.complete(generation, Err("fetch panicked".to_string()), self.error_policy);
            }
          }
          CacheSource::Network
        }
      };

      return OperationHandle::new(key.operation, key.window, source, receiver);
    }
  }

  fn spawn_fetch<Fut, E>(&self, key: CacheKey, entry: Arc<Entry<T>>, generation: u64, fut: Fut)
  where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
  {
    let policy = self.error_policy;
    tokio::spawn(async move {
      let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("fetch panicked".to_string()),
      };

      if let Err(message) = &outcome {
        warn!(key = %key, error = %message, "fetch failed");
      }

      if !entry.complete(generation, outcome, policy) {
        debug!(key = %key, generation, "discarding superseded response");
      }
    });
  }
}

impl<T: Send + Sync + 'static> Default for DashboardDataOrchestrator<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for DashboardDataOrchestrator<T> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
      operations: self.operations.clone(),
      ttl: self.ttl,
      error_policy: self.error_policy,
    }
  }
}

impl<T> fmt::Debug for DashboardDataOrchestrator<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DashboardDataOrchestrator")
      .field("entries", &self.entries.len())
      .field("operations", &self.operations)
      .field("ttl", &self.ttl)
      .field("error_policy", &self.error_policy)
      .finish()
  }
}
