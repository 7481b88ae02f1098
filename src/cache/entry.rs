//! A single cache entry and its admission critical section.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::orchestrator::ErrorPolicy;
use super::traits::OperationKey;
use crate::error::FetchFailed;
use crate::query::{OperationState, Snapshot};

/// Outcome of asking an entry whether a fetch is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
  /// Fresh data is cached
  Fresh,
  /// A fetch is already in flight
  Joined,
  /// The caller must run the fetch and complete it with this generation
  Dispatch(u64),
  /// The entry was invalidated; look the key up again
  Retired,
}

struct EntryControl {
  generation: u64,
  retired: bool,
}

/// One `(operation, window)` slot.
///
/// All writes to the published snapshot happen while `control` is held, so the
/// snapshot read inside [`admit`](Self::admit) is always current.
pub(crate) struct Entry<T> {
  operation: OperationKey,
  control: Mutex<EntryControl>,
  sender: watch::Sender<Snapshot<T>>,
}

impl<T> Entry<T> {
  pub(crate) fn new(operation: OperationKey) -> Self {
    let (sender, _) = watch::channel(Snapshot::idle());
    Self {
      operation,
      control: Mutex::new(EntryControl {
        generation: 0,
        retired: false,
      }),
      sender,
    }
  }

  pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
    self.sender.subscribe()
  }

  pub(crate) fn snapshot(&self) -> Snapshot<T> {
    self.sender.borrow().clone()
  }

  /// Decide whether a request needs a new fetch, marking the entry Pending if so.
  pub(crate) fn admit(&self, ttl: Duration, now: Instant) -> Admission {
    let mut control = self.control.lock();
    if control.retired {
      return Admission::Retired;
    }

    let (state, fetched_at) = {
      let current = self.sender.borrow();
      (current.state, current.fetched_at)
    };

    match state {
      OperationState::Pending => Admission::Joined,
      OperationState::Ready
        if fetched_at.is_some_and(|at| now.saturating_duration_since(at) < ttl) =>
      {
        Admission::Fresh
      }
      _ => {
        control.generation += 1;
        self
          .sender
          .send_modify(|snapshot| snapshot.state = OperationState::Pending);
        Admission::Dispatch(control.generation)
      }
    }
  }

  /// Apply a fetch outcome. Returns `false` if the result was superseded
  /// (entry retired or a newer fetch dispatched) and therefore dropped.
  pub(crate) fn complete(
    &self,
    generation: u64,
    outcome: Result<T, String>,
    policy: ErrorPolicy,
  ) -> bool {
    let control = self.control.lock();
    if control.retired || control.generation != generation {
      return false;
    }

    let operation = &self.operation;
    self.sender.send_modify(|snapshot| match outcome {
      Ok(data) => {
        snapshot.state = OperationState::Ready;
        snapshot.data = Some(Arc::new(data));
        snapshot.error = None;
        snapshot.fetched_at = Some(Instant::now());
        snapshot.updated_at = Some(Utc::now());
      }
      Err(message) => {
        snapshot.state = OperationState::Failed;
        snapshot.error = Some(FetchFailed {
          operation: operation.clone(),
          message,
        });
        if policy == ErrorPolicy::ClearData {
          snapshot.data = None;
          snapshot.fetched_at = None;
          snapshot.updated_at = None;
        }
      }
    });
    true
  }

  /// Detach the entry from the cache. In-flight results are discarded and a
  /// pending state falls back to Idle so waiters are not left hanging.
  pub(crate) fn retire(&self) {
    let mut control = self.control.lock();
    control.retired = true;
    control.generation += 1;
    self.sender.send_if_modified(|snapshot| {
      if snapshot.state.is_pending() {
        snapshot.state = OperationState::Idle;
        true
      } else {
        false
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TTL: Duration = Duration::from_secs(30);

  fn dispatch(entry: &Entry<u32>) -> u64 {
    match entry.admit(TTL, Instant::now()) {
      Admission::Dispatch(generation) => generation,
      other => panic!("expected dispatch, got {:?}", other),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_admission_lifecycle() {
    let entry = Entry::<u32>::new("stats".into());
    assert_eq!(entry.snapshot().state, OperationState::Idle);

    let generation = dispatch(&entry);
    assert_eq!(entry.snapshot().state, OperationState::Pending);
    assert_eq!(entry.admit(TTL, Instant::now()), Admission::Joined);

    assert!(entry.complete(generation, Ok(5), ErrorPolicy::KeepStale));
    assert_eq!(entry.admit(TTL, Instant::now()), Admission::Fresh);

    tokio::time::advance(TTL).await;
    assert!(matches!(
      entry.admit(TTL, Instant::now()),
      Admission::Dispatch(_)
    ));
    // previous data stays visible while the refresh runs
    assert_eq!(entry.snapshot().data(), Some(&5));
  }

  #[tokio::test]
  async fn test_failed_entry_is_refetched() {
    let entry = Entry::<u32>::new("stats".into());
    let generation = dispatch(&entry);
    assert!(entry.complete(generation, Err("boom".to_string()), ErrorPolicy::KeepStale));

    let snapshot = entry.snapshot();
    assert_eq!(snapshot.state, OperationState::Failed);
    assert_eq!(snapshot.error(), Some("boom"));

    assert!(matches!(
      entry.admit(TTL, Instant::now()),
      Admission::Dispatch(_)
    ));
  }

  #[tokio::test]
  async fn test_error_policies() {
    let keep = Entry::<u32>::new("stats".into());
    let generation = dispatch(&keep);
    keep.complete(generation, Ok(1), ErrorPolicy::KeepStale);
    let generation = dispatch(&keep);
    keep.complete(generation, Err("down".to_string()), ErrorPolicy::KeepStale);
    let snapshot = keep.snapshot();
    assert_eq!(snapshot.data(), Some(&1));
    assert!(snapshot.is_stale());

    let clear = Entry::<u32>::new("stats".into());
    let generation = dispatch(&clear);
    clear.complete(generation, Ok(1), ErrorPolicy::ClearData);
    let generation = dispatch(&clear);
    clear.complete(generation, Err("down".to_string()), ErrorPolicy::ClearData);
    let snapshot = clear.snapshot();
    assert_eq!(snapshot.data(), None);
    assert_eq!(snapshot.state, OperationState::Failed);
  }

  #[tokio::test]
  async fn test_retired_entry_discards_late_result() {
    let entry = Entry::<u32>::new("stats".into());
    let generation = dispatch(&entry);

    entry.retire();
    assert_eq!(entry.snapshot().state, OperationState::Idle);
    assert_eq!(entry.admit(TTL, Instant::now()), Admission::Retired);

    assert!(!entry.complete(generation, Ok(9), ErrorPolicy::KeepStale));
    assert_eq!(entry.snapshot().data(), None);
  }
}
