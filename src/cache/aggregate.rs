//! Handle over a fan-out of operations sharing one reporting window.

use futures::future::join_all;

use super::traits::OperationKey;
use crate::query::{OperationHandle, OperationState, Snapshot};
use crate::window::ReportingWindow;

/// Per-operation handles produced by `request_all`, in request order.
pub struct AggregateHandle<T> {
  window: ReportingWindow,
  handles: Vec<OperationHandle<T>>,
}

impl<T> AggregateHandle<T> {
  pub(crate) fn new(window: ReportingWindow, handles: Vec<OperationHandle<T>>) -> Self {
    Self { window, handles }
  }

  pub fn window(&self) -> &ReportingWindow {
    &self.window
  }

  pub fn handles(&self) -> &[OperationHandle<T>] {
    &self.handles
  }

  pub fn get(&self, operation: &OperationKey) -> Option<&OperationHandle<T>> {
    self.handles.iter().find(|h| h.operation() == operation)
  }

  pub fn len(&self) -> usize {
    self.handles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handles.is_empty()
  }

  /// Every operation is Ready or Failed.
  pub fn all_settled(&self) -> bool {
    self.handles.iter().all(|h| h.state().is_settled())
  }

  pub fn states(&self) -> Vec<(OperationKey, OperationState)> {
    self
      .handles
      .iter()
      .map(|h| (h.operation().clone(), h.state()))
      .collect()
  }

  /// Check every handle for changes without blocking. Returns `true` if any changed.
  pub fn poll(&mut self) -> bool {
    self
      .handles
      .iter_mut()
      .fold(false, |changed, handle| handle.poll() || changed)
  }

  /// Wait for every operation to settle and return the final snapshots in
  /// request order.
  pub async fn settle_all(&mut self) -> Vec<(OperationKey, Snapshot<T>)> {
    let snapshots = join_all(self.handles.iter_mut().map(|h| h.settled())).await;
    self
      .handles
      .iter()
      .map(|h| h.operation().clone())
      .zip(snapshots)
      .collect()
  }

  pub fn into_handles(self) -> Vec<OperationHandle<T>> {
    self.handles
  }
}

#[cfg(test)]
mod tests {
  use crate::cache::{fetcher, DashboardDataOrchestrator, OperationKey};
  use crate::query::OperationState;
  use crate::window::ReportingWindow;
  use std::time::Duration;

  #[derive(Debug, PartialEq)]
  struct Stats {
    total: u32,
  }

  fn window() -> ReportingWindow {
    ReportingWindow::parse("2024-01-01", "2024-01-31").unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn test_partial_failure_is_isolated() {
    let orchestrator = DashboardDataOrchestrator::<u32>::new();

    let mut aggregate = orchestrator
      .request_all(
        [
          ("ok", fetcher(|| async { Ok::<_, String>(1) })),
          ("broken", fetcher(|| async { Err::<u32, _>("HTTP 502") })),
        ],
        window(),
      )
      .unwrap();

    let settled = aggregate.settle_all().await;
    assert!(aggregate.all_settled());

    assert_eq!(settled[0].0, OperationKey::from("ok"));
    assert_eq!(settled[0].1.state, OperationState::Ready);
    assert_eq!(settled[0].1.data(), Some(&1));
    assert_eq!(settled[1].0, OperationKey::from("broken"));
    assert_eq!(settled[1].1.state, OperationState::Failed);
    assert_eq!(settled[1].1.error(), Some("HTTP 502"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_panels_settle_independently() {
    let orchestrator = DashboardDataOrchestrator::<Stats>::new();

    let mut aggregate = orchestrator
      .request_all(
        [
          (
            "stats",
            fetcher(|| async {
              tokio::time::sleep(Duration::from_millis(10)).await;
              Ok::<_, String>(Stats { total: 42 })
            }),
          ),
          (
            "groups",
            fetcher(|| async {
              tokio::time::sleep(Duration::from_millis(5)).await;
              Err::<Stats, _>("timeout")
            }),
          ),
        ],
        window(),
      )
      .unwrap();

    let stats = OperationKey::from("stats");
    let groups = OperationKey::from("groups");
    assert_eq!(aggregate.get(&stats).unwrap().state(), OperationState::Pending);
    assert_eq!(aggregate.get(&groups).unwrap().state(), OperationState::Pending);

    tokio::time::sleep(Duration::from_millis(6)).await;
    assert!(aggregate.poll());
    let failed = aggregate.get(&groups).unwrap().snapshot();
    assert_eq!(failed.state, OperationState::Failed);
    assert_eq!(failed.error(), Some("timeout"));
    assert_eq!(aggregate.get(&stats).unwrap().state(), OperationState::Pending);
    assert!(!aggregate.all_settled());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let ready = aggregate.get(&stats).unwrap().snapshot();
    assert_eq!(ready.state, OperationState::Ready);
    assert_eq!(ready.data(), Some(&Stats { total: 42 }));
    assert!(ready.error.is_none());
    // the failure stays with its own panel
    assert_eq!(
      aggregate.get(&groups).unwrap().state(),
      OperationState::Failed
    );
    assert!(aggregate.all_settled());
  }

  #[tokio::test]
  async fn test_states_in_request_order() {
    let orchestrator = DashboardDataOrchestrator::<u32>::new();
    let mut aggregate = orchestrator
      .request_all(
        [
          ("b", fetcher(|| async { Ok::<_, String>(2) })),
          ("a", fetcher(|| async { Ok::<_, String>(1) })),
        ],
        window(),
      )
      .unwrap();
    aggregate.settle_all().await;

    let names: Vec<_> = aggregate
      .states()
      .into_iter()
      .map(|(op, state)| (op.to_string(), state))
      .collect();
    assert_eq!(
      names,
      vec![
        ("b".to_string(), OperationState::Ready),
        ("a".to_string(), OperationState::Ready)
      ]
    );
    assert_eq!(aggregate.len(), 2);
  }
}
