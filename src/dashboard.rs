//! A page of panels that all report on the same window.
//!
//! The dashboard owns which window is current. Each panel's handle is watched
//! by a small task that forwards changes over a channel, tagged with the
//! generation of the window change that created it; updates from an older
//! generation are dropped, so a slow response for a previous window can never
//! overwrite the panel.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cache::{DashboardDataOrchestrator, Fetcher, OperationKey};
use crate::error::OrchestratorError;
use crate::event::PanelEvent;
use crate::query::{OperationHandle, Snapshot};
use crate::window::ReportingWindow;

/// Produces the fetch for one panel, given the window to report on.
pub trait PanelSource<T>: Send + Sync {
  fn fetch(&self, window: ReportingWindow) -> BoxFuture<'static, Result<T, String>>;
}

impl<T, F> PanelSource<T> for F
where
  F: Fn(ReportingWindow) -> BoxFuture<'static, Result<T, String>> + Send + Sync,
{
  fn fetch(&self, window: ReportingWindow) -> BoxFuture<'static, Result<T, String>> {
    self(window)
  }
}

struct Panel<T> {
  operation: OperationKey,
  source: Arc<dyn PanelSource<T>>,
  snapshot: Snapshot<T>,
}

pub struct Dashboard<T> {
  name: String,
  orchestrator: DashboardDataOrchestrator<T>,
  panels: Vec<Panel<T>>,
  window: Option<ReportingWindow>,
  generation: u64,
  watchers: Vec<JoinHandle<()>>,
  event_tx: mpsc::UnboundedSender<PanelEvent<T>>,
  event_rx: mpsc::UnboundedReceiver<PanelEvent<T>>,
}

impl<T: Send + Sync + 'static> Dashboard<T> {
  pub fn new(name: impl Into<String>, orchestrator: DashboardDataOrchestrator<T>) -> Self {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    Self {
      name: name.into(),
      orchestrator,
      panels: Vec::new(),
      window: None,
      generation: 0,
      watchers: Vec::new(),
      event_tx,
      event_rx,
    }
  }

  /// Add a panel. Panels are reported in the order they were added.
  ///
  /// Each operation appears once: adding a panel for an operation that is
  /// already present replaces that panel's source in place.
  pub fn with_panel(
    mut self,
    operation: impl Into<OperationKey>,
    source: impl PanelSource<T> + 'static,
  ) -> Self {
    let operation = operation.into();
    let source: Arc<dyn PanelSource<T>> = Arc::new(source);
    match self.panels.iter_mut().find(|p| p.operation == operation) {
      Some(panel) => {
        warn!(dashboard = %self.name, operation = %operation, "replacing duplicate panel");
        panel.source = source;
      }
      None => self.panels.push(Panel {
        operation,
        source,
        snapshot: Snapshot::idle(),
      }),
    }
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn window(&self) -> Option<&ReportingWindow> {
    self.window.as_ref()
  }

  pub fn orchestrator(&self) -> &DashboardDataOrchestrator<T> {
    &self.orchestrator
  }

  /// Panels in display order with their latest accepted snapshot.
  pub fn panels(&self) -> impl Iterator<Item = (&OperationKey, &Snapshot<T>)> {
    self.panels.iter().map(|p| (&p.operation, &p.snapshot))
  }

  pub fn panel(&self, operation: &OperationKey) -> Option<&Snapshot<T>> {
    self
      .panels
      .iter()
      .find(|p| p.operation == *operation)
      .map(|p| &p.snapshot)
  }

  pub fn all_settled(&self) -> bool {
    self.panels.iter().all(|p| p.snapshot.state.is_settled())
  }

  /// Some panel is waiting on a fetch.
  pub fn is_loading(&self) -> bool {
    self.panels.iter().any(|p| p.snapshot.state.is_pending())
  }

  /// Switch every panel to `window` and start fetching what is not cached.
  pub fn set_window(&mut self, window: ReportingWindow) -> Result<(), OrchestratorError> {
    let requests: Vec<(OperationKey, Fetcher<T>)> = self
      .panels
      .iter()
      .map(|panel| {
        let source = Arc::clone(&panel.source);
        let fetch: Fetcher<T> = Box::new(move || source.fetch(window));
        (panel.operation.clone(), fetch)
      })
      .collect();
    let aggregate = self.orchestrator.request_all(requests, window)?;

    self.generation += 1;
    for watcher in self.watchers.drain(..) {
      watcher.abort();
    }
    debug!(
      dashboard = %self.name,
      window = %window,
      generation = self.generation,
      "switching window"
    );

    for handle in aggregate.into_handles() {
      if let Some(panel) = self
        .panels
        .iter_mut()
        .find(|p| p.operation == *handle.operation())
      {
        panel.snapshot = handle.snapshot();
      }
      self.watchers.push(spawn_watcher(
        handle,
        self.generation,
        self.event_tx.clone(),
      ));
    }

    self.window = Some(window);
    Ok(())
  }

  /// Drop this dashboard's cached data for the current window and fetch again.
  pub fn refresh(&mut self) -> Result<(), OrchestratorError> {
    let Some(window) = self.window else {
      return Ok(());
    };

    for panel in &self.panels {
      self
        .orchestrator
        .invalidate(Some(&panel.operation), Some(&window));
    }
    self.set_window(window)
  }

  /// Apply any pending panel updates without blocking.
  ///
  /// Returns `true` if a panel changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.event_rx.try_recv() {
      changed |= self.apply(event);
    }
    changed
  }

  /// Wait until a panel of the current window changes.
  pub async fn next_update(&mut self) -> bool {
    while let Some(event) = self.event_rx.recv().await {
      if self.apply(event) {
        return true;
      }
    }
    false
  }

  /// Wait until no panel is loading.
  ///
  /// Panels end up Ready or Failed, or Idle when their entry was invalidated
  /// while in flight. Returns at once when no window has been set.
  pub async fn wait_settled(&mut self) {
    if self.window.is_none() {
      return;
    }
    while self.is_loading() {
      if !self.next_update().await {
        break;
      }
    }
  }

  fn apply(&mut self, event: PanelEvent<T>) -> bool {
    if event.generation != self.generation {
      trace!(
        operation = %event.operation,
        generation = event.generation,
        current = self.generation,
        "dropping update for superseded window"
      );
      return false;
    }

    match self
      .panels
      .iter_mut()
      .find(|p| p.operation == event.operation)
    {
      Some(panel) => {
        panel.snapshot = event.snapshot;
        true
      }
      None => false,
    }
  }
}

impl<T> Drop for Dashboard<T> {
  fn drop(&mut self) {
    for watcher in &self.watchers {
      watcher.abort();
    }
  }
}

fn spawn_watcher<T: Send + Sync + 'static>(
  mut handle: OperationHandle<T>,
  generation: u64,
  event_tx: mpsc::UnboundedSender<PanelEvent<T>>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    while handle.changed().await {
      let event = PanelEvent {
        operation: handle.operation().clone(),
        generation,
        snapshot: handle.snapshot(),
      };
      if event_tx.send(event).is_err() {
        break;
      }
    }
  })
}
