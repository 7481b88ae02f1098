//! Plain-text and JSON renderings of a dashboard's panels.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::cache::OperationKey;
use crate::dashboard::Dashboard;
use crate::query::OperationState;
use crate::window::ReportingWindow;

const PREVIEW_WIDTH: usize = 72;

#[derive(Debug, Serialize)]
struct PageReport<'a, T> {
  page: &'a str,
  window: Option<String>,
  panels: Vec<PanelReport<'a, T>>,
}

#[derive(Debug, Serialize)]
struct PanelReport<'a, T> {
  operation: &'a OperationKey,
  state: OperationState,
  stale: bool,
  data: Option<&'a T>,
  error: Option<&'a str>,
  updated_at: Option<DateTime<Utc>>,
}

/// Render every panel as pretty-printed JSON.
pub fn to_json<T: Serialize + Send + Sync + 'static>(dashboard: &Dashboard<T>) -> Result<String> {
  let report = PageReport {
    page: dashboard.name(),
    window: dashboard.window().map(ReportingWindow::to_string),
    panels: dashboard
      .panels()
      .map(|(operation, snapshot)| PanelReport {
        operation,
        state: snapshot.state,
        stale: snapshot.is_stale(),
        data: snapshot.data(),
        error: snapshot.error(),
        updated_at: snapshot.updated_at,
      })
      .collect(),
  };

  serde_json::to_string_pretty(&report).map_err(|e| eyre!("Failed to render report: {}", e))
}

/// Render one line per panel: name, state and a data preview or the error.
pub fn to_text<T: Serialize + Send + Sync + 'static>(dashboard: &Dashboard<T>) -> String {
  let mut out = match dashboard.window() {
    Some(window) => format!("{} [{}]\n", dashboard.name(), window),
    None => format!("{}\n", dashboard.name()),
  };

  let width = dashboard
    .panels()
    .map(|(operation, _)| operation.as_str().len())
    .max()
    .unwrap_or(0);

  for (operation, snapshot) in dashboard.panels() {
    let detail = match (snapshot.error(), snapshot.data()) {
      (Some(error), Some(data)) if snapshot.state.is_failed() => format!(
        "{} (showing data from {}: {})",
        error,
        snapshot
          .updated_at
          .map(|at| at.format("%H:%M:%S").to_string())
          .unwrap_or_else(|| "earlier".to_string()),
        preview(data)
      ),
      (Some(error), None) if snapshot.state.is_failed() => error.to_string(),
      (_, Some(data)) => preview(data),
      _ => String::new(),
    };
    out.push_str(&format!(
      "  {:<width$}  {:<7}  {}\n",
      operation.as_str(),
      snapshot.state.to_string(),
      detail,
      width = width
    ));
  }

  out
}

fn preview<T: Serialize>(data: &T) -> String {
  let compact = serde_json::to_string(data).unwrap_or_else(|_| "<unprintable>".to_string());
  if compact.chars().count() <= PREVIEW_WIDTH {
    return compact;
  }
  let mut cut: String = compact.chars().take(PREVIEW_WIDTH - 1).collect();
  cut.push('…');
  cut
}
