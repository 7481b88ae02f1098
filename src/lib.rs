//! Cached, de-duplicated data fetching for analytics dashboards.
//!
//! A [`DashboardDataOrchestrator`] sits between dashboard panels and the
//! REST endpoints behind them. Responses are cached per
//! `(operation, reporting window)` for a TTL, concurrent requests for the
//! same key share one fetch, and a failing panel never takes its siblings
//! down with it.

pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod logging;
pub mod query;
pub mod report;
pub mod window;

pub use cache::{
  AggregateHandle, CacheKey, CacheSource, DashboardDataOrchestrator, ErrorPolicy, OperationKey,
  DEFAULT_TTL,
};
pub use dashboard::{Dashboard, PanelSource};
pub use error::{FetchFailed, OrchestratorError};
pub use query::{OperationHandle, OperationState, Snapshot};
pub use window::ReportingWindow;
