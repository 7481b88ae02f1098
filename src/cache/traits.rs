//! Core key types for the caching system.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::window::ReportingWindow;

/// Identifier of one data-fetching operation (one dashboard panel),
/// e.g. `assetStatistics` or `groupWiseAssets`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(Cow<'static, str>);

impl OperationKey {
  pub const fn from_static(name: &'static str) -> Self {
    Self(Cow::Borrowed(name))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for OperationKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&'static str> for OperationKey {
  fn from(name: &'static str) -> Self {
    Self::from_static(name)
  }
}

impl From<String> for OperationKey {
  fn from(name: String) -> Self {
    Self(Cow::Owned(name))
  }
}

impl From<&OperationKey> for OperationKey {
  fn from(key: &OperationKey) -> Self {
    key.clone()
  }
}

/// Cache lookup key: one entry per operation and window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub operation: OperationKey,
  pub window: ReportingWindow,
}

impl CacheKey {
  pub fn new(operation: OperationKey, window: ReportingWindow) -> Self {
    Self { operation, window }
  }

  /// Whether this key is selected by an optional operation/window filter.
  /// `None` matches anything.
  pub fn matches(&self, operation: Option<&OperationKey>, window: Option<&ReportingWindow>) -> bool {
    operation.map_or(true, |op| *op == self.operation) && window.map_or(true, |w| *w == self.window)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.operation, self.window)
  }
}

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// A new fetch was dispatched for this request
  Network,
  /// Fresh cached data, no fetch
  Cache,
  /// Attached to a fetch already in flight for the same key
  InFlight,
}

/// A boxed, one-shot fetch. Used where operations with different closure
/// types are handled together (e.g. `request_all`).
pub type Fetcher<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, String>> + Send>;

/// Box a fetch closure into a [`Fetcher`], rendering its error as a message.
pub fn fetcher<T, F, Fut, E>(fetch: F) -> Fetcher<T>
where
  T: 'static,
  F: FnOnce() -> Fut + Send + 'static,
  Fut: std::future::Future<Output = Result<T, E>> + Send + 'static,
  E: fmt::Display + Send + 'static,
{
  Box::new(move || {
    let fut = fetch();
    Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
  })
}
