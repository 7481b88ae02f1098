//! Error types surfaced by the orchestrator.

use thiserror::Error;

use crate::cache::OperationKey;

/// Caller mistakes rejected synchronously, before any fetch is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
  /// The window's end precedes its start, or a bound could not be parsed.
  #[error("invalid reporting window: {0}")]
  InvalidWindow(String),

  /// The operation is not part of the registered set.
  #[error("unknown operation '{0}'")]
  UnknownOperation(OperationKey),
}

/// A fetch that failed, captured into the operation's state.
///
/// Never returned from `request`; read it from the handle instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} fetch failed: {message}")]
pub struct FetchFailed {
  pub operation: OperationKey,
  pub message: String,
}
