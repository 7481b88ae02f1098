use crate::cache::OperationKey;
use crate::query::Snapshot;

/// A panel's state changed.
///
/// Tagged with the dashboard generation that requested it, so updates for a
/// window the dashboard has since moved away from can be told apart.
#[derive(Debug)]
pub struct PanelEvent<T> {
  pub operation: OperationKey,
  pub generation: u64,
  pub snapshot: Snapshot<T>,
}
