//! In-memory caching layer for dashboard data.
//!
//! This module provides a transport-agnostic orchestrator that:
//! - Caches one result per operation and reporting window, for a fixed TTL
//! - De-duplicates concurrent requests for the same key into a single fetch
//! - Fans out many operations for one window with per-operation state
//! - Keeps failures local to the operation that produced them

mod aggregate;
mod entry;
mod orchestrator;
mod traits;

pub use aggregate::AggregateHandle;
pub use orchestrator::{DashboardDataOrchestrator, ErrorPolicy, DEFAULT_TTL};
pub use traits::{fetcher, CacheKey, CacheSource, Fetcher, OperationKey};
