//! Reporting windows: the date range every dashboard panel is fetched for.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::OrchestratorError;

/// Inclusive `[from, to]` range of instants a dashboard reports on.
///
/// Equality and hashing are exact on both bounds, so two windows that
/// describe the same day with different times are different cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReportingWindow {
  from: DateTime<Utc>,
  to: DateTime<Utc>,
}

impl ReportingWindow {
  /// Record the bounds as given. Use [`validate`](Self::validate) or
  /// [`checked`](Self::checked) to reject reversed windows.
  pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
    Self { from, to }
  }

  /// Create a window, rejecting one whose end precedes its start.
  pub fn checked(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, OrchestratorError> {
    let window = Self::new(from, to);
    window.validate()?;
    Ok(window)
  }

  /// Parse both bounds and validate the result.
  ///
  /// Each bound is either a calendar date (`2024-01-31`, taken as midnight UTC)
  /// or an RFC 3339 timestamp.
  pub fn parse(from: &str, to: &str) -> Result<Self, OrchestratorError> {
    Self::checked(parse_bound(from)?, parse_bound(to)?)
  }

  /// The `days` days leading up to and including `today`.
  ///
  /// Fails when the start would fall outside the representable date range.
  pub fn last_days(days: u32, today: NaiveDate) -> Result<Self, OrchestratorError> {
    let to = midnight(today);
    let from = to
      .checked_sub_signed(Duration::days(i64::from(days)))
      .ok_or_else(|| {
        OrchestratorError::InvalidWindow(format!("{} days before {} is out of range", days, today))
      })?;
    Ok(Self::new(from, to))
  }

  pub fn from(&self) -> DateTime<Utc> {
    self.from
  }

  pub fn to(&self) -> DateTime<Utc> {
    self.to
  }

  pub fn validate(&self) -> Result<(), OrchestratorError> {
    if self.to < self.from {
      return Err(OrchestratorError::InvalidWindow(format!(
        "end {} precedes start {}",
        self.to.to_rfc3339(),
        self.from.to_rfc3339()
      )));
    }
    Ok(())
  }

  /// Both bounds fall on midnight UTC, so the window is a plain date range.
  pub fn is_date_aligned(&self) -> bool {
    self.from.time() == NaiveTime::MIN && self.to.time() == NaiveTime::MIN
  }
}

impl fmt::Display for ReportingWindow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_date_aligned() {
      write!(f, "{}..{}", self.from.date_naive(), self.to.date_naive())
    } else {
      write!(f, "{}..{}", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
  }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
  date.and_time(NaiveTime::MIN).and_utc()
}

fn parse_bound(input: &str) -> Result<DateTime<Utc>, OrchestratorError> {
  let input = input.trim();
  if input.is_empty() {
    return Err(OrchestratorError::InvalidWindow(
      "missing window bound".to_string(),
    ));
  }

  if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
    return Ok(midnight(date));
  }

  DateTime::parse_from_rfc3339(input)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| OrchestratorError::InvalidWindow(format!("cannot parse '{}': {}", input, e)))
}
