//! Work items and the lazy sequences that generate them.
//!
//! A pipeline consumes any `Iterator<Item = WorkItem>`. The helpers here cover
//! the common shapes of paginated or enumerable APIs:
//!
//! - [`id_range`] - numeric ids (`0, 1, 2, ...`)
//! - [`day_intervals`] - consecutive date windows (`2025-09-01..2025-09-10`, ...)
//! - [`url_sequence`] - `{base_url}/{id}` for each generated id
//!
//! # Example
//!
//! ```
//! use bulkfetch_core::source::{id_range, url_sequence};
//!
//! let urls: Vec<_> = url_sequence("https://api.example.com/items", id_range(0, 3, 1))
//!     .map(|item| item.to_string())
//!     .collect();
//! assert_eq!(urls[2], "https://api.example.com/items/2");
//! ```

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date format used when rendering intervals into URLs.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Opaque descriptor of one unit of remote work (usually a URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    /// Wraps a descriptor.
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// Returns the descriptor as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owned descriptor.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkItem {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for WorkItem {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Yields `{base_url}/{id}` for every id, lazily.
///
/// A trailing `/` on `base_url` is ignored so ids are never double-slashed.
pub fn url_sequence<I>(base_url: &str, ids: I) -> impl Iterator<Item = WorkItem> + use<I>
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    let base = base_url.trim_end_matches('/').to_string();
    ids.into_iter()
        .map(move |id| WorkItem::new(format!("{base}/{id}")))
}

/// Yields ids in `[start, end)` spaced by `step` (a zero step is treated as 1).
#[must_use]
pub fn id_range(start: i64, end: i64, step: usize) -> std::iter::StepBy<std::ops::Range<i64>> {
    (start..end).step_by(step.max(1))
}

/// Splits `[start, end]` into consecutive inclusive windows of `delta_days` days.
///
/// The last window is shortened to end on `end`. A zero `delta_days` is
/// treated as 1.
///
/// ```
/// use chrono::NaiveDate;
/// use bulkfetch_core::source::day_intervals;
///
/// let start = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
/// let windows: Vec<_> = day_intervals(start, end, 2).collect();
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[2], (end, end));
/// ```
#[must_use]
pub fn day_intervals(start: NaiveDate, end: NaiveDate, delta_days: u32) -> DayIntervals {
    DayIntervals {
        next_start: Some(start),
        end,
        span: u64::from(delta_days.max(1)) - 1,
    }
}

/// Iterator returned by [`day_intervals`].
#[derive(Debug, Clone)]
pub struct DayIntervals {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
    /// Days added to a window's start to reach its (inclusive) end.
    span: u64,
}

impl Iterator for DayIntervals {
    type Item = (NaiveDate, NaiveDate);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start.filter(|start| *start <= self.end)?;

        let window_end = start
            .checked_add_days(Days::new(self.span))
            .map_or(self.end, |candidate| candidate.min(self.end));

        self.next_start = if window_end < self.end {
            window_end.checked_add_days(Days::new(1))
        } else {
            None
        };
        Some((start, window_end))
    }
}

/// Renders a date window into a descriptor using `{from}` and `{to}` placeholders.
///
/// ```
/// use chrono::NaiveDate;
/// use bulkfetch_core::source::render_interval;
///
/// let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
/// assert_eq!(
///     render_interval("report?from={from}&to={to}", (day, day)),
///     "report?from=2025-09-01&to=2025-09-01"
/// );
/// ```
#[must_use]
pub fn render_interval(template: &str, (from, to): (NaiveDate, NaiveDate)) -> String {
    template
        .replace("{from}", &from.format(DATE_FORMAT).to_string())
        .replace("{to}", &to.format(DATE_FORMAT).to_string())
}
