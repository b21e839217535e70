//! Business analytics: period aggregation, time series, comparisons,
//! daily snapshots, and benchmarks.
//!
//! The pure aggregation math lives in [`period`], [`timeseries`], and
//! [`comparison`] and never touches storage; [`service`], [`snapshots`],
//! and [`benchmark`] orchestrate fetches through the storage facade and
//! hand the rows to those functions. [`tracker`] buffers incoming view
//! events off the request hot path.

pub mod benchmark;
pub mod comparison;
pub mod models;
pub mod period;
pub mod service;
pub mod snapshots;
pub mod timeseries;
pub mod tracker;

pub use benchmark::BenchmarkService;
pub use service::{AnalyticsError, AnalyticsService, ComparisonRequest, Dashboard};
pub use snapshots::SnapshotService;
pub use tracker::ViewTracker;

use chrono::{DateTime, Days, NaiveTime, Utc};

use crate::analytics::models::DateRange;

/// Timestamp bounds covering a date range: midnight UTC of the start date
/// up to (exclusive) midnight after the end date, so events on the end
/// date itself are included.
pub(crate) fn window_bounds(range: DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = range.start.and_time(NaiveTime::MIN).and_utc();
    let end = (range.end + Days::new(1)).and_time(NaiveTime::MIN).and_utc();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_window_bounds_include_end_date() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        );
        let (start, end) = window_bounds(range);
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-03T00:00:00+00:00");
    }
}
