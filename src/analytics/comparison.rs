//! Period-over-period comparison
//!
//! Takes two already-aggregated [`PeriodData`] summaries and derives
//! percentage deltas, a majority-vote trend, a qualitative performance
//! label, and narrative highlights.

use chrono::{Days, NaiveDate};

use crate::analytics::models::{
    ComparisonMetrics, ComparisonType, DateRange, PerformanceRating, PeriodData, Trend,
};

/// Engagement score at or above this (paired with an excellent rating)
/// earns the top label.
const ENGAGEMENT_STRONG: f64 = 20.0;
const ENGAGEMENT_GOOD: f64 = 10.0;
const RATING_EXCELLENT: f64 = 4.5;
const RATING_GOOD: f64 = 4.0;
const RATING_FLOOR: f64 = 3.0;

/// Volume metrics (views, reviews, favorites) must move by at least this
/// much to be called out; ratings are more sensitive.
const SIGNIFICANT_VOLUME_PCT: f64 = 10.0;
const SIGNIFICANT_RATING_PCT: f64 = 5.0;

/// Percentage change with the zero-previous convention: growth from nothing
/// reads as a full positive swing (100), nothing-to-nothing reads as flat (0).
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Current and immediately preceding windows for a named comparison type.
///
/// The previous window ends exactly one day before the current one starts:
/// back-to-back, equal length, no overlap. `None` for custom ranges, which
/// the caller supplies directly.
pub fn comparison_windows(kind: ComparisonType, today: NaiveDate) -> Option<(DateRange, DateRange)> {
    kind.window_days().map(|days| adjacent_windows(days, today))
}

/// Rolling current window of `days` ending today, plus the equal-length
/// window immediately before it.
pub fn adjacent_windows(days: i64, today: NaiveDate) -> (DateRange, DateRange) {
    let days = days.max(1) as u64;
    let current_end = today;
    let current_start = today - Days::new(days);
    let previous_end = current_start - Days::new(1);
    let previous_start = previous_end - Days::new(days);
    (
        DateRange::new(current_start, current_end),
        DateRange::new(previous_start, previous_end),
    )
}

/// Derive the full comparison between two periods.
pub fn compare_periods(current: &PeriodData, previous: &PeriodData) -> ComparisonMetrics {
    let current_rating = current.average_rating.unwrap_or(0.0);
    let previous_rating = previous.average_rating.unwrap_or(0.0);

    let views_change = percent_change(current.total_views as f64, previous.total_views as f64);
    let reviews_change =
        percent_change(current.total_reviews as f64, previous.total_reviews as f64);
    let favorites_change = percent_change(
        current.total_favorites as f64,
        previous.total_favorites as f64,
    );
    let rating_change = percent_change(current_rating, previous_rating);
    let engagement_change = percent_change(current.engagement_score, previous.engagement_score);

    let trend = overall_trend(current, previous);
    let performance = performance_rating(current.engagement_score, current.average_rating);
    let key_changes = key_changes(views_change, reviews_change, favorites_change, rating_change);

    ComparisonMetrics {
        current: current.clone(),
        previous: previous.clone(),
        views_change,
        reviews_change,
        favorites_change,
        rating_change,
        engagement_change,
        trend,
        performance,
        key_changes,
    }
}

/// Majority vote across views, reviews, and rating. Ties favor stability.
fn overall_trend(current: &PeriodData, previous: &PeriodData) -> Trend {
    let signals = [
        (
            current.total_views as f64,
            previous.total_views as f64,
        ),
        (
            current.total_reviews as f64,
            previous.total_reviews as f64,
        ),
        (
            current.average_rating.unwrap_or(0.0),
            previous.average_rating.unwrap_or(0.0),
        ),
    ];

    let mut increases = 0;
    let mut decreases = 0;
    for (now, before) in signals {
        if now > before {
            increases += 1;
        } else if now < before {
            decreases += 1;
        }
    }

    if increases > decreases {
        Trend::Improving
    } else if decreases > increases {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Joint thresholds on engagement and rating. High traffic alone never
/// lifts a mediocre rating above Fair.
fn performance_rating(engagement: f64, average_rating: Option<f64>) -> PerformanceRating {
    let rating = average_rating.unwrap_or(0.0);
    if engagement >= ENGAGEMENT_STRONG && rating >= RATING_EXCELLENT {
        PerformanceRating::Excellent
    } else if engagement >= ENGAGEMENT_GOOD && rating >= RATING_GOOD {
        PerformanceRating::Good
    } else if rating >= RATING_FLOOR {
        PerformanceRating::Fair
    } else {
        PerformanceRating::Poor
    }
}

fn key_changes(
    views_change: f64,
    reviews_change: f64,
    favorites_change: f64,
    rating_change: f64,
) -> Vec<String> {
    let mut changes = Vec::new();

    if views_change.abs() >= SIGNIFICANT_VOLUME_PCT {
        changes.push(format!(
            "Page views {} by {:.1}% compared to the previous period",
            direction(views_change),
            views_change.abs()
        ));
    }
    if reviews_change.abs() >= SIGNIFICANT_VOLUME_PCT {
        changes.push(format!(
            "Review volume {} by {:.1}%",
            direction(reviews_change),
            reviews_change.abs()
        ));
    }
    if favorites_change.abs() >= SIGNIFICANT_VOLUME_PCT {
        changes.push(format!(
            "Favorites {} by {:.1}%",
            direction(favorites_change),
            favorites_change.abs()
        ));
    }
    if rating_change.abs() >= SIGNIFICANT_RATING_PCT {
        let verb = if rating_change > 0.0 {
            "improved"
        } else {
            "dropped"
        };
        changes.push(format!(
            "Average rating {} by {:.1}%",
            verb,
            rating_change.abs()
        ));
    }

    if changes.is_empty() {
        changes.push("Performance held steady compared to the previous period".to_string());
    }
    changes
}

fn direction(change: f64) -> &'static str {
    if change > 0.0 {
        "increased"
    } else {
        "decreased"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn period(views: i64, reviews: i64, rating: Option<f64>, engagement: f64) -> PeriodData {
        let mut data = PeriodData::zeroed(DateRange::new(d("2024-03-01"), d("2024-03-08")));
        data.total_views = views;
        data.total_reviews = reviews;
        data.average_rating = rating;
        data.engagement_score = engagement;
        data
    }

    #[test]
    fn test_percent_change_boundaries() {
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(5.0, 0.0), 100.0);
        assert_eq!(percent_change(10.0, 5.0), 100.0);
        assert_eq!(percent_change(5.0, 10.0), -50.0);
    }

    #[test]
    fn test_windows_are_adjacent_and_equal_length() {
        let today = d("2024-06-15");
        for kind in [
            ComparisonType::WeekOverWeek,
            ComparisonType::MonthOverMonth,
            ComparisonType::QuarterOverQuarter,
            ComparisonType::YearOverYear,
        ] {
            let (current, previous) = comparison_windows(kind, today).unwrap();
            assert_eq!(current.end, today);
            assert_eq!(previous.end + Days::new(1), current.start);
            assert_eq!(current.period_days(), previous.period_days());
            assert_eq!(current.period_days(), kind.window_days().unwrap());
        }
        assert!(comparison_windows(ComparisonType::CustomRange, today).is_none());
    }

    #[test]
    fn test_trend_majority_vote() {
        // Views and reviews up, rating down: two against one.
        let current = period(100, 20, Some(4.0), 20.0);
        let previous = period(50, 10, Some(4.5), 20.0);
        assert_eq!(compare_periods(&current, &previous).trend, Trend::Improving);

        // One up, one down, one flat: tie goes to stable.
        let current = period(100, 10, Some(4.0), 20.0);
        let previous = period(50, 10, Some(4.5), 20.0);
        assert_eq!(compare_periods(&current, &previous).trend, Trend::Stable);

        let current = period(10, 5, Some(3.0), 5.0);
        let previous = period(50, 10, Some(4.5), 20.0);
        assert_eq!(compare_periods(&current, &previous).trend, Trend::Declining);
    }

    #[test]
    fn test_performance_requires_joint_thresholds() {
        assert_eq!(
            performance_rating(25.0, Some(4.8)),
            PerformanceRating::Excellent
        );
        assert_eq!(performance_rating(12.0, Some(4.2)), PerformanceRating::Good);
        // High engagement but mediocre rating stays Fair.
        assert_eq!(performance_rating(50.0, Some(3.5)), PerformanceRating::Fair);
        assert_eq!(performance_rating(50.0, Some(2.0)), PerformanceRating::Poor);
        // No reviews at all reads as Poor, not as a hidden zero rating.
        assert_eq!(performance_rating(50.0, None), PerformanceRating::Poor);
    }

    #[test]
    fn test_key_changes_never_empty() {
        let current = period(100, 10, Some(4.0), 10.0);
        let metrics = compare_periods(&current, &current.clone());
        assert_eq!(metrics.key_changes.len(), 1);
        assert!(metrics.key_changes[0].contains("steady"));
    }

    #[test]
    fn test_key_changes_thresholds() {
        // Views +50%, rating -6%: both called out.
        let current = period(150, 10, Some(4.23), 10.0);
        let previous = period(100, 10, Some(4.5), 10.0);
        let metrics = compare_periods(&current, &previous);
        assert!(metrics
            .key_changes
            .iter()
            .any(|c| c.contains("Page views increased by 50.0%")));
        assert!(metrics
            .key_changes
            .iter()
            .any(|c| c.starts_with("Average rating dropped")));

        // A 4% rating move is below the rating threshold.
        let current = period(100, 10, Some(4.32), 10.0);
        let metrics = compare_periods(&current, &previous);
        assert!(!metrics
            .key_changes
            .iter()
            .any(|c| c.contains("Average rating")));
    }

    #[test]
    fn test_new_activity_from_nothing() {
        let current = period(50, 0, None, 0.0);
        let previous = period(0, 0, None, 0.0);
        let metrics = compare_periods(&current, &previous);
        assert_eq!(metrics.views_change, 100.0);
        assert_eq!(metrics.reviews_change, 0.0);
    }
}
