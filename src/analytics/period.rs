//! Period aggregation
//!
//! Reduces raw event collections into a [`PeriodData`] summary for one
//! closed date window. Pure arithmetic over already-fetched rows: no I/O,
//! never panics, and every aggregate degrades to zero (or `None`) on empty
//! input.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::analytics::models::{
    DateRange, DayViews, FavoriteEvent, PeriodData, ReviewEvent, ViewEvent,
};

/// Engagement score: reviews and favorites as equally weighted deep-engagement
/// signals, normalized per 100 views. Zero when there is no traffic.
pub fn engagement_score(total_views: i64, total_reviews: i64, total_favorites: i64) -> f64 {
    if total_views == 0 {
        return 0.0;
    }
    (total_reviews + total_favorites) as f64 * 100.0 / total_views as f64
}

/// Aggregate a window of raw events into one [`PeriodData`].
///
/// Events outside `[range.start, range.end]` are ignored, so callers may
/// pass over-fetched collections. Per-day averages divide by
/// `max(1, end - start)` days.
pub fn compute_period_data(
    views: &[ViewEvent],
    reviews: &[ReviewEvent],
    favorites: &[FavoriteEvent],
    range: DateRange,
) -> PeriodData {
    let in_range = |date: NaiveDate| date >= range.start && date <= range.end;

    let mut views_by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for view in views {
        let date = view.viewed_at.date_naive();
        if in_range(date) {
            *views_by_day.entry(date).or_insert(0) += 1;
        }
    }
    let total_views: i64 = views_by_day.values().sum();

    let mut total_reviews = 0i64;
    let mut rating_sum = 0.0f64;
    for review in reviews {
        if in_range(review.created_at.date_naive()) {
            total_reviews += 1;
            rating_sum += review.rating;
        }
    }
    let average_rating = if total_reviews > 0 {
        Some(rating_sum / total_reviews as f64)
    } else {
        None
    };

    let total_favorites = favorites
        .iter()
        .filter(|f| in_range(f.created_at.date_naive()))
        .count() as i64;

    let period_days = range.period_days() as f64;

    let mut peak_day: Option<DayViews> = None;
    let mut low_day: Option<DayViews> = None;
    for (&date, &count) in &views_by_day {
        // Ascending iteration keeps the earliest day on count ties.
        if peak_day.map_or(true, |p| count > p.views) {
            peak_day = Some(DayViews { date, views: count });
        }
        if low_day.map_or(true, |l| count < l.views) {
            low_day = Some(DayViews { date, views: count });
        }
    }

    PeriodData {
        range,
        total_views,
        total_reviews,
        total_favorites,
        average_rating,
        engagement_score: engagement_score(total_views, total_reviews, total_favorites),
        average_views_per_day: total_views as f64 / period_days,
        average_reviews_per_day: total_reviews as f64 / period_days,
        average_favorites_per_day: total_favorites as f64 / period_days,
        peak_day,
        low_day,
    }
}
