//! Gap-filled daily time series
//!
//! Charts need a continuous axis, so these builders emit exactly one point
//! per calendar day in the requested range, zero-filled for days without
//! activity. Pure functions of (events, range): calling twice yields
//! identical output.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analytics::models::{DateRange, ReviewEvent, ViewEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewsPoint {
    pub date: NaiveDate,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewsPoint {
    pub date: NaiveDate,
    pub reviews: i64,
    /// 0.0 on days with no reviews; chart axes want a number, not a gap.
    pub average_rating: f64,
}

/// Daily view counts, one point per calendar day, strictly ascending.
pub fn views_series(events: &[ViewEvent], range: DateRange) -> Vec<ViewsPoint> {
    let mut per_day: HashMap<NaiveDate, i64> = HashMap::new();
    for event in events {
        let date = event.viewed_at.date_naive();
        if date >= range.start && date <= range.end {
            *per_day.entry(date).or_insert(0) += 1;
        }
    }

    range
        .iter_days()
        .map(|date| ViewsPoint {
            date,
            views: per_day.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Daily review counts with that day's average rating.
pub fn reviews_series(events: &[ReviewEvent], range: DateRange) -> Vec<ReviewsPoint> {
    let mut per_day: HashMap<NaiveDate, (i64, f64)> = HashMap::new();
    for event in events {
        let date = event.created_at.date_naive();
        if date >= range.start && date <= range.end {
            let entry = per_day.entry(date).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += event.rating;
        }
    }

    range
        .iter_days()
        .map(|date| {
            let (reviews, rating_sum) = per_day.get(&date).copied().unwrap_or((0, 0.0));
            ReviewsPoint {
                date,
                reviews,
                average_rating: if reviews > 0 {
                    rating_sum / reviews as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::Platform;
    use chrono::{DateTime, Utc};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        format!("{s}T08:30:00Z").parse().unwrap()
    }

    fn view(day: &str) -> ViewEvent {
        ViewEvent {
            id: 0,
            business_id: 1,
            viewed_at: ts(day),
            platform: Platform::Mobile,
            visitor_ip: None,
            user_agent: None,
        }
    }

    fn review(day: &str, rating: f64) -> ReviewEvent {
        ReviewEvent {
            id: 0,
            business_id: 1,
            created_at: ts(day),
            rating,
            is_active: true,
        }
    }

    #[test]
    fn test_zero_gap_invariant() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-10"));
        let events = vec![view("2024-03-02"), view("2024-03-02"), view("2024-03-09")];

        let series = views_series(&events, range);

        assert_eq!(series.len() as i64, range.calendar_days());
        for (i, point) in series.iter().enumerate() {
            assert_eq!(point.date, d("2024-03-01") + chrono::Days::new(i as u64));
        }
        assert_eq!(series[1].views, 2);
        assert_eq!(series[8].views, 1);
        assert_eq!(series[0].views, 0);
    }

    #[test]
    fn test_idempotent() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-05"));
        let events = vec![view("2024-03-03")];
        assert_eq!(views_series(&events, range), views_series(&events, range));
    }

    #[test]
    fn test_single_day_range() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-01"));
        let series = views_series(&[], range);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].views, 0);
    }

    #[test]
    fn test_reviews_series_day_averages() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-03"));
        let events = vec![
            review("2024-03-01", 4.0),
            review("2024-03-01", 5.0),
            review("2024-03-03", 2.0),
        ];

        let series = reviews_series(&events, range);

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].reviews, 2);
        assert_eq!(series[0].average_rating, 4.5);
        // Empty day reports 0.0, not a hole.
        assert_eq!(series[1].reviews, 0);
        assert_eq!(series[1].average_rating, 0.0);
        assert_eq!(series[2].average_rating, 2.0);
    }

    #[test]
    fn test_events_outside_range_ignored() {
        let range = DateRange::new(d("2024-03-02"), d("2024-03-04"));
        let events = vec![view("2024-03-01"), view("2024-03-05")];
        let series = views_series(&events, range);
        assert!(series.iter().all(|p| p.views == 0));
    }
}
