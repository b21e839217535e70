//! Data models for directory analytics
//!
//! Raw event rows (views, reviews, favorites), the derived period/comparison
//! summaries, and the persisted daily snapshot row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Platform a page view came from.
///
/// `All` is only meaningful as a filter value ("no platform filter");
/// stored rows always carry a concrete platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Mobile,
    Api,
    All,
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "web" => Some(Platform::Web),
            "mobile" => Some(Platform::Mobile),
            "api" => Some(Platform::Api),
            "all" => Some(Platform::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Mobile => "mobile",
            Platform::Api => "api",
            Platform::All => "all",
        }
    }
}

/// One logged page view. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct ViewEvent {
    pub id: i64,
    pub business_id: i64,
    pub viewed_at: DateTime<Utc>,
    pub platform: Platform,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A view pending insertion, produced by the tracker hot path.
#[derive(Debug, Clone)]
pub struct NewViewEvent {
    pub business_id: i64,
    pub viewed_at: DateTime<Utc>,
    pub platform: Platform,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One review. Storage only ever returns active rows.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewEvent {
    pub id: i64,
    pub business_id: i64,
    pub created_at: DateTime<Utc>,
    pub rating: f64,
    pub is_active: bool,
}

/// One favorite currently present in the window.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FavoriteEvent {
    pub id: i64,
    pub business_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A closed calendar-date interval `[start, end]` (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Period length used as the per-day-average denominator.
    /// Fixed convention: `max(1, end - start)`.
    pub fn period_days(&self) -> i64 {
        (self.end - self.start).num_days().max(1)
    }

    /// Number of calendar dates covered, inclusive of both endpoints.
    pub fn calendar_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterate every calendar date in the range, ascending.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let start = self.start;
        (0..self.calendar_days().max(0)).map(move |offset| start + chrono::Days::new(offset as u64))
    }
}

/// Views on a single calendar day, used for peak/low reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayViews {
    pub date: NaiveDate,
    pub views: i64,
}

/// Ephemeral summary of one period for a set of businesses.
///
/// `average_rating` is `None` when the window contains zero reviews so
/// callers never confuse "no reviews yet" with a genuinely low average.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodData {
    pub range: DateRange,
    pub total_views: i64,
    pub total_reviews: i64,
    pub total_favorites: i64,
    pub average_rating: Option<f64>,
    pub engagement_score: f64,
    pub average_views_per_day: f64,
    pub average_reviews_per_day: f64,
    pub average_favorites_per_day: f64,
    pub peak_day: Option<DayViews>,
    pub low_day: Option<DayViews>,
}

impl PeriodData {
    /// All-zero summary for a window, used by the fail-open policy when a
    /// single business's aggregation faults.
    pub fn zeroed(range: DateRange) -> Self {
        Self {
            range,
            total_views: 0,
            total_reviews: 0,
            total_favorites: 0,
            average_rating: None,
            engagement_score: 0.0,
            average_views_per_day: 0.0,
            average_reviews_per_day: 0.0,
            average_favorites_per_day: 0.0,
            peak_day: None,
            low_day: None,
        }
    }
}

/// Persisted one-row-per-business-per-day rollup.
///
/// Append-only: created once, never updated, deleted only by retention
/// cleanup. Uniqueness of (business_id, snapshot_date) is enforced by the
/// storage schema.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AnalyticsSnapshot {
    pub id: i64,
    pub business_id: i64,
    pub snapshot_date: NaiveDate,
    pub total_views: i64,
    pub total_reviews: i64,
    pub total_favorites: i64,
    pub average_rating: Option<f64>,
    pub engagement_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A snapshot pending insertion.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub business_id: i64,
    pub snapshot_date: NaiveDate,
    pub total_views: i64,
    pub total_reviews: i64,
    pub total_favorites: i64,
    pub average_rating: Option<f64>,
    pub engagement_score: Option<f64>,
}

/// Direction of movement across the three vote signals (views, reviews,
/// rating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Qualitative label derived from (engagement score, average rating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Named comparison windows plus user-chosen custom ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    WeekOverWeek,
    MonthOverMonth,
    QuarterOverQuarter,
    YearOverYear,
    CustomRange,
}

impl ComparisonType {
    /// Window length in days for the named types; `None` for custom ranges.
    pub fn window_days(&self) -> Option<i64> {
        match self {
            ComparisonType::WeekOverWeek => Some(7),
            ComparisonType::MonthOverMonth => Some(30),
            ComparisonType::QuarterOverQuarter => Some(90),
            ComparisonType::YearOverYear => Some(365),
            ComparisonType::CustomRange => None,
        }
    }
}

/// Derived comparison of two periods. Purely computed, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetrics {
    pub current: PeriodData,
    pub previous: PeriodData,
    pub views_change: f64,
    pub reviews_change: f64,
    pub favorites_change: f64,
    pub rating_change: f64,
    pub engagement_change: f64,
    pub trend: Trend,
    pub performance: PerformanceRating,
    /// Human-readable highlights; guaranteed non-empty.
    pub key_changes: Vec<String>,
}

/// Growth rates between two adjacent snapshot windows.
#[derive(Debug, Clone, Serialize)]
pub struct GrowthRateData {
    pub business_id: i64,
    pub current_window: DateRange,
    pub previous_window: DateRange,
    pub views_growth: f64,
    pub reviews_growth: f64,
    pub favorites_growth: f64,
}

/// Category-wide benchmark of the user's businesses against all peers in
/// the category. Withheld entirely when the peer population is too small.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryBenchmark {
    pub category: String,
    pub peer_count: usize,
    pub your_business_count: usize,
    pub your_average_views: f64,
    pub category_average_views: f64,
    pub your_average_reviews: f64,
    pub category_average_reviews: f64,
    pub your_average_rating: Option<f64>,
    pub category_average_rating: Option<f64>,
}

/// Where a business stands relative to its direct competitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketPosition {
    Leading,
    Competitive,
    Trailing,
}

/// Comparison of one business against others sharing its category and town.
#[derive(Debug, Clone, Serialize)]
pub struct CompetitorInsight {
    pub business_id: i64,
    pub business_name: String,
    pub category: String,
    pub town: String,
    pub competitor_count: usize,
    pub your_views: i64,
    pub your_reviews: i64,
    pub your_rating: Option<f64>,
    pub competitor_average_views: f64,
    pub competitor_average_reviews: f64,
    pub competitor_average_rating: Option<f64>,
    pub market_position: MarketPosition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_platform_parse_roundtrip() {
        for p in [Platform::Web, Platform::Mobile, Platform::Api, Platform::All] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse("desktop"), None);
    }

    #[test]
    fn test_period_days_guards_zero_length() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-01"));
        assert_eq!(range.period_days(), 1);
        assert_eq!(range.calendar_days(), 1);

        let week = DateRange::new(d("2024-03-01"), d("2024-03-08"));
        assert_eq!(week.period_days(), 7);
        assert_eq!(week.calendar_days(), 8);
    }

    #[test]
    fn test_iter_days_covers_every_date() {
        let range = DateRange::new(d("2024-02-27"), d("2024-03-02"));
        let days: Vec<NaiveDate> = range.iter_days().collect();
        assert_eq!(
            days,
            vec![
                d("2024-02-27"),
                d("2024-02-28"),
                d("2024-02-29"),
                d("2024-03-01"),
                d("2024-03-02"),
            ]
        );
    }

    #[test]
    fn test_named_window_lengths() {
        assert_eq!(ComparisonType::WeekOverWeek.window_days(), Some(7));
        assert_eq!(ComparisonType::MonthOverMonth.window_days(), Some(30));
        assert_eq!(ComparisonType::QuarterOverQuarter.window_days(), Some(90));
        assert_eq!(ComparisonType::YearOverYear.window_days(), Some(365));
        assert_eq!(ComparisonType::CustomRange.window_days(), None);
    }
}
