//! Request-facing analytics orchestration
//!
//! Validates, batch-fetches raw events through the storage facade, then
//! reduces in memory with the pure aggregation functions. The fetch always
//! completes before any math runs, so every computation sees an immutable
//! snapshot of the data. An unexpected fault while reducing one period
//! degrades that period to zeros instead of failing the whole request:
//! one bad business's rows must not blank a user's dashboard.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::analytics::comparison::{adjacent_windows, compare_periods, comparison_windows};
use crate::analytics::models::{
    ComparisonMetrics, ComparisonType, DateRange, FavoriteEvent, PeriodData, ReviewEvent,
    ViewEvent,
};
use crate::analytics::period::compute_period_data;
use crate::analytics::timeseries::{reviews_series, views_series, ReviewsPoint, ViewsPoint};
use crate::analytics::window_bounds;
use crate::config::AnalyticsLimits;
use crate::storage::Storage;
use crate::validation::{
    check_business_access, validate_comparison_request, validate_date_range, validate_days,
    validate_platform, AccessError, ValidationFailure,
};

/// Typed failures the presentation layer maps to distinct responses.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("business {0} not found")]
    NotFound(i64),
    #[error("access to business {0} denied")]
    AccessDenied(i64),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AccessError> for AnalyticsError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotFound(id) => AnalyticsError::NotFound(id),
            AccessError::NotOwned(id) => AnalyticsError::AccessDenied(id),
            AccessError::Storage(e) => AnalyticsError::Internal(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ComparisonRequest {
    pub kind: ComparisonType,
    pub current: Option<DateRange>,
    pub previous: Option<DateRange>,
}

/// Everything the dashboard page renders for one user.
#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub business_count: usize,
    pub metrics: ComparisonMetrics,
    pub views: Vec<ViewsPoint>,
    pub reviews: Vec<ReviewsPoint>,
}

pub struct AnalyticsService {
    storage: Arc<dyn Storage>,
    limits: AnalyticsLimits,
}

impl AnalyticsService {
    pub fn new(storage: Arc<dyn Storage>, limits: AnalyticsLimits) -> Self {
        Self { storage, limits }
    }

    /// Rolling dashboard over the user's businesses: current window,
    /// previous window, comparison, and chart series.
    pub async fn dashboard(
        &self,
        user_id: &str,
        days: i64,
        platform: Option<&str>,
    ) -> Result<Dashboard, AnalyticsError> {
        validate_days(days, &self.limits)?;
        let platform = validate_platform(platform)?;

        let today = Utc::now().date_naive();
        let (current, previous) = adjacent_windows(days, today);

        let businesses = self.storage.get_user_businesses(user_id).await?;
        let ids: Vec<i64> = businesses.iter().map(|b| b.id).collect();

        // One fetch spanning both windows; both reductions read from it.
        let span = DateRange::new(previous.start, current.end);
        let (start, end) = window_bounds(span);
        let views = self
            .storage
            .get_business_view_logs(&ids, Some(start), Some(end), platform)
            .await?;
        let reviews = self
            .storage
            .get_business_reviews(&ids, Some(start), Some(end))
            .await?;
        let favorites = self
            .storage
            .get_business_favorites(&ids, Some(start), Some(end))
            .await?;

        let current_data = period_or_zero(&views, &reviews, &favorites, current);
        let previous_data = period_or_zero(&views, &reviews, &favorites, previous);
        let metrics = compare_periods(&current_data, &previous_data);

        Ok(Dashboard {
            business_count: businesses.len(),
            views: views_series(&views, current),
            reviews: reviews_series(&reviews, current),
            metrics,
        })
    }

    /// Named or custom period-over-period comparison across the user's
    /// businesses.
    pub async fn compare(
        &self,
        user_id: &str,
        request: ComparisonRequest,
    ) -> Result<ComparisonMetrics, AnalyticsError> {
        let today = Utc::now().date_naive();
        validate_comparison_request(
            request.kind,
            request.current,
            request.previous,
            today,
            &self.limits,
        )?;

        let (current, previous) = match comparison_windows(request.kind, today) {
            Some(windows) => windows,
            // Custom range: validation above guarantees both are present.
            None => match (request.current, request.previous) {
                (Some(current), Some(previous)) => (current, previous),
                _ => {
                    return Err(ValidationFailure {
                        field: "current_range",
                        code: "missing_custom_range",
                        message: "custom comparisons require both period ranges".to_string(),
                    }
                    .into())
                }
            },
        };

        let businesses = self.storage.get_user_businesses(user_id).await?;
        let ids: Vec<i64> = businesses.iter().map(|b| b.id).collect();

        let span = DateRange::new(
            current.start.min(previous.start),
            current.end.max(previous.end),
        );
        let (start, end) = window_bounds(span);
        let views = self
            .storage
            .get_business_view_logs(&ids, Some(start), Some(end), None)
            .await?;
        let reviews = self
            .storage
            .get_business_reviews(&ids, Some(start), Some(end))
            .await?;
        let favorites = self
            .storage
            .get_business_favorites(&ids, Some(start), Some(end))
            .await?;

        let current_data = period_or_zero(&views, &reviews, &favorites, current);
        let previous_data = period_or_zero(&views, &reviews, &favorites, previous);
        Ok(compare_periods(&current_data, &previous_data))
    }

    /// Gap-filled daily view series for one owned business.
    pub async fn views_timeseries(
        &self,
        user_id: &str,
        business_id: i64,
        range: DateRange,
        platform: Option<&str>,
    ) -> Result<Vec<ViewsPoint>, AnalyticsError> {
        let today = Utc::now().date_naive();
        validate_date_range(range, today, &self.limits)?;
        let platform = validate_platform(platform)?;
        check_business_access(self.storage.as_ref(), business_id, user_id).await?;

        let (start, end) = window_bounds(range);
        let views = self
            .storage
            .get_business_view_logs(&[business_id], Some(start), Some(end), platform)
            .await?;
        Ok(views_series(&views, range))
    }

    /// Gap-filled daily review series for one owned business.
    pub async fn reviews_timeseries(
        &self,
        user_id: &str,
        business_id: i64,
        range: DateRange,
    ) -> Result<Vec<ReviewsPoint>, AnalyticsError> {
        let today = Utc::now().date_naive();
        validate_date_range(range, today, &self.limits)?;
        check_business_access(self.storage.as_ref(), business_id, user_id).await?;

        let (start, end) = window_bounds(range);
        let reviews = self
            .storage
            .get_business_reviews(&[business_id], Some(start), Some(end))
            .await?;
        Ok(reviews_series(&reviews, range))
    }
}

/// Fail-open reduction: an unexpected panic inside the period math yields
/// an all-zero period for that window instead of aborting the request.
fn period_or_zero(
    views: &[ViewEvent],
    reviews: &[ReviewEvent],
    favorites: &[FavoriteEvent],
    range: DateRange,
) -> PeriodData {
    match std::panic::catch_unwind(AssertUnwindSafe(|| {
        compute_period_data(views, reviews, favorites, range)
    })) {
        Ok(data) => data,
        Err(_) => {
            warn!(
                "Period aggregation fault for {} to {}; returning zeroed period",
                range.start, range.end
            );
            PeriodData::zeroed(range)
        }
    }
}
