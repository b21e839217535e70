use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::analytics::models::{
    CategoryBenchmark, ComparisonMetrics, CompetitorInsight, DateRange, GrowthRateData,
    NewViewEvent, Platform,
};
use crate::analytics::timeseries::{ReviewsPoint, ViewsPoint};
use crate::analytics::{
    AnalyticsError, AnalyticsService, BenchmarkService, ComparisonRequest, Dashboard,
    SnapshotService, ViewTracker,
};
use crate::config::AnalyticsLimits;
use crate::models::{Business, CreateBusinessRequest};
use crate::storage::Storage;
use crate::validation::{check_business_access, validate_days};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub analytics: AnalyticsService,
    pub snapshots: SnapshotService,
    pub benchmark: BenchmarkService,
    pub tracker: ViewTracker,
    pub limits: AnalyticsLimits,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// The upstream proxy authenticates the caller and forwards their identity
/// in this header. A request without it never passed through the proxy.
fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing user identity"))
}

fn map_analytics_error(err: AnalyticsError) -> ApiError {
    match err {
        AnalyticsError::Validation(v) => error_response(StatusCode::BAD_REQUEST, v.to_string()),
        AnalyticsError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Business not found"),
        AnalyticsError::AccessDenied(_) => {
            error_response(StatusCode::FORBIDDEN, "You do not own this business")
        }
        AnalyticsError::Internal(e) => {
            error!("Analytics request failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

pub async fn create_business(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateBusinessRequest>,
) -> Result<(StatusCode, Json<Business>), ApiError> {
    let user_id = require_user(&headers)?;
    if payload.name.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Business name cannot be empty",
        ));
    }
    match state
        .storage
        .create_business(&user_id, &payload.name, &payload.category, &payload.town)
        .await
    {
        Ok(business) => Ok((StatusCode::CREATED, Json(business))),
        Err(e) => {
            error!("Failed to create business: {:#}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct DashboardQuery {
    #[serde(default = "default_days")]
    pub days: i64,
    pub platform: Option<String>,
}

fn default_days() -> i64 {
    30
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let user_id = require_user(&headers)?;
    state
        .analytics
        .dashboard(&user_id, query.days, query.platform.as_deref())
        .await
        .map(Json)
        .map_err(map_analytics_error)
}

pub async fn compare_periods(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ComparisonRequest>,
) -> Result<Json<ComparisonMetrics>, ApiError> {
    let user_id = require_user(&headers)?;
    state
        .analytics
        .compare(&user_id, payload)
        .await
        .map(Json)
        .map_err(map_analytics_error)
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub platform: Option<String>,
}

pub async fn get_views_timeseries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<ViewsPoint>>, ApiError> {
    let user_id = require_user(&headers)?;
    let range = DateRange::new(query.start, query.end);
    state
        .analytics
        .views_timeseries(&user_id, business_id, range, query.platform.as_deref())
        .await
        .map(Json)
        .map_err(map_analytics_error)
}

pub async fn get_reviews_timeseries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<ReviewsPoint>>, ApiError> {
    let user_id = require_user(&headers)?;
    let range = DateRange::new(query.start, query.end);
    state
        .analytics
        .reviews_timeseries(&user_id, business_id, range)
        .await
        .map(Json)
        .map_err(map_analytics_error)
}

#[derive(Deserialize)]
pub struct GrowthQuery {
    #[serde(default = "default_days")]
    pub current_days: i64,
    #[serde(default = "default_days")]
    pub previous_days: i64,
}

pub async fn get_growth_rates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<i64>,
    Query(query): Query<GrowthQuery>,
) -> Result<Json<GrowthRateData>, ApiError> {
    let user_id = require_user(&headers)?;

    validate_days(query.current_days, &state.limits)
        .and_then(|_| validate_days(query.previous_days, &state.limits))
        .map_err(|v| error_response(StatusCode::BAD_REQUEST, v.to_string()))?;

    check_business_access(state.storage.as_ref(), business_id, &user_id)
        .await
        .map_err(|e| map_analytics_error(e.into()))?;

    state
        .snapshots
        .growth_rates(business_id, query.current_days, query.previous_days)
        .await
        .map(Json)
        .map_err(|e| map_analytics_error(e.into()))
}

#[derive(Deserialize)]
pub struct BenchmarkQuery {
    pub category: String,
}

pub async fn get_category_benchmark(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BenchmarkQuery>,
) -> Result<Json<CategoryBenchmark>, ApiError> {
    let user_id = require_user(&headers)?;
    match state
        .benchmark
        .category_benchmark(&user_id, &query.category)
        .await
    {
        Ok(Some(benchmark)) => Ok(Json(benchmark)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            "Not enough businesses in this category for a benchmark",
        )),
        Err(e) => Err(map_analytics_error(e.into())),
    }
}

pub async fn get_competitor_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CompetitorInsight>>, ApiError> {
    let user_id = require_user(&headers)?;
    state
        .benchmark
        .competitor_insights(&user_id)
        .await
        .map(Json)
        .map_err(|e| map_analytics_error(e.into()))
}

#[derive(Deserialize)]
pub struct TrackViewRequest {
    pub business_id: i64,
    pub platform: Option<String>,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Record one page view. Public endpoint on the hot path: the event goes
/// into the tracker buffer and the response never waits on the database.
pub async fn track_view(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrackViewRequest>,
) -> Result<StatusCode, ApiError> {
    let platform = match payload.platform.as_deref() {
        Some(raw) => Platform::parse(raw).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown platform: {}", raw),
            )
        })?,
        None => Platform::Web,
    };
    if platform == Platform::All {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Platform 'all' is a filter, not a source",
        ));
    }

    state.tracker.record(NewViewEvent {
        business_id: payload.business_id,
        viewed_at: Utc::now(),
        platform,
        visitor_ip: payload.visitor_ip,
        user_agent: payload.user_agent,
    });

    Ok(StatusCode::ACCEPTED)
}
