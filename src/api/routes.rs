use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::handlers::{
    compare_periods, create_business, get_category_benchmark, get_competitor_insights,
    get_dashboard, get_growth_rates, get_reviews_timeseries, get_views_timeseries, health_check,
    track_view, AppState,
};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let analytics_routes = Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/compare", post(compare_periods))
        .route("/businesses/{business_id}/views", get(get_views_timeseries))
        .route(
            "/businesses/{business_id}/reviews",
            get(get_reviews_timeseries),
        )
        .route("/businesses/{business_id}/growth", get(get_growth_rates))
        .route("/benchmark", get(get_category_benchmark))
        .route("/competitors", get(get_competitor_insights));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/businesses", post(create_business))
        .nest("/api/analytics", analytics_routes)
        .route("/api/track/view", post(track_view))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
