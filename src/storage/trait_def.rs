use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::analytics::models::{
    AnalyticsSnapshot, DateRange, FavoriteEvent, NewSnapshot, NewViewEvent, Platform, ReviewEvent,
    ViewEvent,
};
use crate::models::Business;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("a snapshot already exists for this business and date")]
    SnapshotExists,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Data-access facade for the analytics core.
///
/// Event reads take a business-id set plus an optional half-open time
/// window `[start, end)` and return in-memory collections; the aggregation
/// math never issues its own queries. Review reads return active rows only.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes, constraints).
    async fn init(&self) -> Result<()>;

    // Businesses

    async fn create_business(
        &self,
        owner_id: &str,
        name: &str,
        category: &str,
        town: &str,
    ) -> Result<Business>;

    async fn get_business(&self, id: i64) -> Result<Option<Business>>;

    /// Active businesses owned by a user.
    async fn get_user_businesses(&self, user_id: &str) -> Result<Vec<Business>>;

    /// Active businesses in a category, across all owners.
    async fn get_category_businesses(&self, category: &str) -> Result<Vec<Business>>;

    /// All active businesses (daily snapshot job input).
    async fn active_businesses(&self) -> Result<Vec<Business>>;

    /// Soft-delete a business.
    async fn deactivate_business(&self, id: i64) -> Result<bool>;

    // Raw event rows

    /// Batch-insert buffered view logs from the tracker.
    async fn insert_view_logs(&self, events: &[NewViewEvent]) -> Result<()>;

    /// View logs for a business set, optionally bounded to `[start, end)`
    /// and filtered by platform (`None` or `Platform::All` means no filter).
    async fn get_business_view_logs(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        platform: Option<Platform>,
    ) -> Result<Vec<ViewEvent>>;

    async fn insert_review(
        &self,
        business_id: i64,
        rating: f64,
        created_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Soft-delete a review so it stops counting toward aggregates.
    async fn deactivate_review(&self, review_id: i64) -> Result<bool>;

    async fn get_business_reviews(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewEvent>>;

    async fn insert_favorite(&self, business_id: i64, created_at: DateTime<Utc>) -> Result<i64>;

    async fn get_business_favorites(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FavoriteEvent>>;

    // Daily rollup inputs
    //
    // One grouped query per metric across all businesses; the snapshot job
    // must never fall back to a per-business fetch loop.

    /// Views per business for one UTC calendar day.
    async fn daily_view_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>>;

    /// (review count, average rating) per business for one UTC calendar day.
    async fn daily_review_stats(&self, date: NaiveDate) -> Result<HashMap<i64, (i64, f64)>>;

    /// Favorites per business for one UTC calendar day.
    async fn daily_favorite_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>>;

    // Snapshots

    /// Insert a snapshot row. The (business_id, snapshot_date) UNIQUE
    /// constraint is the authoritative guard against concurrent duplicate
    /// writers; violations surface as [`StorageError::SnapshotExists`].
    async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StorageResult<AnalyticsSnapshot>;

    async fn snapshot_exists(&self, business_id: i64, date: NaiveDate) -> Result<bool>;

    /// Snapshots for one business within `[range.start, range.end]`,
    /// ascending by date.
    async fn get_snapshots(
        &self,
        business_id: i64,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSnapshot>>;

    /// Batch-delete snapshots dated strictly before the cutoff.
    async fn delete_snapshots_before(&self, cutoff: NaiveDate) -> Result<u64>;
}
