use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use moka::future::Cache;

use crate::analytics::models::{
    AnalyticsSnapshot, DateRange, FavoriteEvent, NewSnapshot, NewViewEvent, Platform, ReviewEvent,
    ViewEvent,
};
use crate::models::Business;
use crate::storage::{Storage, StorageResult};

/// Storage wrapper that caches business lookups.
///
/// Business rows change rarely but are read on every dashboard request
/// (ownership checks, peer lookups), so a short-TTL read cache in front of
/// the database pays for itself. Event and snapshot reads pass straight
/// through: aggregation windows move every request and must see fresh rows.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    business_cache: Cache<i64, Option<Business>>,
    owner_cache: Cache<String, Vec<Business>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64) -> Self {
        let business_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(60))
            .build();
        let owner_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(60))
            .build();

        Self {
            inner,
            business_cache,
            owner_cache,
        }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_business(
        &self,
        owner_id: &str,
        name: &str,
        category: &str,
        town: &str,
    ) -> Result<Business> {
        let business = self
            .inner
            .create_business(owner_id, name, category, town)
            .await?;

        self.business_cache
            .insert(business.id, Some(business.clone()))
            .await;
        self.owner_cache.invalidate(owner_id).await;

        Ok(business)
    }

    async fn get_business(&self, id: i64) -> Result<Option<Business>> {
        if let Some(cached) = self.business_cache.get(&id).await {
            return Ok(cached);
        }

        let result = self.inner.get_business(id).await?;
        self.business_cache.insert(id, result.clone()).await;
        Ok(result)
    }

    async fn get_user_businesses(&self, user_id: &str) -> Result<Vec<Business>> {
        if let Some(cached) = self.owner_cache.get(user_id).await {
            return Ok(cached);
        }

        let result = self.inner.get_user_businesses(user_id).await?;
        self.owner_cache
            .insert(user_id.to_string(), result.clone())
            .await;
        Ok(result)
    }

    async fn get_category_businesses(&self, category: &str) -> Result<Vec<Business>> {
        self.inner.get_category_businesses(category).await
    }

    async fn active_businesses(&self) -> Result<Vec<Business>> {
        self.inner.active_businesses().await
    }

    async fn deactivate_business(&self, id: i64) -> Result<bool> {
        let owner = self
            .inner
            .get_business(id)
            .await?
            .map(|b| b.owner_id);

        let result = self.inner.deactivate_business(id).await?;
        if result {
            self.business_cache.invalidate(&id).await;
            if let Some(owner) = owner {
                self.owner_cache.invalidate(&owner).await;
            }
        }
        Ok(result)
    }

    async fn insert_view_logs(&self, events: &[NewViewEvent]) -> Result<()> {
        self.inner.insert_view_logs(events).await
    }

    async fn get_business_view_logs(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        platform: Option<Platform>,
    ) -> Result<Vec<ViewEvent>> {
        self.inner
            .get_business_view_logs(business_ids, start, end, platform)
            .await
    }

    async fn insert_review(
        &self,
        business_id: i64,
        rating: f64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.inner.insert_review(business_id, rating, created_at).await
    }

    async fn deactivate_review(&self, review_id: i64) -> Result<bool> {
        self.inner.deactivate_review(review_id).await
    }

    async fn get_business_reviews(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewEvent>> {
        self.inner
            .get_business_reviews(business_ids, start, end)
            .await
    }

    async fn insert_favorite(&self, business_id: i64, created_at: DateTime<Utc>) -> Result<i64> {
        self.inner.insert_favorite(business_id, created_at).await
    }

    async fn get_business_favorites(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FavoriteEvent>> {
        self.inner
            .get_business_favorites(business_ids, start, end)
            .await
    }

    async fn daily_view_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>> {
        self.inner.daily_view_counts(date).await
    }

    async fn daily_review_stats(&self, date: NaiveDate) -> Result<HashMap<i64, (i64, f64)>> {
        self.inner.daily_review_stats(date).await
    }

    async fn daily_favorite_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>> {
        self.inner.daily_favorite_counts(date).await
    }

    async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StorageResult<AnalyticsSnapshot> {
        self.inner.insert_snapshot(snapshot).await
    }

    async fn snapshot_exists(&self, business_id: i64, date: NaiveDate) -> Result<bool> {
        self.inner.snapshot_exists(business_id, date).await
    }

    async fn get_snapshots(
        &self,
        business_id: i64,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        self.inner.get_snapshots(business_id, range).await
    }

    async fn delete_snapshots_before(&self, cutoff: NaiveDate) -> Result<u64> {
        self.inner.delete_snapshots_before(cutoff).await
    }
}
