//! Daily snapshot creation and growth-rate math
//!
//! Snapshots are append-only per-business-per-day rollups. The daily job
//! batch-fetches one grouped query per metric and then inserts only the
//! rows that do not already exist, so retried runs are safe. Growth rates
//! compare summed metrics across two adjacent snapshot windows.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Days, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::analytics::comparison::percent_change;
use crate::analytics::models::{AnalyticsSnapshot, DateRange, GrowthRateData, NewSnapshot};
use crate::analytics::period::engagement_score;
use crate::storage::{Storage, StorageError};

pub struct SnapshotService {
    storage: Arc<dyn Storage>,
    retention_days: i64,
    /// Checked between per-business iterations so a shutdown can stop the
    /// daily job cleanly; each snapshot write is atomic on its own.
    shutdown: Arc<Mutex<bool>>,
}

/// Adjacent snapshot windows ending yesterday: `current_days` rows for the
/// current window, `previous_days` rows immediately before it, no gap and
/// no overlap.
pub fn growth_windows(
    today: NaiveDate,
    current_days: i64,
    previous_days: i64,
) -> (DateRange, DateRange) {
    let current_end = today - Days::new(1);
    let current_start = current_end - Days::new(current_days.saturating_sub(1) as u64);
    let previous_end = current_start - Days::new(1);
    let previous_start = previous_end - Days::new(previous_days.saturating_sub(1) as u64);
    (
        DateRange::new(current_start, current_end),
        DateRange::new(previous_start, previous_end),
    )
}

impl SnapshotService {
    pub fn new(storage: Arc<dyn Storage>, retention_days: i64) -> Self {
        Self {
            storage,
            retention_days,
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    /// Signal the running daily job to stop after the current business.
    pub async fn request_shutdown(&self) {
        let mut shutdown = self.shutdown.lock().await;
        *shutdown = true;
    }

    /// Create snapshots for every active business for one target date
    /// (default: yesterday). Returns the number of snapshots created.
    ///
    /// Idempotent: existing (business, date) rows are skipped, and a lost
    /// insert race against a concurrent job counts as already-existing.
    /// Per-business failures are logged and skipped; the job reports
    /// successes, not all-or-nothing.
    pub async fn create_daily_snapshots(&self, date: Option<NaiveDate>) -> Result<usize> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive() - Days::new(1));
        let businesses = self.storage.active_businesses().await?;

        // One grouped query per metric across all businesses.
        let views = self.storage.daily_view_counts(date).await?;
        let reviews = self.storage.daily_review_stats(date).await?;
        let favorites = self.storage.daily_favorite_counts(date).await?;

        let mut created = 0;
        for business in &businesses {
            if *self.shutdown.lock().await {
                info!(
                    "Snapshot job stopping early after {} of {} businesses",
                    created,
                    businesses.len()
                );
                break;
            }

            match self
                .insert_if_absent(business.id, date, &views, &reviews, &favorites)
                .await
            {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "Skipping snapshot for business {} on {}: {}",
                        business.id, date, e
                    );
                }
            }
        }

        debug!("Created {} snapshots for {}", created, date);
        Ok(created)
    }

    /// On-demand backfill for one business. Returns `None` when a snapshot
    /// for that (business, date) already exists.
    pub async fn create_business_snapshot(
        &self,
        business_id: i64,
        date: NaiveDate,
    ) -> Result<Option<AnalyticsSnapshot>> {
        if self.storage.snapshot_exists(business_id, date).await? {
            return Ok(None);
        }

        let views = self.storage.daily_view_counts(date).await?;
        let reviews = self.storage.daily_review_stats(date).await?;
        let favorites = self.storage.daily_favorite_counts(date).await?;

        let snapshot = build_snapshot(business_id, date, &views, &reviews, &favorites);
        match self.storage.insert_snapshot(&snapshot).await {
            Ok(row) => Ok(Some(row)),
            Err(StorageError::SnapshotExists) => Ok(None),
            Err(StorageError::Other(e)) => Err(e),
        }
    }

    /// Growth rates between two adjacent snapshot windows ending yesterday.
    pub async fn growth_rates(
        &self,
        business_id: i64,
        current_days: i64,
        previous_days: i64,
    ) -> Result<GrowthRateData> {
        let today = Utc::now().date_naive();
        let (current_window, previous_window) = growth_windows(today, current_days, previous_days);

        let current = self.storage.get_snapshots(business_id, current_window).await?;
        let previous = self
            .storage
            .get_snapshots(business_id, previous_window)
            .await?;

        let (cur_views, cur_reviews, cur_favorites) = sum_snapshots(&current);
        let (prev_views, prev_reviews, prev_favorites) = sum_snapshots(&previous);

        Ok(GrowthRateData {
            business_id,
            current_window,
            previous_window,
            views_growth: percent_change(cur_views as f64, prev_views as f64),
            reviews_growth: percent_change(cur_reviews as f64, prev_reviews as f64),
            favorites_growth: percent_change(cur_favorites as f64, prev_favorites as f64),
        })
    }

    /// Delete snapshots older than the retention window in one batch.
    pub async fn cleanup(&self, retention_days: Option<i64>) -> Result<u64> {
        let retention = retention_days.unwrap_or(self.retention_days);
        let cutoff = Utc::now().date_naive() - Days::new(retention.max(0) as u64);
        let deleted = self.storage.delete_snapshots_before(cutoff).await?;
        if deleted > 0 {
            info!("Retention cleanup removed {} snapshots before {}", deleted, cutoff);
        }
        Ok(deleted)
    }

    async fn insert_if_absent(
        &self,
        business_id: i64,
        date: NaiveDate,
        views: &HashMap<i64, i64>,
        reviews: &HashMap<i64, (i64, f64)>,
        favorites: &HashMap<i64, i64>,
    ) -> Result<bool> {
        if self.storage.snapshot_exists(business_id, date).await? {
            return Ok(false);
        }

        let snapshot = build_snapshot(business_id, date, views, reviews, favorites);
        match self.storage.insert_snapshot(&snapshot).await {
            Ok(_) => Ok(true),
            // Another worker won the race; the UNIQUE constraint held.
            Err(StorageError::SnapshotExists) => Ok(false),
            Err(StorageError::Other(e)) => Err(e),
        }
    }
}

fn build_snapshot(
    business_id: i64,
    date: NaiveDate,
    views: &HashMap<i64, i64>,
    reviews: &HashMap<i64, (i64, f64)>,
    favorites: &HashMap<i64, i64>,
) -> NewSnapshot {
    let total_views = views.get(&business_id).copied().unwrap_or(0);
    let (total_reviews, average_rating) = reviews
        .get(&business_id)
        .map(|&(count, avg)| (count, Some(avg)))
        .unwrap_or((0, None));
    let total_favorites = favorites.get(&business_id).copied().unwrap_or(0);

    let engagement = if total_views > 0 {
        Some(engagement_score(total_views, total_reviews, total_favorites))
    } else {
        None
    };

    NewSnapshot {
        business_id,
        snapshot_date: date,
        total_views,
        total_reviews,
        total_favorites,
        average_rating,
        engagement_score: engagement,
    }
}

fn sum_snapshots(snapshots: &[AnalyticsSnapshot]) -> (i64, i64, i64) {
    snapshots.iter().fold((0, 0, 0), |(v, r, f), s| {
        (v + s.total_views, r + s.total_reviews, f + s.total_favorites)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_growth_windows_disjoint_and_adjacent() {
        let today = d("2024-06-15");
        let (current, previous) = growth_windows(today, 30, 30);

        assert_eq!(current.end, d("2024-06-14"));
        assert_eq!(current.calendar_days(), 30);
        assert_eq!(previous.calendar_days(), 30);
        // Previous window ends exactly one day before the current one starts.
        assert_eq!(previous.end + Days::new(1), current.start);
    }

    #[test]
    fn test_growth_windows_unequal_lengths() {
        let today = d("2024-06-15");
        let (current, previous) = growth_windows(today, 7, 14);
        assert_eq!(current.calendar_days(), 7);
        assert_eq!(previous.calendar_days(), 14);
        assert_eq!(previous.end + Days::new(1), current.start);
    }

    #[test]
    fn test_build_snapshot_missing_metrics_are_null() {
        let snapshot = build_snapshot(
            5,
            d("2024-06-01"),
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
        );
        assert_eq!(snapshot.total_views, 0);
        assert_eq!(snapshot.average_rating, None);
        assert_eq!(snapshot.engagement_score, None);
    }

    #[test]
    fn test_build_snapshot_engagement() {
        let views = HashMap::from([(5, 10)]);
        let reviews = HashMap::from([(5, (5, 4.2))]);
        let favorites = HashMap::from([(5, 2)]);

        let snapshot = build_snapshot(5, d("2024-06-01"), &views, &reviews, &favorites);
        assert_eq!(snapshot.total_views, 10);
        assert_eq!(snapshot.total_reviews, 5);
        assert_eq!(snapshot.average_rating, Some(4.2));
        assert_eq!(snapshot.engagement_score, Some(70.0));
    }
}
