//! Snapshot job and growth-rate tests against in-memory SQLite
//!
//! Covers idempotent daily snapshot creation, the duplicate-insert guard,
//! growth-rate math over adjacent snapshot windows, and retention cleanup.

use chrono::{Days, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

use tally::analytics::models::{NewSnapshot, NewViewEvent, Platform};
use tally::analytics::snapshots::growth_windows;
use tally::analytics::SnapshotService;
use tally::storage::{SqliteStorage, Storage, StorageError};

async fn create_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn view_on(business_id: i64, date: NaiveDate) -> NewViewEvent {
    NewViewEvent {
        business_id,
        viewed_at: date
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
            .and_utc(),
        platform: Platform::Web,
        visitor_ip: None,
        user_agent: None,
    }
}

fn snapshot_row(business_id: i64, date: NaiveDate, views: i64) -> NewSnapshot {
    NewSnapshot {
        business_id,
        snapshot_date: date,
        total_views: views,
        total_reviews: 0,
        total_favorites: 0,
        average_rating: None,
        engagement_score: None,
    }
}

#[tokio::test]
async fn test_daily_snapshots_are_idempotent() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let a = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();
    let b = storage
        .create_business("user-2", "Hill Bakery", "bakery", "Riverton")
        .await
        .unwrap();

    let yesterday = Utc::now().date_naive() - Days::new(1);
    storage
        .insert_view_logs(&[view_on(a.id, yesterday), view_on(b.id, yesterday)])
        .await
        .unwrap();

    let created = service.create_daily_snapshots(None).await.unwrap();
    assert_eq!(created, 2);

    // Rerunning the job for the same day creates nothing new.
    let created_again = service.create_daily_snapshots(None).await.unwrap();
    assert_eq!(created_again, 0);
}

#[tokio::test]
async fn test_snapshot_values_roll_up_one_day() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let date = Utc::now().date_naive() - Days::new(1);
    let noon = date
        .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        .and_utc();

    let views: Vec<NewViewEvent> = (0..10).map(|_| view_on(business.id, date)).collect();
    storage.insert_view_logs(&views).await.unwrap();
    for rating in [4.0, 4.0, 5.0, 3.0, 5.0] {
        storage.insert_review(business.id, rating, noon).await.unwrap();
    }
    storage.insert_favorite(business.id, noon).await.unwrap();
    storage.insert_favorite(business.id, noon).await.unwrap();

    // Activity on the neighboring day must not leak into the rollup.
    storage
        .insert_view_logs(&[view_on(business.id, date - Days::new(1))])
        .await
        .unwrap();

    let snapshot = service
        .create_business_snapshot(business.id, date)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.snapshot_date, date);
    assert_eq!(snapshot.total_views, 10);
    assert_eq!(snapshot.total_reviews, 5);
    assert_eq!(snapshot.total_favorites, 2);
    assert_eq!(snapshot.average_rating, Some(4.2));
    assert_eq!(snapshot.engagement_score, Some(70.0));
}

#[tokio::test]
async fn test_backfill_refuses_duplicate_date() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let date = Utc::now().date_naive() - Days::new(3);
    let first = service
        .create_business_snapshot(business.id, date)
        .await
        .unwrap();
    assert!(first.is_some());

    let second = service
        .create_business_snapshot(business.id, date)
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_unique_constraint_rejects_duplicate_insert() {
    let storage = create_storage().await;

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let date = Utc::now().date_naive() - Days::new(1);
    let row = snapshot_row(business.id, date, 5);

    storage.insert_snapshot(&row).await.unwrap();
    let err = storage.insert_snapshot(&row).await.unwrap_err();
    assert!(matches!(err, StorageError::SnapshotExists));
}

#[tokio::test]
async fn test_growth_rates_over_adjacent_windows() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let (current_window, previous_window) = growth_windows(today, 7, 7);

    // The windows are adjacent, equal length, and never include today.
    assert_eq!(current_window.end, today - Days::new(1));
    assert_eq!(previous_window.end + Days::new(1), current_window.start);
    assert_eq!(current_window.calendar_days(), 7);

    storage
        .insert_snapshot(&snapshot_row(business.id, current_window.start, 10))
        .await
        .unwrap();
    storage
        .insert_snapshot(&snapshot_row(business.id, current_window.end, 20))
        .await
        .unwrap();
    storage
        .insert_snapshot(&snapshot_row(business.id, previous_window.end, 20))
        .await
        .unwrap();

    let growth = service.growth_rates(business.id, 7, 7).await.unwrap();
    // 30 views now vs 20 before.
    assert_eq!(growth.views_growth, 50.0);
    // No reviews in either window reads as flat, not as an error.
    assert_eq!(growth.reviews_growth, 0.0);
}

#[tokio::test]
async fn test_growth_from_nothing_is_full_swing() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let (current_window, _) = growth_windows(today, 30, 30);
    storage
        .insert_snapshot(&snapshot_row(business.id, current_window.end, 50))
        .await
        .unwrap();

    let growth = service.growth_rates(business.id, 30, 30).await.unwrap();
    assert_eq!(growth.views_growth, 100.0);
    assert_eq!(growth.favorites_growth, 0.0);
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_snapshots() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    storage
        .insert_snapshot(&snapshot_row(business.id, today - Days::new(800), 1))
        .await
        .unwrap();
    storage
        .insert_snapshot(&snapshot_row(business.id, today - Days::new(1), 1))
        .await
        .unwrap();

    let deleted = service.cleanup(None).await.unwrap();
    assert_eq!(deleted, 1);

    // A second pass finds nothing left to remove.
    assert_eq!(service.cleanup(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_inactive_businesses_are_skipped() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let active = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();
    let retired = storage
        .create_business("user-1", "Old Diner", "diner", "Riverton")
        .await
        .unwrap();
    storage.deactivate_business(retired.id).await.unwrap();

    let yesterday = Utc::now().date_naive() - Days::new(1);
    storage
        .insert_view_logs(&[view_on(active.id, yesterday), view_on(retired.id, yesterday)])
        .await
        .unwrap();

    let created = service.create_daily_snapshots(None).await.unwrap();
    assert_eq!(created, 1);
    assert!(!storage
        .snapshot_exists(retired.id, yesterday)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_shutdown_request_stops_job_between_businesses() {
    let storage = create_storage().await;
    let service = Arc::new(SnapshotService::new(Arc::clone(&storage), 730));

    let a = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();
    let b = storage
        .create_business("user-2", "Hill Bakery", "bakery", "Riverton")
        .await
        .unwrap();

    let yesterday = Utc::now().date_naive() - Days::new(1);
    storage
        .insert_view_logs(&[view_on(a.id, yesterday), view_on(b.id, yesterday)])
        .await
        .unwrap();

    // The flag is checked before each business, so a request raised before
    // the job starts stops it with a partial (here zero) count.
    service.request_shutdown().await;
    let created = service.create_daily_snapshots(None).await.unwrap();
    assert_eq!(created, 0);
    assert!(!storage.snapshot_exists(a.id, yesterday).await.unwrap());
    assert!(!storage.snapshot_exists(b.id, yesterday).await.unwrap());

    // A fresh service (flag down) completes the same run.
    let fresh = SnapshotService::new(Arc::clone(&storage), 730);
    assert_eq!(fresh.create_daily_snapshots(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_explicit_date_snapshot() {
    let storage = create_storage().await;
    let service = SnapshotService::new(Arc::clone(&storage), 730);

    let business = storage
        .create_business("user-1", "Corner Cafe", "cafe", "Riverton")
        .await
        .unwrap();

    let target = Utc::now().date_naive() - Days::new(5);
    storage
        .insert_view_logs(&[view_on(business.id, target)])
        .await
        .unwrap();

    let created = service.create_daily_snapshots(Some(target)).await.unwrap();
    assert_eq!(created, 1);
    assert!(storage.snapshot_exists(business.id, target).await.unwrap());
}
