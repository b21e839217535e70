use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::analytics::models::{
    AnalyticsSnapshot, DateRange, FavoriteEvent, NewSnapshot, NewViewEvent, Platform, ReviewEvent,
    ViewEvent,
};
use crate::models::Business;
use crate::storage::{day_bounds, Storage, StorageError, StorageResult};

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

type ViewRow = (
    i64,
    i64,
    DateTime<Utc>,
    String,
    Option<String>,
    Option<String>,
);

fn view_from_row(row: ViewRow) -> ViewEvent {
    let (id, business_id, viewed_at, platform, visitor_ip, user_agent) = row;
    ViewEvent {
        id,
        business_id,
        viewed_at,
        // Rows are only written by the tracker, which stores a known tag.
        platform: Platform::parse(&platform).unwrap_or(Platform::Web),
        visitor_ip,
        user_agent,
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS businesses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                town TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_businesses_owner ON businesses(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_businesses_category ON businesses(category, town)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS view_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id INTEGER NOT NULL,
                viewed_at TEXT NOT NULL,
                platform TEXT NOT NULL,
                visitor_ip TEXT,
                user_agent TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_view_logs_business ON view_logs(business_id, viewed_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                rating REAL NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reviews_business ON reviews(business_id, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_favorites_business ON favorites(business_id, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        // The UNIQUE constraint is the authoritative guard against two
        // snapshot jobs racing on the same (business, date) pair.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id INTEGER NOT NULL,
                snapshot_date TEXT NOT NULL,
                total_views INTEGER NOT NULL DEFAULT 0,
                total_reviews INTEGER NOT NULL DEFAULT 0,
                total_favorites INTEGER NOT NULL DEFAULT 0,
                average_rating REAL,
                engagement_score REAL,
                created_at TEXT NOT NULL,
                UNIQUE (business_id, snapshot_date)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_date ON analytics_snapshots(snapshot_date)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_business(
        &self,
        owner_id: &str,
        name: &str,
        category: &str,
        town: &str,
    ) -> Result<Business> {
        let created_at = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO businesses (owner_id, name, category, town, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(name)
        .bind(category)
        .bind(town)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Business {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            town: town.to_string(),
            is_active: true,
            created_at,
        })
    }

    async fn get_business(&self, id: i64) -> Result<Option<Business>> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, category, town, is_active, created_at
            FROM businesses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(business)
    }

    async fn get_user_businesses(&self, user_id: &str) -> Result<Vec<Business>> {
        let businesses = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, category, town, is_active, created_at
            FROM businesses
            WHERE owner_id = ? AND is_active = 1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(businesses)
    }

    async fn get_category_businesses(&self, category: &str) -> Result<Vec<Business>> {
        let businesses = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, category, town, is_active, created_at
            FROM businesses
            WHERE category = ? AND is_active = 1
            ORDER BY id ASC
            "#,
        )
        .bind(category)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(businesses)
    }

    async fn active_businesses(&self) -> Result<Vec<Business>> {
        let businesses = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, category, town, is_active, created_at
            FROM businesses
            WHERE is_active = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(businesses)
    }

    async fn deactivate_business(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE businesses SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_view_logs(&self, events: &[NewViewEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO view_logs (business_id, viewed_at, platform, visitor_ip, user_agent)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.business_id)
            .bind(event.viewed_at)
            .bind(event.platform.as_str())
            .bind(event.visitor_ip.as_deref())
            .bind(event.user_agent.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn get_business_view_logs(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        platform: Option<Platform>,
    ) -> Result<Vec<ViewEvent>> {
        if business_ids.is_empty() {
            return Ok(Vec::new());
        }

        let platform_filter = platform.filter(|p| *p != Platform::All);

        let mut sql = format!(
            "SELECT id, business_id, viewed_at, platform, visitor_ip, user_agent \
             FROM view_logs WHERE business_id IN ({})",
            placeholders(business_ids.len())
        );
        if start.is_some() {
            sql.push_str(" AND viewed_at >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND viewed_at < ?");
        }
        if platform_filter.is_some() {
            sql.push_str(" AND platform = ?");
        }
        sql.push_str(" ORDER BY viewed_at ASC");

        let mut query = sqlx::query_as::<_, ViewRow>(&sql);
        for id in business_ids {
            query = query.bind(id);
        }
        if let Some(start) = start {
            query = query.bind(start);
        }
        if let Some(end) = end {
            query = query.bind(end);
        }
        if let Some(platform) = platform_filter {
            query = query.bind(platform.as_str());
        }

        let rows = query.fetch_all(self.pool.as_ref()).await?;
        Ok(rows.into_iter().map(view_from_row).collect())
    }

    async fn insert_review(
        &self,
        business_id: i64,
        rating: f64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reviews (business_id, created_at, rating, is_active)
            VALUES (?, ?, ?, 1)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(created_at)
        .bind(rating)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn deactivate_review(&self, review_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE reviews SET is_active = 0 WHERE id = ?")
            .bind(review_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_business_reviews(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewEvent>> {
        if business_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT id, business_id, created_at, rating, is_active \
             FROM reviews WHERE is_active = 1 AND business_id IN ({})",
            placeholders(business_ids.len())
        );
        if start.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND created_at < ?");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, ReviewEvent>(&sql);
        for id in business_ids {
            query = query.bind(id);
        }
        if let Some(start) = start {
            query = query.bind(start);
        }
        if let Some(end) = end {
            query = query.bind(end);
        }

        Ok(query.fetch_all(self.pool.as_ref()).await?)
    }

    async fn insert_favorite(&self, business_id: i64, created_at: DateTime<Utc>) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO favorites (business_id, created_at)
            VALUES (?, ?)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn get_business_favorites(
        &self,
        business_ids: &[i64],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FavoriteEvent>> {
        if business_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT id, business_id, created_at \
             FROM favorites WHERE business_id IN ({})",
            placeholders(business_ids.len())
        );
        if start.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND created_at < ?");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, FavoriteEvent>(&sql);
        for id in business_ids {
            query = query.bind(id);
        }
        if let Some(start) = start {
            query = query.bind(start);
        }
        if let Some(end) = end {
            query = query.bind(end);
        }

        Ok(query.fetch_all(self.pool.as_ref()).await?)
    }

    async fn daily_view_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>> {
        let (day_start, day_end) = day_bounds(date);
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT business_id, COUNT(*)
            FROM view_logs
            WHERE viewed_at >= ? AND viewed_at < ?
            GROUP BY business_id
            "#,
        )
        .bind(day_start)
        .bind(day_end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn daily_review_stats(&self, date: NaiveDate) -> Result<HashMap<i64, (i64, f64)>> {
        let (day_start, day_end) = day_bounds(date);
        let rows = sqlx::query_as::<_, (i64, i64, f64)>(
            r#"
            SELECT business_id, COUNT(*), AVG(rating)
            FROM reviews
            WHERE is_active = 1 AND created_at >= ? AND created_at < ?
            GROUP BY business_id
            "#,
        )
        .bind(day_start)
        .bind(day_end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count, avg)| (id, (count, avg)))
            .collect())
    }

    async fn daily_favorite_counts(&self, date: NaiveDate) -> Result<HashMap<i64, i64>> {
        let (day_start, day_end) = day_bounds(date);
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT business_id, COUNT(*)
            FROM favorites
            WHERE created_at >= ? AND created_at < ?
            GROUP BY business_id
            "#,
        )
        .bind(day_start)
        .bind(day_end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StorageResult<AnalyticsSnapshot> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO analytics_snapshots
                (business_id, snapshot_date, total_views, total_reviews, total_favorites,
                 average_rating, engagement_score, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.business_id)
        .bind(snapshot.snapshot_date)
        .bind(snapshot.total_views)
        .bind(snapshot.total_reviews)
        .bind(snapshot.total_favorites)
        .bind(snapshot.average_rating)
        .bind(snapshot.engagement_score)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(_) => {}
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    return Err(StorageError::SnapshotExists);
                }
                return Err(StorageError::Other(e.into()));
            }
        }

        let row = sqlx::query_as::<_, AnalyticsSnapshot>(
            r#"
            SELECT id, business_id, snapshot_date, total_views, total_reviews, total_favorites,
                   average_rating, engagement_score, created_at
            FROM analytics_snapshots
            WHERE business_id = ? AND snapshot_date = ?
            "#,
        )
        .bind(snapshot.business_id)
        .bind(snapshot.snapshot_date)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(row)
    }

    async fn snapshot_exists(&self, business_id: i64, date: NaiveDate) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM analytics_snapshots
            WHERE business_id = ? AND snapshot_date = ?
            "#,
        )
        .bind(business_id)
        .bind(date)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count > 0)
    }

    async fn get_snapshots(
        &self,
        business_id: i64,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        let snapshots = sqlx::query_as::<_, AnalyticsSnapshot>(
            r#"
            SELECT id, business_id, snapshot_date, total_views, total_reviews, total_favorites,
                   average_rating, engagement_score, created_at
            FROM analytics_snapshots
            WHERE business_id = ? AND snapshot_date >= ? AND snapshot_date <= ?
            ORDER BY snapshot_date ASC
            "#,
        )
        .bind(business_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(snapshots)
    }

    async fn delete_snapshots_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM analytics_snapshots WHERE snapshot_date < ?")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
