use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use crate::analytics::models::{
    AnalyticsSnapshot, DateRange, FavoriteEvent, NewSnapshot, NewViewEvent, Platform, ReviewEvent,
    ViewEvent,
};
use crate::models::Business;
use crate::storage::{day_bounds, Storage, StorageError, StorageResult};

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
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
        platform: Platform::parse(&platform).unwrap_or(Platform::Web),
        visitor_ip,
        user_agent,
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS businesses (
                id BIGSERIAL PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                town TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL
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
                id BIGSERIAL PRIMARY KEY,
                business_id BIGINT NOT NULL,
                viewed_at TIMESTAMPTZ NOT NULL,
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
                id BIGSERIAL PRIMARY KEY,
                business_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                rating DOUBLE PRECISION NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
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
                id BIGSERIAL PRIMARY KEY,
                business_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
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

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_snapshots (
                id BIGSERIAL PRIMARY KEY,
                business_id BIGINT NOT NULL,
                snapshot_date DATE NOT NULL,
                total_views BIGINT NOT NULL DEFAULT 0,
                total_reviews BIGINT NOT NULL DEFAULT 0,
                total_favorites BIGINT NOT NULL DEFAULT 0,
                average_rating DOUBLE PRECISION,
                engagement_score DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL,
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
            VALUES ($1, $2, $3, $4, TRUE, $5)
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
            WHERE id = $1
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
            WHERE owner_id = $1 AND is_active
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
            WHERE category = $1 AND is_active
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
            WHERE is_active
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(businesses)
    }

    async fn deactivate_business(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE businesses SET is_active = FALSE WHERE id = $1")
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
                VALUES ($1, $2, $3, $4, $5)
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

        let mut sql = String::from(
            "SELECT id, business_id, viewed_at, platform, visitor_ip, user_agent \
             FROM view_logs WHERE business_id = ANY($1)",
        );
        let mut param = 2;
        if start.is_some() {
            sql.push_str(&format!(" AND viewed_at >= ${param}"));
            param += 1;
        }
        if end.is_some() {
            sql.push_str(&format!(" AND viewed_at < ${param}"));
            param += 1;
        }
        if platform_filter.is_some() {
            sql.push_str(&format!(" AND platform = ${param}"));
        }
        sql.push_str(" ORDER BY viewed_at ASC");

        let mut query = sqlx::query_as::<_, ViewRow>(&sql).bind(business_ids.to_vec());
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
            VALUES ($1, $2, $3, TRUE)
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
        let result = sqlx::query("UPDATE reviews SET is_active = FALSE WHERE id = $1")
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

        let mut sql = String::from(
            "SELECT id, business_id, created_at, rating, is_active \
             FROM reviews WHERE is_active AND business_id = ANY($1)",
        );
        let mut param = 2;
        if start.is_some() {
            sql.push_str(&format!(" AND created_at >= ${param}"));
            param += 1;
        }
        if end.is_some() {
            sql.push_str(&format!(" AND created_at < ${param}"));
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, ReviewEvent>(&sql).bind(business_ids.to_vec());
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
            VALUES ($1, $2)
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

        let mut sql = String::from(
            "SELECT id, business_id, created_at \
             FROM favorites WHERE business_id = ANY($1)",
        );
        let mut param = 2;
        if start.is_some() {
            sql.push_str(&format!(" AND created_at >= ${param}"));
            param += 1;
        }
        if end.is_some() {
            sql.push_str(&format!(" AND created_at < ${param}"));
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, FavoriteEvent>(&sql).bind(business_ids.to_vec());
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
            WHERE viewed_at >= $1 AND viewed_at < $2
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
            WHERE is_active AND created_at >= $1 AND created_at < $2
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
            WHERE created_at >= $1 AND created_at < $2
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
        let result = sqlx::query_as::<_, AnalyticsSnapshot>(
            r#"
            INSERT INTO analytics_snapshots
                (business_id, snapshot_date, total_views, total_reviews, total_favorites,
                 average_rating, engagement_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, business_id, snapshot_date, total_views, total_reviews, total_favorites,
                      average_rating, engagement_score, created_at
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
        .fetch_one(self.pool.as_ref())
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    Err(StorageError::SnapshotExists)
                } else {
                    Err(StorageError::Other(e.into()))
                }
            }
        }
    }

    async fn snapshot_exists(&self, business_id: i64, date: NaiveDate) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM analytics_snapshots
            WHERE business_id = $1 AND snapshot_date = $2
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
            WHERE business_id = $1 AND snapshot_date >= $2 AND snapshot_date <= $3
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
        let result = sqlx::query("DELETE FROM analytics_snapshots WHERE snapshot_date < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
