//! Category benchmarks and competitor insights
//!
//! Compares a user's businesses against peer populations. Benchmarks are
//! withheld entirely (returned as `None`) when the peer count is below the
//! configured minimum, so small categories never produce misleading
//! small-sample statistics.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Days, Utc};

use crate::analytics::models::{
    CategoryBenchmark, CompetitorInsight, DateRange, MarketPosition, ReviewEvent, ViewEvent,
};
use crate::analytics::window_bounds;
use crate::models::Business;
use crate::storage::Storage;

/// Rating gap before a business is called leading or trailing its
/// competitors rather than competitive with them.
const POSITION_RATING_MARGIN: f64 = 0.25;

pub struct BenchmarkService {
    storage: Arc<dyn Storage>,
    min_peer_count: usize,
    window_days: i64,
}

#[derive(Debug, Default, Clone, Copy)]
struct BusinessTotals {
    views: i64,
    reviews: i64,
    rating_sum: f64,
}

impl BenchmarkService {
    pub fn new(storage: Arc<dyn Storage>, min_peer_count: usize, window_days: i64) -> Self {
        Self {
            storage,
            min_peer_count,
            window_days,
        }
    }

    fn window(&self) -> DateRange {
        let today = Utc::now().date_naive();
        DateRange::new(
            today - Days::new(self.window_days.saturating_sub(1) as u64),
            today,
        )
    }

    /// Benchmark the user's businesses in a category against the whole
    /// category. `None` when the category is too small or the user owns no
    /// business in it.
    pub async fn category_benchmark(
        &self,
        user_id: &str,
        category: &str,
    ) -> Result<Option<CategoryBenchmark>> {
        let peers = self.storage.get_category_businesses(category).await?;
        if peers.len() < self.min_peer_count {
            return Ok(None);
        }

        let yours: Vec<&Business> = peers.iter().filter(|b| b.owner_id == user_id).collect();
        if yours.is_empty() {
            return Ok(None);
        }

        let peer_ids: Vec<i64> = peers.iter().map(|b| b.id).collect();
        let totals = self.fetch_totals(&peer_ids).await?;

        let your_ids: Vec<i64> = yours.iter().map(|b| b.id).collect();
        let (your_views, your_reviews, your_rating) = aggregate(&totals, &your_ids);
        let (cat_views, cat_reviews, cat_rating) = aggregate(&totals, &peer_ids);

        Ok(Some(CategoryBenchmark {
            category: category.to_string(),
            peer_count: peers.len(),
            your_business_count: yours.len(),
            your_average_views: your_views as f64 / yours.len() as f64,
            category_average_views: cat_views as f64 / peers.len() as f64,
            your_average_reviews: your_reviews as f64 / yours.len() as f64,
            category_average_reviews: cat_reviews as f64 / peers.len() as f64,
            your_average_rating: your_rating,
            category_average_rating: cat_rating,
        }))
    }

    /// One insight per owned business against businesses sharing exactly
    /// the same category and town (case-sensitive), excluding itself.
    pub async fn competitor_insights(&self, user_id: &str) -> Result<Vec<CompetitorInsight>> {
        let mine = self.storage.get_user_businesses(user_id).await?;
        let mut insights = Vec::with_capacity(mine.len());

        for business in &mine {
            let peers = self
                .storage
                .get_category_businesses(&business.category)
                .await?;
            let competitors: Vec<Business> = peers
                .into_iter()
                .filter(|p| p.town == business.town && p.id != business.id)
                .collect();

            // One fetch covering the business and all its competitors.
            let mut ids: Vec<i64> = competitors.iter().map(|c| c.id).collect();
            ids.push(business.id);
            let totals = self.fetch_totals(&ids).await?;

            let yours = totals.get(&business.id).copied().unwrap_or_default();
            let your_rating = if yours.reviews > 0 {
                Some(yours.rating_sum / yours.reviews as f64)
            } else {
                None
            };

            let competitor_ids: Vec<i64> = competitors.iter().map(|c| c.id).collect();
            let (their_views, their_reviews, their_rating) = aggregate(&totals, &competitor_ids);
            let competitor_count = competitors.len();
            let denominator = competitor_count.max(1) as f64;

            insights.push(CompetitorInsight {
                business_id: business.id,
                business_name: business.name.clone(),
                category: business.category.clone(),
                town: business.town.clone(),
                competitor_count,
                your_views: yours.views,
                your_reviews: yours.reviews,
                your_rating,
                competitor_average_views: their_views as f64 / denominator,
                competitor_average_reviews: their_reviews as f64 / denominator,
                competitor_average_rating: their_rating,
                market_position: market_position(your_rating, their_rating),
            });
        }

        Ok(insights)
    }

    /// Batched per-business totals over the benchmark window.
    async fn fetch_totals(&self, ids: &[i64]) -> Result<HashMap<i64, BusinessTotals>> {
        let (start, end) = window_bounds(self.window());
        let views = self
            .storage
            .get_business_view_logs(ids, Some(start), Some(end), None)
            .await?;
        let reviews = self
            .storage
            .get_business_reviews(ids, Some(start), Some(end))
            .await?;

        Ok(group_totals(&views, &reviews))
    }
}

fn group_totals(views: &[ViewEvent], reviews: &[ReviewEvent]) -> HashMap<i64, BusinessTotals> {
    let mut totals: HashMap<i64, BusinessTotals> = HashMap::new();
    for view in views {
        totals.entry(view.business_id).or_default().views += 1;
    }
    for review in reviews {
        let entry = totals.entry(review.business_id).or_default();
        entry.reviews += 1;
        entry.rating_sum += review.rating;
    }
    totals
}

/// (total views, total reviews, mean rating) across a set of businesses.
fn aggregate(
    totals: &HashMap<i64, BusinessTotals>,
    ids: &[i64],
) -> (i64, i64, Option<f64>) {
    let mut views = 0;
    let mut reviews = 0;
    let mut rating_sum = 0.0;
    for id in ids {
        if let Some(t) = totals.get(id) {
            views += t.views;
            reviews += t.reviews;
            rating_sum += t.rating_sum;
        }
    }
    let rating = if reviews > 0 {
        Some(rating_sum / reviews as f64)
    } else {
        None
    };
    (views, reviews, rating)
}

fn market_position(yours: Option<f64>, theirs: Option<f64>) -> MarketPosition {
    let yours = yours.unwrap_or(0.0);
    let theirs = theirs.unwrap_or(0.0);
    if yours >= theirs + POSITION_RATING_MARGIN {
        MarketPosition::Leading
    } else if theirs >= yours + POSITION_RATING_MARGIN {
        MarketPosition::Trailing
    } else {
        MarketPosition::Competitive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_position_margin() {
        assert_eq!(
            market_position(Some(4.5), Some(4.0)),
            MarketPosition::Leading
        );
        assert_eq!(
            market_position(Some(4.0), Some(4.5)),
            MarketPosition::Trailing
        );
        assert_eq!(
            market_position(Some(4.2), Some(4.1)),
            MarketPosition::Competitive
        );
        // Sole player in town with no reviews anywhere is still competitive.
        assert_eq!(market_position(None, None), MarketPosition::Competitive);
    }

    #[test]
    fn test_aggregate_skips_missing_businesses() {
        let totals = HashMap::from([
            (
                1,
                BusinessTotals {
                    views: 10,
                    reviews: 2,
                    rating_sum: 9.0,
                },
            ),
            (
                2,
                BusinessTotals {
                    views: 4,
                    reviews: 0,
                    rating_sum: 0.0,
                },
            ),
        ]);

        let (views, reviews, rating) = aggregate(&totals, &[1, 2, 99]);
        assert_eq!(views, 14);
        assert_eq!(reviews, 2);
        assert_eq!(rating, Some(4.5));

        let (views, reviews, rating) = aggregate(&totals, &[2]);
        assert_eq!(views, 4);
        assert_eq!(reviews, 0);
        assert_eq!(rating, None);
    }
}
