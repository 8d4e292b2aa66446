//! Aggregate views over ProcessedPosts: pipeline stats and the precise
//! impression total (the O(n) fallback behind the cached aggregate).

use super::Pipeline;
use crate::error::Result;
use crate::keys::{PROCESSED_PREFIX, StoreKey};
use crate::store::{ReadOutcome, read_record};
use inspo_monitor_types::{AccountStats, ImpressionsReport, PipelineStats, ProcessedPost};
use std::collections::HashMap;

impl Pipeline {
    /// All parseable ProcessedPosts plus the number of discarded records.
    pub(crate) async fn load_processed_posts(&self) -> Result<(Vec<ProcessedPost>, usize)> {
        let keys = self.store.list_keys(PROCESSED_PREFIX).await?;
        let mut posts = Vec::with_capacity(keys.len());
        let mut discarded = 0usize;
        for key in &keys {
            match read_record::<ProcessedPost>(self.store.as_ref(), key).await? {
                ReadOutcome::Found(post) => posts.push(post),
                ReadOutcome::Discarded => discarded += 1,
                ReadOutcome::Missing => {}
            }
        }
        Ok((posts, discarded))
    }

    pub async fn pipeline_stats(&self) -> Result<PipelineStats> {
        let (posts, discarded) = self.load_processed_posts().await?;

        let mut by_account: HashMap<String, AccountStats> = HashMap::new();
        let mut published = 0usize;
        for post in &posts {
            let entry = by_account.entry(post.author_handle.clone()).or_default();
            entry.processed += 1;
            if post.published {
                entry.published += 1;
                published += 1;
            } else {
                entry.failed += 1;
            }
        }

        Ok(PipelineStats {
            total_processed: posts.len(),
            published,
            failed: posts.len() - published,
            by_account,
            last_processed_at: posts.iter().map(|p| p.processed_at).max(),
            discarded,
        })
    }

    /// Impression totals. Uses the cached aggregate when present; otherwise
    /// recomputes from every ProcessedPost and refills the cache.
    pub async fn impressions_report(&self) -> Result<ImpressionsReport> {
        let cache_key = StoreKey::TotalImpressions.to_string();
        let cached_total = self
            .store
            .get(&cache_key)
            .await?
            .and_then(|v| v.parse::<i64>().ok());

        let (posts, _discarded) = self.load_processed_posts().await?;
        let total_impressions = match cached_total {
            Some(total) => total,
            None => {
                let total: i64 = posts.iter().filter_map(|p| p.impressions).sum();
                self.store.set(&cache_key, &total.to_string()).await?;
                total
            }
        };

        let mut by_account: HashMap<String, usize> = HashMap::new();
        for post in &posts {
            *by_account.entry(post.author_handle.clone()).or_default() += 1;
        }

        Ok(ImpressionsReport {
            total_impressions,
            total_posts: posts.len(),
            published_posts: posts.iter().filter(|p| p.published).count(),
            by_account,
            cached: cached_total.is_some(),
        })
    }
}
