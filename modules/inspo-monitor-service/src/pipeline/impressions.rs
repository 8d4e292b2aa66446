//! Engagement refresher: re-read published posts' public metrics and update
//! stored impression counts, bounded per run so the hard rate-limit budget is
//! amortized across scheduled runs.

use super::Pipeline;
use crate::error::Result;
use crate::keys::StoreKey;
use crate::store::write_record;
use inspo_monitor_types::RefreshOutcome;

impl Pipeline {
    pub async fn refresh_impressions(&self, max_items: Option<usize>) -> Result<RefreshOutcome> {
        let cap = max_items.unwrap_or(self.config.refresh_cap);

        let (mut posts, _discarded) = self.load_processed_posts().await?;
        posts.retain(|p| p.published && p.published_id.is_some());
        // Newest first; the cap favors posts still accumulating impressions.
        posts.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        posts.truncate(cap);
        log::info!(
            "Refreshing impressions for {} published posts (cap {cap})",
            posts.len()
        );

        let mut updated = 0usize;
        let mut total_impressions = 0i64;

        for mut post in posts {
            let Some(published_id) = post.published_id.clone() else {
                continue;
            };
            match self.feed.post_metrics(&published_id).await {
                Ok(metrics) => {
                    let impressions = metrics.impression_count.unwrap_or(0);
                    post.impressions = Some(impressions);
                    total_impressions += impressions;
                    write_record(
                        self.store.as_ref(),
                        &StoreKey::Processed { id: &post.id }.to_string(),
                        &post,
                    )
                    .await?;
                    updated += 1;
                }
                Err(e) => {
                    // A single post's metric fetch failing never fails the run.
                    log::warn!("Metrics fetch failed for {published_id}: {e}");
                }
            }
        }

        // Cache this run's contribution; precise totals recompute from all
        // ProcessedPosts (see stats).
        self.store
            .set(
                &StoreKey::TotalImpressions.to_string(),
                &total_impressions.to_string(),
            )
            .await?;

        Ok(RefreshOutcome {
            updated,
            total_impressions,
        })
    }
}
