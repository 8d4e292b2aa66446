//! Historical backfill: page through up to a bounded quantity of an
//! account's past posts, checkpointing progress so a rate-limit interruption
//! loses no work. Runs at most once per account unless administratively
//! cleared.

use super::Pipeline;
use crate::error::{PipelineError, Result};
use crate::keys::StoreKey;
use crate::store::{ReadOutcome, read_record, write_record};
use crate::twitter_api::PostQuery;
use inspo_monitor_types::{BackfillOutcome, BackfillProgress, BackfillStatus, HistoricalPost};

impl Pipeline {
    pub async fn backfill_account(
        &self,
        account: &str,
        target: Option<usize>,
        page_size: Option<u32>,
    ) -> Result<BackfillOutcome> {
        let target = target.unwrap_or(self.config.backfill_target);
        let page_size = page_size.unwrap_or(self.config.backfill_page_size);
        let progress_key = StoreKey::Backfill { account }.to_string();

        // Run-once guard: any prior progress short-circuits, including the
        // partial progress of a rate-limited run.
        if let ReadOutcome::Found(existing) =
            read_record::<BackfillProgress>(self.store.as_ref(), &progress_key).await?
        {
            if existing.count > 0 {
                log::info!(
                    "Backfill for @{account} already has {} posts, skipping",
                    existing.count
                );
                return Ok(BackfillOutcome {
                    account: account.to_string(),
                    fetched: existing.count,
                    status: BackfillStatus::AlreadyFetched,
                });
            }
        }

        let user = self.feed.lookup_user(account).await?;
        log::info!("Backfilling @{account} (user id {})", user.id);

        let mut ids: Vec<String> = Vec::new();
        let mut pagination_token: Option<String> = None;
        let mut fatal: Option<PipelineError> = None;

        let status = loop {
            let page = match self
                .feed
                .user_posts(
                    &user.id,
                    &PostQuery {
                        max_results: page_size,
                        since_id: None,
                        pagination_token: pagination_token.clone(),
                    },
                )
                .await
            {
                Ok(page) => page,
                Err(PipelineError::RateLimited) => {
                    log::warn!(
                        "Rate limited after {} posts for @{account}; progress persisted",
                        ids.len()
                    );
                    break BackfillStatus::RateLimited;
                }
                Err(e) if e.is_auth() => {
                    // Credential problems are fatal and surfaced to the
                    // caller, but the checkpoint is still written so stored
                    // posts stay visible and a later run short-circuits.
                    log::warn!(
                        "Auth failure after {} posts for @{account}; progress persisted",
                        ids.len()
                    );
                    fatal = Some(e);
                    break BackfillStatus::Failed;
                }
                Err(e) => {
                    log::warn!("Backfill page failed for @{account}: {e}");
                    break BackfillStatus::Failed;
                }
            };

            if page.posts.is_empty() {
                break BackfillStatus::Exhausted;
            }

            for post in &page.posts {
                if post.post_kind() != "original" {
                    log::debug!("Skipping {} post {}", post.post_kind(), post.id);
                    continue;
                }
                let record = HistoricalPost {
                    id: post.id.clone(),
                    text: post.text.clone(),
                    author_handle: account.to_string(),
                    created_at: post
                        .created_at
                        .clone()
                        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
                    like_count: metric(post, |m| m.like_count),
                    retweet_count: metric(post, |m| m.retweet_count),
                    reply_count: metric(post, |m| m.reply_count),
                    quote_count: metric(post, |m| m.quote_count),
                };
                write_record(
                    self.store.as_ref(),
                    &StoreKey::Historical {
                        account,
                        id: &post.id,
                    }
                    .to_string(),
                    &record,
                )
                .await?;
                ids.push(post.id.clone());
            }
            log::debug!("Fetched {} posts, total now {}", page.posts.len(), ids.len());

            if ids.len() >= target {
                break BackfillStatus::Complete;
            }
            match page.next_token {
                Some(token) => pagination_token = Some(token),
                None => break BackfillStatus::Exhausted,
            }

            // Deliberate pacing between pages, not a lock.
            tokio::time::sleep(self.config.page_delay).await;
        };

        // Count and id list are one record, written together.
        let fetched = ids.len();
        write_record(
            self.store.as_ref(),
            &progress_key,
            &BackfillProgress {
                count: fetched,
                ids,
            },
        )
        .await?;

        log::info!("Backfill for @{account} stored {fetched} posts ({status:?})");
        if let Some(e) = fatal {
            return Err(e);
        }
        Ok(BackfillOutcome {
            account: account.to_string(),
            fetched,
            status,
        })
    }
}

fn metric(
    post: &crate::twitter_api::FeedPost,
    pick: impl Fn(&crate::twitter_api::PublicMetrics) -> Option<i64>,
) -> i64 {
    post.public_metrics
        .as_ref()
        .and_then(&pick)
        .unwrap_or(0)
}
