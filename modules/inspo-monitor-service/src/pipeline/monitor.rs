//! Incremental monitor: poll the source account's posts past the stored
//! cursor, deduplicate, generate and publish derived content, and advance the
//! cursor only after every item in the batch has been attempted.

use super::{Pipeline, now_ms};
use crate::error::Result;
use crate::keys::StoreKey;
use crate::pipeline::media::MediaOutcome;
use crate::store::{ReadOutcome, read_record, write_record};
use crate::twitter_api::{FeedPost, NewPost, PostQuery};
use inspo_monitor_types::{ItemOutcome, ItemStatus, MonitorOutcome, ProcessedPost};

impl Pipeline {
    /// One monitor cycle for `account`. A single item's failure is captured
    /// in its [`ItemOutcome`] and never aborts the cycle; a fetch-level
    /// failure aborts with no mutation.
    pub async fn run_monitor_cycle(&self, account: &str) -> Result<MonitorOutcome> {
        let cursor_key = StoreKey::Cursor { account }.to_string();
        let cursor = self.store.get(&cursor_key).await?;
        log::debug!(
            "Monitor cycle for @{account}, cursor: {}",
            cursor.as_deref().unwrap_or("none")
        );

        let user = self.feed.lookup_user(account).await?;
        let page = self
            .feed
            .user_posts(
                &user.id,
                &PostQuery {
                    max_results: self.config.monitor_batch,
                    since_id: cursor.clone(),
                    pagination_token: None,
                },
            )
            .await?;

        if page.posts.is_empty() {
            log::info!("No new posts from @{account}");
            return Ok(MonitorOutcome {
                account: account.to_string(),
                processed: 0,
                items: Vec::new(),
                discarded: 0,
                cursor,
            });
        }

        let mut candidate = cursor.clone();
        let mut items = Vec::new();
        let mut discarded = 0usize;
        let mut processed = 0usize;

        for post in &page.posts {
            // The feed may return newest-first; the cursor tracks the id
            // maximum, not insertion order, and already-processed posts
            // still count toward it.
            if candidate.as_deref().is_none_or(|c| id_newer(&post.id, c)) {
                candidate = Some(post.id.clone());
            }

            // The provider excludes retweets and replies server-side; filter
            // again here so a provider regression cannot leak them through.
            if post.post_kind() != "original" {
                log::debug!("Skipping {} post {}", post.post_kind(), post.id);
                continue;
            }

            let key = StoreKey::Processed { id: &post.id }.to_string();
            match read_record::<ProcessedPost>(self.store.as_ref(), &key).await? {
                ReadOutcome::Found(_) => {
                    log::debug!("Post {} already processed, skipping", post.id);
                    items.push(ItemOutcome {
                        source_id: post.id.clone(),
                        status: ItemStatus::AlreadyProcessed,
                    });
                    continue;
                }
                // The idempotency record was lost; the post is handled again
                // and the loss is reported in the outcome.
                ReadOutcome::Discarded => discarded += 1,
                ReadOutcome::Missing => {}
            }

            let status = self.handle_new_post(account, post).await?;
            processed += 1;
            items.push(ItemOutcome {
                source_id: post.id.clone(),
                status,
            });
        }

        if candidate != cursor {
            if let Some(ref newest) = candidate {
                self.store.set(&cursor_key, newest).await?;
                log::info!("Cursor for @{account} advanced to {newest}");
            }
        }

        Ok(MonitorOutcome {
            account: account.to_string(),
            processed,
            items,
            discarded,
            cursor: candidate,
        })
    }

    /// Generate, resolve media, publish, and record one post. Generation and
    /// publish failures are captured in the returned status; only store
    /// failures propagate.
    async fn handle_new_post(&self, account: &str, post: &FeedPost) -> Result<ItemStatus> {
        let statement = match self.generator.derive_statement(&post.text, account).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Generation failed for post {}: {e}", post.id);
                self.record_processed(account, post, None, None).await?;
                return Ok(ItemStatus::Failed {
                    error: e.to_string(),
                });
            }
        };

        let (text, media_ids) = match self.resolve_media(&statement, &post.text, account).await {
            MediaOutcome::Uploaded(id) => (statement.clone(), vec![id]),
            MediaOutcome::LinkOnly(url) => (format!("{statement}\n\n{url}"), Vec::new()),
            MediaOutcome::TextOnly => (statement.clone(), Vec::new()),
        };

        match self
            .feed
            .publish(&NewPost {
                text,
                media_ids,
                reply_to: None,
            })
            .await
        {
            Ok(published_id) => {
                log::info!("Published {published_id} inspired by post {}", post.id);
                self.record_processed(account, post, Some(statement), Some(published_id.clone()))
                    .await?;
                Ok(ItemStatus::Published { published_id })
            }
            Err(e) => {
                log::warn!("Publish failed for post {}: {e}", post.id);
                self.record_processed(account, post, Some(statement), None)
                    .await?;
                Ok(ItemStatus::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    async fn record_processed(
        &self,
        account: &str,
        post: &FeedPost,
        generated_text: Option<String>,
        published_id: Option<String>,
    ) -> Result<()> {
        let published = published_id.is_some();
        let record = ProcessedPost {
            id: post.id.clone(),
            text: post.text.clone(),
            author_handle: account.to_string(),
            processed_at: now_ms(),
            published,
            generated_text,
            published_id,
            impressions: if published { Some(0) } else { None },
        };
        write_record(
            self.store.as_ref(),
            &StoreKey::Processed { id: &post.id }.to_string(),
            &record,
        )
        .await
    }
}

/// Numeric-string id ordering: longer is larger, ties break lexically.
pub(crate) fn id_newer(a: &str, b: &str) -> bool {
    (a.len(), a) > (b.len(), b)
}
