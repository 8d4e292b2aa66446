//! Administrative operations: targeted resets for the run-once guards and a
//! migration pass over legacy ProcessedPost records.
//!
//! These are deliberate, destructive actions behind explicit RPC calls; the
//! pipeline itself never invokes them.

use crate::error::Result;
use crate::keys::{PROCESSED_PREFIX, StoreKey, historical_prefix};
use crate::pipeline::Pipeline;
use crate::store::write_record;
use inspo_monitor_types::{ProcessedPost, RepairOutcome};

impl Pipeline {
    /// Drop the monitor cursor so the next cycle fetches without `since_id`.
    /// Already-processed posts are still deduplicated by their records.
    pub async fn reset_cursor(&self, account: &str) -> Result<()> {
        self.store
            .delete(&StoreKey::Cursor { account }.to_string())
            .await?;
        log::info!("Cursor for @{account} reset");
        Ok(())
    }

    /// Delete a generated thread so the next synthesis builds a fresh one.
    pub async fn clear_thread(&self, account: &str) -> Result<()> {
        self.store
            .delete(&StoreKey::Thread { account }.to_string())
            .await?;
        log::info!("Generated thread for @{account} cleared");
        Ok(())
    }

    /// Delete backfill progress and every historical record for an account,
    /// re-arming the run-once guard. Returns the number of records removed.
    pub async fn clear_backfill(&self, account: &str) -> Result<usize> {
        let keys = self.store.list_keys(&historical_prefix(account)).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        self.store
            .delete(&StoreKey::Backfill { account }.to_string())
            .await?;
        log::info!(
            "Backfill for @{account} cleared ({} historical records)",
            keys.len()
        );
        Ok(keys.len())
    }

    /// Delete all but the newest `keep_latest` ProcessedPosts. Records that
    /// fail to parse sort as oldest and are deleted first.
    pub async fn cleanup_processed(&self, keep_latest: usize) -> Result<usize> {
        let keys = self.store.list_keys(PROCESSED_PREFIX).await?;

        let mut dated: Vec<(i64, String)> = Vec::with_capacity(keys.len());
        for key in keys {
            let processed_at = match self.store.get(&key).await? {
                Some(raw) => serde_json::from_str::<ProcessedPost>(&raw)
                    .map(|p| p.processed_at)
                    .unwrap_or(i64::MIN),
                None => continue,
            };
            dated.push((processed_at, key));
        }
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0usize;
        for (_, key) in dated.into_iter().skip(keep_latest) {
            self.store.delete(&key).await?;
            removed += 1;
        }
        log::info!("Cleanup removed {removed} processed records (kept {keep_latest})");
        Ok(removed)
    }

    /// One-off migration over every ProcessedPost record: unwrap
    /// double-encoded JSON, delete what cannot be recovered, leave healthy
    /// records untouched.
    pub async fn repair_processed_posts(&self) -> Result<RepairOutcome> {
        let keys = self.store.list_keys(PROCESSED_PREFIX).await?;
        let mut outcome = RepairOutcome {
            repaired: 0,
            deleted: 0,
        };

        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            if serde_json::from_str::<ProcessedPost>(&raw).is_ok() {
                continue;
            }
            match repair_json(&raw) {
                Some(record) => {
                    write_record(self.store.as_ref(), &key, &record).await?;
                    outcome.repaired += 1;
                    log::info!("Repaired double-encoded record at {key}");
                }
                None => {
                    self.store.delete(&key).await?;
                    outcome.deleted += 1;
                    log::warn!("Deleted unrecoverable record at {key}");
                }
            }
        }

        log::info!(
            "Repair pass done: {} repaired, {} deleted",
            outcome.repaired,
            outcome.deleted
        );
        Ok(outcome)
    }
}

/// Recover a ProcessedPost from the known legacy corruption shapes: a value
/// stringified twice, or a JS object literal with bare keys and single
/// quotes. Anything else is unrecoverable.
fn repair_json(raw: &str) -> Option<ProcessedPost> {
    if let Ok(inner) = serde_json::from_str::<String>(raw) {
        if let Ok(record) = serde_json::from_str(&inner) {
            return Some(record);
        }
    }

    // Bare keys get quoted, then single quotes become double quotes. A
    // heuristic: text containing apostrophes may still fail to parse, in
    // which case the record is deleted like any other garbage.
    let bare_keys = regex::Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").ok()?;
    let quoted = bare_keys.replace_all(raw, "$1\"$2\":");
    let normalized = quoted.replace('\'', "\"");
    serde_json::from_str(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        MockFeed, MockFetcher, MockGenerator, MockMedia, processed_post, test_pipeline,
    };

    fn plain_pipeline() -> Pipeline {
        test_pipeline(
            MockFeed::default(),
            MockGenerator::default(),
            MockMedia::default(),
            MockFetcher::failing(),
        )
    }

    #[tokio::test]
    async fn reset_cursor_leaves_processed_records() {
        let pipeline = plain_pipeline();
        pipeline.store.set("cursor:acct1", "100").await.unwrap();
        write_record(
            pipeline.store.as_ref(),
            "post:100",
            &processed_post("100", true, Some("p1"), 1),
        )
        .await
        .unwrap();

        pipeline.reset_cursor("acct1").await.unwrap();
        assert_eq!(pipeline.store.get("cursor:acct1").await.unwrap(), None);
        assert!(pipeline.store.get("post:100").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_backfill_removes_progress_and_history() {
        let pipeline = plain_pipeline();
        pipeline.store.set("backfill:acct1", "{}").await.unwrap();
        pipeline.store.set("historical:acct1:1", "{}").await.unwrap();
        pipeline.store.set("historical:acct1:2", "{}").await.unwrap();
        // Another account's history is untouched.
        pipeline.store.set("historical:acct2:9", "{}").await.unwrap();

        let removed = pipeline.clear_backfill("acct1").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(pipeline.store.get("backfill:acct1").await.unwrap(), None);
        assert!(
            pipeline
                .store
                .list_keys("historical:acct1:")
                .await
                .unwrap()
                .is_empty()
        );
        assert!(pipeline.store.get("historical:acct2:9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_keeps_the_newest_records() {
        let pipeline = plain_pipeline();
        for (id, at) in [("1", 100), ("2", 300), ("3", 200)] {
            write_record(
                pipeline.store.as_ref(),
                &format!("post:{id}"),
                &processed_post(id, true, Some("p"), at),
            )
            .await
            .unwrap();
        }

        let removed = pipeline.cleanup_processed(2).await.unwrap();
        assert_eq!(removed, 1);
        // The oldest (id 1, at 100) was dropped.
        assert_eq!(pipeline.store.get("post:1").await.unwrap(), None);
        assert!(pipeline.store.get("post:2").await.unwrap().is_some());
        assert!(pipeline.store.get("post:3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repair_unwraps_double_encoded_records_and_drops_garbage() {
        let pipeline = plain_pipeline();

        let healthy = processed_post("1", true, Some("p1"), 1);
        write_record(pipeline.store.as_ref(), "post:1", &healthy)
            .await
            .unwrap();

        // Stringified twice: the value is a JSON string containing the record.
        let record = processed_post("2", true, Some("p2"), 2);
        let double = serde_json::to_string(&serde_json::to_string(&record).unwrap()).unwrap();
        pipeline.store.set("post:2", &double).await.unwrap();

        // JS object literal with bare keys and single quotes.
        pipeline
            .store
            .set(
                "post:3",
                "{id: '3', text: 'hi', author_handle: 'acct1', processed_at: 3, published: false}",
            )
            .await
            .unwrap();

        pipeline.store.set("post:4", "[object Object]").await.unwrap();

        let outcome = pipeline.repair_processed_posts().await.unwrap();
        assert_eq!(outcome.repaired, 2);
        assert_eq!(outcome.deleted, 1);

        // The repaired records now parse directly.
        let raw = pipeline.store.get("post:2").await.unwrap().unwrap();
        let parsed: ProcessedPost = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.id, "2");
        let raw = pipeline.store.get("post:3").await.unwrap().unwrap();
        let parsed: ProcessedPost = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.id, "3");
        assert!(!parsed.published);
        assert_eq!(pipeline.store.get("post:4").await.unwrap(), None);
        assert!(pipeline.store.get("post:1").await.unwrap().is_some());
    }
}
