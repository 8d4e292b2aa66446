//! The ingestion-and-publication pipeline.
//!
//! Each entry point (monitor cycle, backfill, impression refresh, thread
//! synthesis) runs to completion within one invocation; triggering is
//! external (worker timer or RPC). Outbound calls are awaited sequentially,
//! which bounds the request rate and keeps rate-limit reasoning simple.
//! Callers serialize invocations per account; the core does not coordinate
//! overlapping cycles.

pub mod backfill;
pub mod impressions;
pub mod media;
pub mod monitor;
pub mod stats;
pub mod thread_gen;

use crate::giphy::MediaSource;
use crate::openrouter::ContentGenerator;
use crate::store::KvStore;
use crate::twitter_api::FeedProvider;
use media::MediaFetcher;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Newest-posts batch size for one monitor cycle.
    pub monitor_batch: u32,
    /// Backfill stops once this many historical posts are stored.
    pub backfill_target: usize,
    /// Posts per backfill page.
    pub backfill_page_size: u32,
    /// Cooperative pause between backfill pages.
    pub page_delay: Duration,
    /// Per-run cap for the engagement refresher.
    pub refresh_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            monitor_batch: 5,
            backfill_target: 1500,
            backfill_page_size: 100,
            page_delay: Duration::from_secs(1),
            refresh_cap: 10,
        }
    }
}

pub struct Pipeline {
    pub store: Arc<dyn KvStore>,
    pub feed: Arc<dyn FeedProvider>,
    pub generator: Arc<dyn ContentGenerator>,
    pub media: Arc<dyn MediaSource>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub config: PipelineConfig,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
