//! Shared types for the inspo monitor service and its RPC clients.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =====================================================
// Domain Types
// =====================================================

/// One inspiration source post the pipeline has handled.
///
/// Created at most once per source post id — the id is the idempotency key.
/// Only the engagement refresher mutates it afterwards (sets `impressions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPost {
    pub id: String,
    pub text: String,
    pub author_handle: String,
    /// Epoch milliseconds at which the pipeline handled the post.
    pub processed_at: i64,
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impressions: Option<i64>,
}

/// One backfilled historical post. Immutable after backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPost {
    pub id: String,
    pub text: String,
    pub author_handle: String,
    pub created_at: String,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub quote_count: i64,
}

/// Backfill checkpoint for one account. Count and id list are a single
/// record so they can never be written independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillProgress {
    pub count: usize,
    pub ids: Vec<String>,
}

/// One post of a generated thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPost {
    pub position: u32,
    pub text: String,
    pub category: String,
}

/// A generated multi-post thread for one account. Created once per account;
/// regenerating requires an administrative delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedThread {
    pub account: String,
    pub posts: Vec<ThreadPost>,
    /// Epoch milliseconds.
    pub generated_at: i64,
}

/// Precomputed aggregates over a historical sample, fed to the content
/// generator and used verbatim by the deterministic thread fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadAggregates {
    pub date_range: String,
    pub sample_size: usize,
    pub avg_likes: f64,
    pub avg_retweets: f64,
    /// Top posts by likes + retweets, at most five.
    pub top_posts: Vec<HistoricalPost>,
}

// =====================================================
// Operation Outcomes
// =====================================================

/// Terminal state of a single post within a monitor cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemStatus {
    Published { published_id: String },
    AlreadyProcessed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub source_id: String,
    pub status: ItemStatus,
}

/// Result of one monitor cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorOutcome {
    pub account: String,
    /// Posts that reached a terminal state this cycle (published or failed).
    pub processed: usize,
    pub items: Vec<ItemOutcome>,
    /// Stored records that failed to parse and were dropped (data loss).
    pub discarded: usize,
    /// Cursor after the cycle, if any.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    /// Progress already recorded for this account; nothing fetched.
    AlreadyFetched,
    /// Reached the target count.
    Complete,
    /// Source ran out of pages before the target.
    Exhausted,
    /// Provider quota hit; partial progress persisted.
    RateLimited,
    /// Non-rate-limit page error; partial progress persisted.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillOutcome {
    pub account: String,
    pub fetched: usize,
    pub status: BackfillStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub updated: usize,
    pub total_impressions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadOutcome {
    pub thread: GeneratedThread,
    pub is_new: bool,
}

// =====================================================
// Stats
// =====================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountStats {
    pub processed: usize,
    pub published: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_processed: usize,
    pub published: usize,
    pub failed: usize,
    pub by_account: HashMap<String, AccountStats>,
    pub last_processed_at: Option<i64>,
    pub discarded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpressionsReport {
    pub total_impressions: i64,
    pub total_posts: usize,
    pub published_posts: usize,
    pub by_account: HashMap<String, usize>,
    /// Whether the total came from the cached aggregate or a full recompute.
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub repaired: usize,
    pub deleted: usize,
}

// =====================================================
// RPC Request Types
// =====================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MonitorRequest {
    /// Defaults to the configured account when omitted.
    pub account: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackfillRequest {
    pub account: String,
    pub target: Option<usize>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub max_items: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadRequest {
    pub account: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub keep_latest: usize,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub monitored_account: String,
    pub store_backend: String,
    pub last_tick_at: Option<String>,
    pub poll_interval_secs: u64,
}
