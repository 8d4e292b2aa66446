//! Typed composite store keys.
//!
//! Every key the pipeline reads or writes is named through this enum, so the
//! string namespacing ("post:{id}", "historical:{account}:{id}", ...) lives in
//! exactly one place and prefix scans stay consistent with writes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey<'a> {
    /// Highest-seen source post id for an account.
    Cursor { account: &'a str },
    /// ProcessedPost, keyed by source post id.
    Processed { id: &'a str },
    /// HistoricalPost, namespaced per account.
    Historical { account: &'a str, id: &'a str },
    /// BackfillProgress for an account.
    Backfill { account: &'a str },
    /// GeneratedThread for an account.
    Thread { account: &'a str },
    /// Cached aggregate impression count.
    TotalImpressions,
}

impl fmt::Display for StoreKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Cursor { account } => write!(f, "cursor:{account}"),
            StoreKey::Processed { id } => write!(f, "post:{id}"),
            StoreKey::Historical { account, id } => write!(f, "historical:{account}:{id}"),
            StoreKey::Backfill { account } => write!(f, "backfill:{account}"),
            StoreKey::Thread { account } => write!(f, "thread:{account}"),
            StoreKey::TotalImpressions => write!(f, "total_impressions"),
        }
    }
}

/// Prefix matching every ProcessedPost key.
pub const PROCESSED_PREFIX: &str = "post:";

/// Prefix matching every HistoricalPost key for one account.
pub fn historical_prefix(account: &str) -> String {
    format!("historical:{account}:")
}
