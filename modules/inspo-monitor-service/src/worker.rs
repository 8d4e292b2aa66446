//! Background worker: runs a monitor cycle every poll interval and refreshes
//! impression counts every few ticks.

use crate::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Ticks between impression refreshes (12 ticks = ~1 hour at 5min intervals).
const REFRESH_INTERVAL_TICKS: u64 = 12;

pub async fn run_worker(
    pipeline: Arc<Pipeline>,
    account: String,
    poll_interval_secs: u64,
    last_tick_at: Arc<Mutex<Option<String>>>,
) {
    log::info!(
        "[INSPO_MONITOR] Worker started for @{account} (poll interval: {poll_interval_secs}s)"
    );

    let mut tick_count: u64 = 0;

    loop {
        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
        tick_count += 1;

        match pipeline.run_monitor_cycle(&account).await {
            Ok(outcome) => {
                if outcome.processed > 0 {
                    log::info!(
                        "[INSPO_MONITOR] Tick complete: {} posts processed",
                        outcome.processed
                    );
                }
                if outcome.discarded > 0 {
                    log::warn!(
                        "[INSPO_MONITOR] Tick dropped {} unparseable records",
                        outcome.discarded
                    );
                }
                *last_tick_at.lock().await = Some(chrono::Utc::now().to_rfc3339());
            }
            Err(e) if e.is_rate_limited() => {
                log::warn!("[INSPO_MONITOR] Rate limited — skipping this tick");
            }
            Err(e) => {
                log::error!("[INSPO_MONITOR] Tick error: {e}");
            }
        }

        if tick_count % REFRESH_INTERVAL_TICKS == 0 {
            match pipeline.refresh_impressions(None).await {
                Ok(outcome) => {
                    log::info!(
                        "[INSPO_MONITOR] Impressions refreshed: {} posts, {} total",
                        outcome.updated,
                        outcome.total_impressions
                    );
                }
                Err(e) => {
                    log::warn!("[INSPO_MONITOR] Impression refresh failed: {e}");
                }
            }
        }
    }
}
