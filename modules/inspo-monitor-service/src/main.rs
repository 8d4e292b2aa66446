//! Inspo Monitor Service — standalone binary that watches an inspiration
//! account, publishes derived statistical posts, and serves the pipeline over
//! an RPC API.
//!
//! Default: http://127.0.0.1:9104/

mod admin;
mod error;
mod giphy;
mod keys;
mod openrouter;
mod pipeline;
mod routes;
mod store;
#[cfg(test)]
mod testutil;
mod twitter_api;
mod worker;

use pipeline::{Pipeline, PipelineConfig};
use routes::AppState;
use std::sync::Arc;
use std::time::Instant;
use store::KvStore;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let port: u16 = std::env::var("INSPO_MONITOR_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9104);

    let poll_interval_secs: u64 = std::env::var("INSPO_POLL_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300); // 5 minutes default

    let account =
        std::env::var("INSPO_ACCOUNT").unwrap_or_else(|_| "MarioNawfal".to_string());

    let store_backend =
        std::env::var("INSPO_STORE").unwrap_or_else(|_| "sqlite".to_string());
    let store: Arc<dyn KvStore> = match store_backend.as_str() {
        "memory" => Arc::new(store::MemoryStore::new()),
        _ => {
            let db_path = std::env::var("INSPO_DB_PATH")
                .unwrap_or_else(|_| "./inspo_monitor.db".to_string());
            log::info!("Opening store at: {db_path}");
            Arc::new(store::SqliteStore::open(&db_path).expect("Failed to open store"))
        }
    };

    let client = reqwest::Client::new();

    let credentials = twitter_api::TwitterCredentials::from_env();
    let has_twitter_creds = credentials.is_some();
    let feed = Arc::new(twitter_api::TwitterApi::new(
        client.clone(),
        credentials.unwrap_or_default(),
    ));

    let openrouter_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
    let openrouter_model = std::env::var("OPENROUTER_MODEL")
        .unwrap_or_else(|_| "anthropic/claude-3.7-sonnet".to_string());
    let referer = std::env::var("OPENROUTER_REFERER")
        .unwrap_or_else(|_| "http://localhost".to_string());
    let generator = Arc::new(openrouter::OpenRouterClient::new(
        client.clone(),
        openrouter_key,
        openrouter_model,
        referer,
    ));

    let giphy_key = std::env::var("GIPHY_API_KEY").ok();
    let media = Arc::new(giphy::GiphyClient::new(client.clone(), giphy_key));

    let pipeline = Arc::new(Pipeline {
        store,
        feed,
        generator,
        media,
        fetcher: Arc::new(pipeline::media::HttpFetcher::new(client)),
        config: PipelineConfig::default(),
    });

    let last_tick_at: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let state = Arc::new(AppState {
        pipeline: pipeline.clone(),
        account: account.clone(),
        store_backend,
        start_time: Instant::now(),
        last_tick_at: last_tick_at.clone(),
        poll_interval_secs,
    });

    // Spawn background worker if Twitter credentials are configured
    if has_twitter_creds {
        let worker_pipeline = pipeline.clone();
        let worker_last_tick = last_tick_at.clone();
        let worker_account = account.clone();
        tokio::spawn(async move {
            worker::run_worker(
                worker_pipeline,
                worker_account,
                poll_interval_secs,
                worker_last_tick,
            )
            .await;
        });
        log::info!(
            "Background worker started for @{account} (poll interval: {poll_interval_secs}s)"
        );
    } else {
        log::warn!("Twitter credentials not set — background worker disabled");
    }

    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        // Pipeline operations
        .route(
            "/rpc/monitor/run",
            axum::routing::post(routes::monitor_run),
        )
        .route(
            "/rpc/backfill/run",
            axum::routing::post(routes::backfill_run),
        )
        .route(
            "/rpc/impressions/refresh",
            axum::routing::post(routes::impressions_refresh),
        )
        .route(
            "/rpc/thread/generate",
            axum::routing::post(routes::thread_generate),
        )
        // Read views
        .route("/rpc/stats", axum::routing::get(routes::stats))
        .route("/rpc/impressions", axum::routing::get(routes::impressions))
        .route("/rpc/status", axum::routing::get(routes::status))
        // Admin
        .route(
            "/rpc/admin/reset-cursor",
            axum::routing::post(routes::admin_reset_cursor),
        )
        .route(
            "/rpc/admin/clear-thread",
            axum::routing::post(routes::admin_clear_thread),
        )
        .route(
            "/rpc/admin/clear-backfill",
            axum::routing::post(routes::admin_clear_backfill),
        )
        .route(
            "/rpc/admin/cleanup",
            axum::routing::post(routes::admin_cleanup),
        )
        .route(
            "/rpc/admin/repair",
            axum::routing::post(routes::admin_repair),
        )
        .with_state(state)
        .layer(cors);

    let addr = format!("127.0.0.1:{port}");
    log::info!("Inspo Monitor Service listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
