//! Shared test fixtures: scripted in-memory implementations of the outbound
//! seams plus builders for the common record shapes.

use crate::error::{PipelineError, Result};
use crate::giphy::MediaSource;
use crate::openrouter::ContentGenerator;
use crate::pipeline::media::MediaFetcher;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::store::MemoryStore;
use crate::twitter_api::{FeedPost, FeedProvider, FeedUser, NewPost, PostPage, PostQuery, PublicMetrics};
use async_trait::async_trait;
use inspo_monitor_types::{HistoricalPost, ProcessedPost, ThreadAggregates, ThreadPost};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn post(id: &str, text: &str) -> FeedPost {
    FeedPost {
        id: id.to_string(),
        text: text.to_string(),
        created_at: None,
        public_metrics: None,
        referenced_tweets: None,
    }
}

pub fn page(posts: Vec<FeedPost>, next_token: Option<&str>) -> PostPage {
    PostPage {
        result_count: posts.len(),
        posts,
        next_token: next_token.map(|t| t.to_string()),
    }
}

pub fn processed_post(
    id: &str,
    published: bool,
    published_id: Option<&str>,
    processed_at: i64,
) -> ProcessedPost {
    ProcessedPost {
        id: id.to_string(),
        text: format!("source text {id}"),
        author_handle: "acct1".to_string(),
        processed_at,
        published,
        generated_text: published.then(|| format!("generated {id}")),
        published_id: published_id.map(|p| p.to_string()),
        impressions: published.then_some(0),
    }
}

pub fn historical_post(id: &str, created_at: &str, like_count: i64) -> HistoricalPost {
    HistoricalPost {
        id: id.to_string(),
        text: format!("historical text {id}"),
        author_handle: "acct1".to_string(),
        created_at: created_at.to_string(),
        like_count,
        retweet_count: 0,
        reply_count: 0,
        quote_count: 0,
    }
}

/// Scripted [`FeedProvider`]. Timeline pages and publish replies are queues
/// consumed in push order; an empty queue means an empty page (timeline) or
/// an auto-generated id (publish).
#[derive(Default)]
pub struct MockFeed {
    pages: Mutex<VecDeque<Result<PostPage>>>,
    publish_results: Mutex<VecDeque<Result<String>>>,
    metrics: Mutex<HashMap<String, Result<PublicMetrics>>>,
    timeline_calls: Mutex<usize>,
    publish_count: Mutex<usize>,
}

impl MockFeed {
    pub fn push_page(&self, page: Result<PostPage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn push_publish_result(&self, result: Result<String>) {
        self.publish_results.lock().unwrap().push_back(result);
    }

    pub fn set_metrics(&self, published_id: &str, impressions: i64) {
        self.metrics.lock().unwrap().insert(
            published_id.to_string(),
            Ok(PublicMetrics {
                impression_count: Some(impressions),
                ..Default::default()
            }),
        );
    }

    pub fn set_metrics_error(&self, published_id: &str, error: PipelineError) {
        self.metrics
            .lock()
            .unwrap()
            .insert(published_id.to_string(), Err(error));
    }

    pub fn timeline_calls(&self) -> usize {
        *self.timeline_calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedProvider for MockFeed {
    async fn lookup_user(&self, handle: &str) -> Result<FeedUser> {
        Ok(FeedUser {
            id: "42".to_string(),
            name: handle.to_string(),
            username: handle.to_string(),
        })
    }

    async fn user_posts(&self, _user_id: &str, _query: &PostQuery) -> Result<PostPage> {
        *self.timeline_calls.lock().unwrap() += 1;
        match self.pages.lock().unwrap().pop_front() {
            Some(page) => page,
            None => Ok(PostPage::default()),
        }
    }

    async fn post_metrics(&self, post_id: &str) -> Result<PublicMetrics> {
        self.metrics
            .lock()
            .unwrap()
            .remove(post_id)
            .unwrap_or_else(|| Err(PipelineError::NotFound(format!("post {post_id}"))))
    }

    async fn publish(&self, _post: &NewPost) -> Result<String> {
        if let Some(result) = self.publish_results.lock().unwrap().pop_front() {
            return result;
        }
        let mut count = self.publish_count.lock().unwrap();
        *count += 1;
        Ok(format!("pub-{count}"))
    }

    async fn upload_media(&self, _bytes: &[u8], _mime: &str) -> Result<String> {
        Ok("media-1".to_string())
    }
}

/// Scripted [`ContentGenerator`] with field-level control over each reply.
pub struct MockGenerator {
    pub statement: String,
    pub fail_statement: bool,
    pub image: Option<String>,
    pub reaction_query: String,
    pub thread: Option<Vec<ThreadPost>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            statement: "87% of tests rely on a scripted generator.".to_string(),
            fail_statement: false,
            image: None,
            reaction_query: "mind blown".to_string(),
            thread: None,
        }
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn derive_statement(&self, _text: &str, _source_handle: &str) -> Result<String> {
        if self.fail_statement {
            return Err(PipelineError::Api("generator down".to_string()));
        }
        Ok(self.statement.clone())
    }

    async fn derive_reaction_query(&self, _text: &str, _source_handle: &str) -> Result<String> {
        Ok(self.reaction_query.clone())
    }

    async fn derive_image(&self, _statement: &str) -> Option<String> {
        self.image.clone()
    }

    async fn synthesize_thread_posts(
        &self,
        _handle: &str,
        _sample: &[HistoricalPost],
        _aggregates: &ThreadAggregates,
    ) -> Result<Vec<ThreadPost>> {
        match &self.thread {
            Some(posts) => Ok(posts.clone()),
            None => Err(PipelineError::MalformedData("scripted refusal".to_string())),
        }
    }
}

/// [`MediaSource`] returning a fixed URL list for every query.
#[derive(Default)]
pub struct MockMedia {
    urls: Vec<String>,
}

impl MockMedia {
    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl MediaSource for MockMedia {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(self.urls.clone())
    }
}

/// [`MediaFetcher`] that always succeeds with fixed bytes, or always fails.
pub struct MockFetcher {
    response: Option<(Vec<u8>, String)>,
}

impl MockFetcher {
    pub fn with_bytes(bytes: &[u8], mime: &str) -> Self {
        Self {
            response: Some((bytes.to_vec(), mime.to_string())),
        }
    }

    pub fn failing() -> Self {
        Self { response: None }
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, String)> {
        match &self.response {
            Some(response) => Ok(response.clone()),
            None => Err(PipelineError::Network(format!("no route to {url}"))),
        }
    }
}

pub fn test_pipeline(
    feed: MockFeed,
    generator: MockGenerator,
    media: MockMedia,
    fetcher: MockFetcher,
) -> Pipeline {
    test_pipeline_shared(Arc::new(feed), generator, media, fetcher)
}

/// Like [`test_pipeline`] but keeps the caller's handle on the feed so call
/// counts can be asserted after the run.
pub fn test_pipeline_shared(
    feed: Arc<MockFeed>,
    generator: MockGenerator,
    media: MockMedia,
    fetcher: MockFetcher,
) -> Pipeline {
    Pipeline {
        store: Arc::new(MemoryStore::new()),
        feed,
        generator: Arc::new(generator),
        media: Arc::new(media),
        fetcher: Arc::new(fetcher),
        config: PipelineConfig {
            page_delay: Duration::ZERO,
            ..Default::default()
        },
    }
}
