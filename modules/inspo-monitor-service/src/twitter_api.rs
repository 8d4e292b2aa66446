//! Twitter/X feed provider: API v2 timeline/lookup/publish plus v1.1 media
//! upload, signed with OAuth 1.0a.
//!
//! Provider errors are classified into the pipeline taxonomy at this boundary
//! so callers can branch on rate-limit vs auth vs generic failures.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

const API_BASE: &str = "https://api.twitter.com";
const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";

/// Timeline fields requested for every fetch.
const POST_FIELDS: &str = "created_at,public_metrics,referenced_tweets";

// =====================================================
// Wire Types
// =====================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FeedUser {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicMetrics {
    pub like_count: Option<i64>,
    pub retweet_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub quote_count: Option<i64>,
    pub impression_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedPost {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub id: String,
}

/// A post as returned by the timeline endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub text: String,
    pub created_at: Option<String>,
    pub public_metrics: Option<PublicMetrics>,
    pub referenced_tweets: Option<Vec<ReferencedPost>>,
}

impl FeedPost {
    /// Classify by referenced_tweets: reply, quote, retweet or original.
    pub fn post_kind(&self) -> &str {
        if let Some(refs) = &self.referenced_tweets {
            for r in refs {
                match r.ref_type.as_str() {
                    "replied_to" => return "reply",
                    "quoted" => return "quote",
                    "retweeted" => return "retweet",
                    _ => {}
                }
            }
        }
        "original"
    }
}

/// One page of a user timeline.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<FeedPost>,
    pub result_count: usize,
    pub next_token: Option<String>,
}

/// Parameters for a timeline fetch. `since_id` bounds incremental polls;
/// `pagination_token` walks historical pages.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub max_results: u32,
    pub since_id: Option<String>,
    pub pagination_token: Option<String>,
}

/// Content to publish: text, optional uploaded media, optional reply target.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub text: String,
    pub media_ids: Vec<String>,
    pub reply_to: Option<String>,
}

// =====================================================
// Provider Trait
// =====================================================

#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn lookup_user(&self, handle: &str) -> Result<FeedUser>;
    /// Original posts only (retweets and replies excluded at the provider).
    async fn user_posts(&self, user_id: &str, query: &PostQuery) -> Result<PostPage>;
    async fn post_metrics(&self, post_id: &str) -> Result<PublicMetrics>;
    /// Publish a post and return its durable id.
    async fn publish(&self, post: &NewPost) -> Result<String>;
    /// Upload a binary payload, returning a media id usable in `publish`.
    async fn upload_media(&self, bytes: &[u8], mime: &str) -> Result<String>;
}

// =====================================================
// OAuth 1.0a credentials
// =====================================================

#[derive(Debug, Clone, Default)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl TwitterCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            consumer_key: std::env::var("TWITTER_CONSUMER_KEY").ok()?,
            consumer_secret: std::env::var("TWITTER_CONSUMER_SECRET").ok()?,
            access_token: std::env::var("TWITTER_ACCESS_TOKEN").ok()?,
            access_token_secret: std::env::var("TWITTER_ACCESS_TOKEN_SECRET").ok()?,
        })
    }
}

// =====================================================
// Client
// =====================================================

pub struct TwitterApi {
    client: reqwest::Client,
    credentials: TwitterCredentials,
}

impl TwitterApi {
    pub fn new(client: reqwest::Client, credentials: TwitterCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    async fn get_json(
        &self,
        base_url: &str,
        query_params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let extra: Vec<(&str, &str)> = query_params
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        let auth = generate_oauth_header("GET", base_url, &self.credentials, Some(&extra));

        let full_url = if query_params.is_empty() {
            base_url.to_string()
        } else {
            let query_string: String = query_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, percent_encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            format!("{base_url}?{query_string}")
        };

        let response = self
            .client
            .get(&full_url)
            .header("Authorization", auth)
            .send()
            .await?;

        if let Some(remaining) = rate_limit_remaining(&response) {
            if remaining < 5 {
                log::warn!("Rate limit low: {remaining} requests remaining");
            }
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| PipelineError::MalformedData(format!("invalid provider JSON: {e}")))
    }
}

#[async_trait]
impl FeedProvider for TwitterApi {
    async fn lookup_user(&self, handle: &str) -> Result<FeedUser> {
        let clean = handle.trim_start_matches('@');
        let url = format!("{API_BASE}/2/users/by/username/{clean}");
        let json = self.get_json(&url, &[]).await?;

        if let Some(data) = json.get("data") {
            serde_json::from_value(data.clone())
                .map_err(|e| PipelineError::MalformedData(format!("user payload: {e}")))
        } else if let Some(errors) = json.get("errors") {
            Err(PipelineError::NotFound(
                errors[0]["detail"]
                    .as_str()
                    .unwrap_or("unknown user")
                    .to_string(),
            ))
        } else {
            Err(PipelineError::NotFound(format!("user @{clean}")))
        }
    }

    async fn user_posts(&self, user_id: &str, query: &PostQuery) -> Result<PostPage> {
        let url = format!("{API_BASE}/2/users/{user_id}/tweets");

        let mut params: Vec<(&str, String)> = vec![
            ("max_results", query.max_results.to_string()),
            ("tweet.fields", POST_FIELDS.to_string()),
            ("exclude", "retweets,replies".to_string()),
        ];
        if let Some(ref sid) = query.since_id {
            params.push(("since_id", sid.clone()));
        }
        if let Some(ref token) = query.pagination_token {
            params.push(("pagination_token", token.clone()));
        }

        let json = self.get_json(&url, &params).await?;

        let posts: Vec<FeedPost> = json
            .get("data")
            .map(|d| serde_json::from_value(d.clone()).unwrap_or_default())
            .unwrap_or_default();
        let meta = json.get("meta");
        let result_count = meta
            .and_then(|m| m.get("result_count"))
            .and_then(|c| c.as_u64())
            .unwrap_or(posts.len() as u64) as usize;
        let next_token = meta
            .and_then(|m| m.get("next_token"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string());

        Ok(PostPage {
            posts,
            result_count,
            next_token,
        })
    }

    async fn post_metrics(&self, post_id: &str) -> Result<PublicMetrics> {
        let url = format!("{API_BASE}/2/tweets/{post_id}");
        let params = [("tweet.fields", "public_metrics".to_string())];
        let json = self.get_json(&url, &params).await?;

        json.get("data")
            .and_then(|d| d.get("public_metrics"))
            .map(|m| serde_json::from_value(m.clone()).unwrap_or_default())
            .ok_or_else(|| PipelineError::NotFound(format!("post {post_id}")))
    }

    async fn publish(&self, post: &NewPost) -> Result<String> {
        let url = format!("{API_BASE}/2/tweets");
        // JSON bodies carry no OAuth body parameters; only the oauth_* set is
        // signed.
        let auth = generate_oauth_header("POST", &url, &self.credentials, None);

        let mut body = serde_json::json!({ "text": post.text });
        if !post.media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": post.media_ids });
        }
        if let Some(ref reply_to) = post.reply_to {
            body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": reply_to });
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::MalformedData(format!("publish reply: {e}")))?;
        json.get("data")
            .and_then(|d| d.get("id"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| PipelineError::Api("publish reply missing post id".to_string()))
    }

    async fn upload_media(&self, bytes: &[u8], mime: &str) -> Result<String> {
        let encoded = BASE64.encode(bytes);
        // Form parameters participate in the OAuth signature.
        let params: Vec<(&str, &str)> = vec![("media_data", encoded.as_str())];
        let auth = generate_oauth_header("POST", UPLOAD_URL, &self.credentials, Some(&params));

        log::debug!("Uploading {} bytes of {mime} media", bytes.len());

        let response = self
            .client
            .post(UPLOAD_URL)
            .header("Authorization", auth)
            .form(&[("media_data", encoded.as_str())])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::MalformedData(format!("upload reply: {e}")))?;
        json.get("media_id_string")
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| PipelineError::Api("upload reply missing media id".to_string()))
    }
}

// =====================================================
// Error classification
// =====================================================

pub fn classify_status(status: u16, body: &str) -> PipelineError {
    match status {
        429 => PipelineError::RateLimited,
        401 | 403 => PipelineError::Auth(truncate_error(body).to_string()),
        404 => PipelineError::NotFound(truncate_error(body).to_string()),
        _ => PipelineError::Api(format!("HTTP {status}: {}", truncate_error(body))),
    }
}

fn rate_limit_remaining(response: &reqwest::Response) -> Option<u32> {
    response
        .headers()
        .get("x-rate-limit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// First 200 characters of an error body, cut on a char boundary so
/// multibyte provider text never panics the classifier.
fn truncate_error(s: &str) -> &str {
    match s.char_indices().nth(200) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =====================================================
// OAuth 1.0a Implementation
// =====================================================

fn percent_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

fn generate_oauth_header(
    method: &str,
    url: &str,
    credentials: &TwitterCredentials,
    extra_params: Option<&[(&str, &str)]>,
) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string();

    let nonce: String = (0..32)
        .map(|_| format!("{:x}", rand::random::<u8>()))
        .collect();

    let mut oauth_params: Vec<(&str, String)> = vec![
        ("oauth_consumer_key", credentials.consumer_key.clone()),
        ("oauth_nonce", nonce.clone()),
        ("oauth_signature_method", "HMAC-SHA1".to_string()),
        ("oauth_timestamp", timestamp.clone()),
        ("oauth_token", credentials.access_token.clone()),
        ("oauth_version", "1.0".to_string()),
    ];

    if let Some(params) = extra_params {
        for (k, v) in params {
            oauth_params.push((k, v.to_string()));
        }
    }

    oauth_params.sort_by(|a, b| a.0.cmp(b.0));

    let param_string: String = oauth_params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    );

    let signing_key = format!(
        "{}&{}",
        percent_encode(&credentials.consumer_secret),
        percent_encode(&credentials.access_token_secret)
    );

    let mut mac =
        HmacSha1::new_from_slice(signing_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(base_string.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let auth_params = [
        ("oauth_consumer_key", credentials.consumer_key.as_str()),
        ("oauth_nonce", &nonce),
        ("oauth_signature", &signature),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", &timestamp),
        ("oauth_token", &credentials.access_token),
        ("oauth_version", "1.0"),
    ];

    let auth_string: String = auth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("OAuth {auth_string}")
}
