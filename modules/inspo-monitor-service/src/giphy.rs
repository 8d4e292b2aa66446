//! Giphy media source: GIF search plus a random pick with a fixed fallback
//! query when the primary search comes up empty.

use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;

const SEARCH_URL: &str = "https://api.giphy.com/v1/gifs/search";

/// Secondary query used when the primary search yields nothing.
const FALLBACK_QUERY: &str = "reaction";

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// GIF URLs matching the query, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct GiphySearchResult {
    data: Vec<GiphyGif>,
}

#[derive(Debug, Deserialize)]
struct GiphyGif {
    images: GiphyImages,
}

#[derive(Debug, Deserialize)]
struct GiphyImages {
    downsized: GiphyRendition,
}

#[derive(Debug, Deserialize)]
struct GiphyRendition {
    url: String,
}

pub struct GiphyClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GiphyClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl MediaSource for GiphyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let Some(ref api_key) = self.api_key else {
            log::warn!("GIPHY_API_KEY not set; media search disabled");
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("api_key", api_key.as_str()),
                ("q", query),
                ("limit", &limit.to_string()),
                ("rating", "g"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(crate::twitter_api::classify_status(status.as_u16(), &body));
        }

        let parsed: GiphySearchResult = serde_json::from_str(&body).map_err(|e| {
            crate::error::PipelineError::MalformedData(format!("giphy reply: {e}"))
        })?;
        Ok(parsed
            .data
            .into_iter()
            .map(|gif| gif.images.downsized.url)
            .collect())
    }
}

/// Pick a random GIF for the query, falling back to a fixed secondary query
/// when the primary finds nothing. A blank query becomes "thumbs up".
pub async fn random_gif(source: &dyn MediaSource, query: &str) -> Option<String> {
    let query = if query.trim().is_empty() {
        "thumbs up"
    } else {
        query
    };

    let urls = match source.search(query, 10).await {
        Ok(urls) => urls,
        Err(e) => {
            log::warn!("Media search for \"{query}\" failed: {e}");
            return None;
        }
    };

    let urls = if urls.is_empty() {
        match source.search(FALLBACK_QUERY, 10).await {
            Ok(urls) => urls,
            Err(e) => {
                log::warn!("Fallback media search failed: {e}");
                return None;
            }
        }
    } else {
        urls
    };

    if urls.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..urls.len());
    Some(urls[index].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        by_query: Mutex<std::collections::HashMap<String, Vec<String>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            let map = entries
                .iter()
                .map(|(q, urls)| {
                    (
                        q.to_string(),
                        urls.iter().map(|u| u.to_string()).collect(),
                    )
                })
                .collect();
            Self {
                by_query: Mutex::new(map),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaSource for ScriptedSource {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<String>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self
                .by_query
                .lock()
                .unwrap()
                .get(query)
                .cloned()
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn picks_from_primary_results() {
        let source = ScriptedSource::new(&[("mind blown", &["http://g/1"])]);
        let url = random_gif(&source, "mind blown").await;
        assert_eq!(url.as_deref(), Some("http://g/1"));
    }

    #[tokio::test]
    async fn falls_back_to_reaction_when_primary_is_empty() {
        let source = ScriptedSource::new(&[("reaction", &["http://g/fallback"])]);
        let url = random_gif(&source, "obscure query").await;
        assert_eq!(url.as_deref(), Some("http://g/fallback"));
        assert_eq!(
            *source.queries.lock().unwrap(),
            vec!["obscure query", "reaction"]
        );
    }

    #[tokio::test]
    async fn blank_query_becomes_thumbs_up() {
        let source = ScriptedSource::new(&[("thumbs up", &["http://g/up"])]);
        let url = random_gif(&source, "   ").await;
        assert_eq!(url.as_deref(), Some("http://g/up"));
    }

    #[tokio::test]
    async fn no_results_anywhere_yields_none() {
        let source = ScriptedSource::new(&[]);
        assert_eq!(random_gif(&source, "anything").await, None);
    }
}
