//! Media resolver: turn a generated image or a reaction search query into an
//! uploaded media id, degrading to a link-only or text-only post when binary
//! transfer fails. Resolution never errors — the worst case is text-only.

use super::Pipeline;
use crate::error::{PipelineError, Result};
use crate::giphy;
use async_trait::async_trait;

/// Downloads a URL to bytes plus a MIME type. A seam so the resolver can be
/// exercised without the network.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, String)>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::Network(format!(
                "media download failed: HTTP {}",
                response.status()
            )));
        }
        let mime = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok((bytes, mime))
    }
}

/// How a post's media ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    /// Binary payload uploaded; publish with this media id.
    Uploaded(String),
    /// Upload failed; append the URL to the post text instead.
    LinkOnly(String),
    /// No media available; publish text only.
    TextOnly,
}

impl Pipeline {
    /// Resolve media for a statement: prefer a generated illustrative image,
    /// fall back to a reaction GIF for the source text, then degrade.
    pub(crate) async fn resolve_media(
        &self,
        statement: &str,
        source_text: &str,
        source_handle: &str,
    ) -> MediaOutcome {
        let url = match self.generator.derive_image(statement).await {
            Some(url) => Some(url),
            None => {
                let query = match self
                    .generator
                    .derive_reaction_query(source_text, source_handle)
                    .await
                {
                    Ok(q) => q,
                    Err(e) => {
                        log::debug!("Reaction query derivation failed: {e}");
                        return MediaOutcome::TextOnly;
                    }
                };
                giphy::random_gif(self.media.as_ref(), &query).await
            }
        };

        let Some(url) = url else {
            return MediaOutcome::TextOnly;
        };

        match self.upload_from_url(&url).await {
            Ok(media_id) => MediaOutcome::Uploaded(media_id),
            Err(e) => {
                log::warn!("Media upload failed ({e}); falling back to link-only");
                MediaOutcome::LinkOnly(url)
            }
        }
    }

    async fn upload_from_url(&self, url: &str) -> Result<String> {
        let (bytes, mime) = self.fetcher.fetch(url).await?;
        self.feed.upload_media(&bytes, &mime).await
    }
}
