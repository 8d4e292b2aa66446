//! Content generator backed by OpenRouter chat and image endpoints.
//!
//! Stateless beyond the outbound calls: turns an inspiration text into a
//! derived statistical statement, an optional illustrative image, a reaction
//! search query, and a structured multi-post thread.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use inspo_monitor_types::{HistoricalPost, ThreadAggregates, ThreadPost};
use serde::{Deserialize, Serialize};

const CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const IMAGE_URL: &str = "https://openrouter.ai/api/v1/images/generations";

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// A standalone statistical post inspired by the source text.
    async fn derive_statement(&self, text: &str, source_handle: &str) -> Result<String>;
    /// A short search query for a reaction GIF matching the source text.
    async fn derive_reaction_query(&self, text: &str, source_handle: &str) -> Result<String>;
    /// URL of an illustrative image for the statement, or None on any
    /// failure — image generation is always optional.
    async fn derive_image(&self, statement: &str) -> Option<String>;
    /// An ordered, categorized thread summarizing the sampled history.
    /// Returns `MalformedData` when the reply cannot be parsed as the
    /// expected structure; the caller decides on a fallback.
    async fn synthesize_thread_posts(
        &self,
        handle: &str,
        sample: &[HistoricalPost],
        aggregates: &ThreadAggregates,
    ) -> Result<Vec<ThreadPost>>;
}

// =====================================================
// Wire Types
// =====================================================

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
}

// =====================================================
// Client
// =====================================================

pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    referer: String,
}

impl OpenRouterClient {
    pub fn new(client: reqwest::Client, api_key: String, model: String, referer: String) -> Self {
        Self {
            client,
            api_key,
            model,
            referer,
        }
    }

    async fn chat(
        &self,
        system: String,
        user: String,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", "Inspo Monitor")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(crate::twitter_api::classify_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::MalformedData(format!("chat reply: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Api("chat reply had no choices".to_string()))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ContentGenerator for OpenRouterClient {
    async fn derive_statement(&self, text: &str, source_handle: &str) -> Result<String> {
        let system = format!(
            "You are an expert at creating original statistical posts inspired by trending topics.\n\
             \n\
             You use @{source_handle}'s posts as inspiration for your own standalone content. \
             You are NOT replying — you create original posts.\n\
             \n\
             Analyze the inspiration post and create ONE powerful statistical post related to \
             its main topic.\n\
             \n\
             GUIDELINES:\n\
             - Include a specific number or percentage\n\
             - Make it surprising or counterintuitive when possible\n\
             - Keep it under 200 characters\n\
             - No hashtags, @mentions, or emojis\n\
             - No questions or calls to action — just the statistic itself\n\
             \n\
             OUTPUT: the standalone statistical post and nothing else."
        );
        let user =
            format!("Generate a statistical post inspired by this post from {source_handle}: \"{text}\"");
        let reply = self.chat(system, user, 200, None).await?;
        Ok(strip_wrapping_quotes(&reply).to_string())
    }

    async fn derive_reaction_query(&self, text: &str, source_handle: &str) -> Result<String> {
        let system = "You suggest the perfect GIF search query to react to a post.\n\
             \n\
             GUIDELINES:\n\
             - 1-5 words, humorous and relevant\n\
             - No hashtags, @mentions, or emojis\n\
             - Avoid controversial or offensive suggestions\n\
             \n\
             OUTPUT: only the search query text, no commentary.\n\
             Example outputs: \"mind blown\", \"applause\", \"facepalm\""
            .to_string();
        let user =
            format!("Suggest a GIF search query to react to this post from {source_handle}: \"{text}\"");
        let reply = self.chat(system, user, 50, None).await?;
        Ok(strip_wrapping_quotes(&reply).to_string())
    }

    async fn derive_image(&self, statement: &str) -> Option<String> {
        let prompt = format!(
            "Create a conceptual, minimalist visualization representing this statistical fact: \
             \"{statement}\". Use a clean, professional style with simple shapes, icons, or data \
             visualization elements. No text in the image. Use a color palette that evokes trust \
             and authority."
        );
        let request = ImageRequest {
            model: "stability-ai/stable-diffusion-xl-1024-v1-0".to_string(),
            prompt,
            n: 1,
            size: "1024x1024".to_string(),
        };

        let response = self
            .client
            .post(IMAGE_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", "Inspo Monitor")
            .json(&request)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            log::warn!("Image generation failed: HTTP {}", response.status());
            return None;
        }

        let json: serde_json::Value = response.json().await.ok()?;
        let url = json
            .get("data")?
            .get(0)?
            .get("url")?
            .as_str()?
            .to_string();
        Some(url)
    }

    async fn synthesize_thread_posts(
        &self,
        handle: &str,
        sample: &[HistoricalPost],
        aggregates: &ThreadAggregates,
    ) -> Result<Vec<ThreadPost>> {
        let system = format!(
            "You are a social media analyst who creates insightful threads about a user's \
             posting history.\n\
             \n\
             THREAD STRUCTURE:\n\
             1. Introduction post\n\
             2. Timeline posts (3-5) — key milestones\n\
             3. Topic analysis posts (3-5)\n\
             4. Engagement analysis posts (1-2)\n\
             5. Conclusion post\n\
             \n\
             GUIDELINES:\n\
             - Each post under 280 characters\n\
             - Include specific data points\n\
             - Mention @{handle} in each post\n\
             \n\
             OUTPUT FORMAT: a JSON array where each element is an object with\n\
             - position: number\n\
             - text: string\n\
             - category: one of introduction, timeline, topic, engagement, conclusion"
        );

        let top_lines: String = aggregates
            .top_posts
            .iter()
            .map(|p| {
                format!(
                    "- \"{}\" ({} likes, {} retweets, posted {})",
                    clip(&p.text, 100),
                    p.like_count,
                    p.retweet_count,
                    p.created_at
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let sample_lines: String = sample
            .iter()
            .take(20)
            .map(|p| format!("- \"{}\"", clip(&p.text, 100)))
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!(
            "Generate a thread analyzing @{handle}'s posting history based on this data:\n\
             \n\
             Date range: {}\n\
             Total posts analyzed: {}\n\
             Average likes per post: {:.1}\n\
             Average retweets per post: {:.1}\n\
             \n\
             Top posts by engagement:\n{top_lines}\n\
             \n\
             Sample of post texts:\n{sample_lines}",
            aggregates.date_range, aggregates.sample_size, aggregates.avg_likes,
            aggregates.avg_retweets
        );

        let reply = self.chat(system, user, 2000, Some(0.7)).await?;
        parse_thread_posts(&reply)
    }
}

// =====================================================
// Reply parsing
// =====================================================

/// Strip one layer of wrapping quotes the model sometimes adds.
pub fn strip_wrapping_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Pull a JSON payload out of a reply that may wrap it in markdown fences.
pub fn extract_json_block(reply: &str) -> &str {
    let fence = regex::Regex::new(r"(?s)```(?:json)?\s*(.+?)```").unwrap();
    match fence.captures(reply) {
        Some(caps) => caps.get(1).unwrap().as_str().trim(),
        None => reply.trim(),
    }
}

/// Strict parse of the expected `[{position, text, category}]` structure.
pub fn parse_thread_posts(reply: &str) -> Result<Vec<ThreadPost>> {
    let payload = extract_json_block(reply);
    serde_json::from_str::<Vec<ThreadPost>>(payload)
        .map_err(|e| PipelineError::MalformedData(format!("thread reply: {e}")))
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let clipped: String = s.chars().take(max).collect();
        format!("{clipped}...")
    }
}
