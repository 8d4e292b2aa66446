//! Thread synthesizer: sample the backfilled corpus at a fixed stride, send
//! the sample plus summary aggregates to the content generator, and fall back
//! to a deterministic thread built from the aggregates when the generator's
//! reply cannot be parsed.

use super::{Pipeline, now_ms};
use crate::error::{PipelineError, Result};
use crate::keys::StoreKey;
use crate::store::{ReadOutcome, read_record, write_record};
use inspo_monitor_types::{
    BackfillProgress, GeneratedThread, HistoricalPost, ThreadAggregates, ThreadOutcome, ThreadPost,
};

/// Sample at most this many historical posts for analysis.
const MAX_SAMPLE: usize = 100;

impl Pipeline {
    pub async fn synthesize_thread(&self, account: &str) -> Result<ThreadOutcome> {
        let thread_key = StoreKey::Thread { account }.to_string();
        if let ReadOutcome::Found(thread) =
            read_record::<GeneratedThread>(self.store.as_ref(), &thread_key).await?
        {
            log::info!("Returning cached thread for @{account}");
            return Ok(ThreadOutcome {
                thread,
                is_new: false,
            });
        }

        let progress = match read_record::<BackfillProgress>(
            self.store.as_ref(),
            &StoreKey::Backfill { account }.to_string(),
        )
        .await?
        {
            ReadOutcome::Found(p) if p.count > 0 => p,
            _ => {
                return Err(PipelineError::Precondition(format!(
                    "no historical posts for @{account}; run backfill first"
                )));
            }
        };

        let sample = self.sample_historical(account, &progress.ids).await?;
        if sample.is_empty() {
            return Err(PipelineError::Precondition(format!(
                "historical records for @{account} are missing; clear and re-run backfill"
            )));
        }
        log::info!(
            "Synthesizing thread for @{account} from {} sampled posts",
            sample.len()
        );

        let aggregates = compute_aggregates(&sample);
        let posts = match self
            .generator
            .synthesize_thread_posts(account, &sample, &aggregates)
            .await
        {
            Ok(posts) if !posts.is_empty() => posts,
            Ok(_) | Err(PipelineError::MalformedData(_)) => {
                log::warn!("Generator reply unusable; building fallback thread for @{account}");
                fallback_thread(account, &aggregates)
            }
            Err(e) => return Err(e),
        };

        let thread = GeneratedThread {
            account: account.to_string(),
            posts,
            generated_at: now_ms(),
        };
        write_record(self.store.as_ref(), &thread_key, &thread).await?;

        Ok(ThreadOutcome {
            thread,
            is_new: true,
        })
    }

    /// Load every `stride`-th id until the list is exhausted or the sample is
    /// full, dropping unparseable records along the way.
    async fn sample_historical(&self, account: &str, ids: &[String]) -> Result<Vec<HistoricalPost>> {
        let sample_size = MAX_SAMPLE.min(ids.len());
        let stride = 1.max(ids.len() / sample_size);

        let mut sample = Vec::with_capacity(sample_size);
        for id in ids.iter().step_by(stride) {
            let key = StoreKey::Historical { account, id }.to_string();
            if let ReadOutcome::Found(post) =
                read_record::<HistoricalPost>(self.store.as_ref(), &key).await?
            {
                sample.push(post);
            }
            if sample.len() >= sample_size {
                break;
            }
        }
        // Oldest first, so date ranges and timelines read forward.
        sample.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sample)
    }
}

pub(crate) fn compute_aggregates(sample: &[HistoricalPost]) -> ThreadAggregates {
    let total_likes: i64 = sample.iter().map(|p| p.like_count).sum();
    let total_retweets: i64 = sample.iter().map(|p| p.retweet_count).sum();
    let n = sample.len().max(1) as f64;

    let date_range = match (sample.first(), sample.last()) {
        (Some(first), Some(last)) => format!("{} to {}", first.created_at, last.created_at),
        _ => "unknown".to_string(),
    };

    let mut top_posts: Vec<HistoricalPost> = sample.to_vec();
    top_posts.sort_by_key(|p| std::cmp::Reverse(p.like_count + p.retweet_count));
    top_posts.truncate(5);

    ThreadAggregates {
        date_range,
        sample_size: sample.len(),
        avg_likes: total_likes as f64 / n,
        avg_retweets: total_retweets as f64 / n,
        top_posts,
    }
}

/// Deterministic 4-post thread built purely from the aggregates. Used when
/// the generator's reply is unusable; must never fail.
pub(crate) fn fallback_thread(account: &str, aggregates: &ThreadAggregates) -> Vec<ThreadPost> {
    let top = aggregates.top_posts.first();
    vec![
        ThreadPost {
            position: 1,
            text: format!("THREAD: A deep dive into @{account}'s posting history and insights"),
            category: "introduction".to_string(),
        },
        ThreadPost {
            position: 2,
            text: format!(
                "Looking at @{account}'s posts from {}, we see an average of {:.1} likes and {:.1} retweets per post.",
                aggregates.date_range, aggregates.avg_likes, aggregates.avg_retweets
            ),
            category: "engagement".to_string(),
        },
        ThreadPost {
            position: 3,
            text: match top {
                Some(top) => format!(
                    "@{account}'s most popular post received {} likes and was posted on {}.",
                    top.like_count, top.created_at
                ),
                None => format!("@{account}'s engagement data is still being collected."),
            },
            category: "engagement".to_string(),
        },
        ThreadPost {
            position: 4,
            text: format!(
                "That's a wrap on @{account}'s posting history! More insights to come."
            ),
            category: "conclusion".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_record;
    use crate::testutil::{
        MockFeed, MockFetcher, MockGenerator, MockMedia, historical_post, test_pipeline,
    };

    async fn seed_backfill(pipeline: &Pipeline, account: &str, posts: &[HistoricalPost]) {
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        for post in posts {
            write_record(
                pipeline.store.as_ref(),
                &format!("historical:{account}:{}", post.id),
                post,
            )
            .await
            .unwrap();
        }
        write_record(
            pipeline.store.as_ref(),
            &format!("backfill:{account}"),
            &BackfillProgress {
                count: ids.len(),
                ids,
            },
        )
        .await
        .unwrap();
    }

    fn corpus(n: usize) -> Vec<HistoricalPost> {
        (0..n)
            .map(|i| historical_post(&format!("{i}"), &format!("2024-01-{:02}T00:00:00Z", i % 28 + 1), i as i64))
            .collect()
    }

    #[tokio::test]
    async fn synthesize_before_backfill_is_a_precondition_error() {
        let pipeline = test_pipeline(
            MockFeed::default(),
            MockGenerator::default(),
            MockMedia::default(),
            MockFetcher::failing(),
        );
        let err = pipeline.synthesize_thread("acct1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }

    #[tokio::test]
    async fn unparseable_generator_reply_falls_back_deterministically() {
        // MockGenerator's default thread reply is MalformedData.
        let pipeline = test_pipeline(
            MockFeed::default(),
            MockGenerator::default(),
            MockMedia::default(),
            MockFetcher::failing(),
        );
        seed_backfill(&pipeline, "acct1", &corpus(10)).await;

        let outcome = pipeline.synthesize_thread("acct1").await.unwrap();
        assert!(outcome.is_new);
        assert!(!outcome.thread.posts.is_empty());
        for post in &outcome.thread.posts {
            assert!(
                ["introduction", "engagement", "conclusion"].contains(&post.category.as_str()),
                "unexpected category {}",
                post.category
            );
        }
    }

    #[tokio::test]
    async fn generated_thread_is_cached_and_never_silently_regenerated() {
        let scripted = vec![ThreadPost {
            position: 1,
            text: "custom".to_string(),
            category: "introduction".to_string(),
        }];
        let pipeline = test_pipeline(
            MockFeed::default(),
            MockGenerator {
                thread: Some(scripted),
                ..Default::default()
            },
            MockMedia::default(),
            MockFetcher::failing(),
        );
        seed_backfill(&pipeline, "acct1", &corpus(5)).await;

        let first = pipeline.synthesize_thread("acct1").await.unwrap();
        assert!(first.is_new);
        assert_eq!(first.thread.posts[0].text, "custom");

        let second = pipeline.synthesize_thread("acct1").await.unwrap();
        assert!(!second.is_new);
        assert_eq!(second.thread.posts[0].text, "custom");
    }

    #[tokio::test]
    async fn sampling_strides_a_large_corpus_down_to_the_cap() {
        let pipeline = test_pipeline(
            MockFeed::default(),
            MockGenerator::default(),
            MockMedia::default(),
            MockFetcher::failing(),
        );
        seed_backfill(&pipeline, "acct1", &corpus(400)).await;

        let ids: Vec<String> = (0..400).map(|i| i.to_string()).collect();
        let sample = pipeline.sample_historical("acct1", &ids).await.unwrap();
        assert_eq!(sample.len(), 100);
    }

    #[test]
    fn aggregates_cover_range_averages_and_top_posts() {
        let posts = vec![
            historical_post("1", "2024-01-01T00:00:00Z", 10),
            historical_post("2", "2024-02-01T00:00:00Z", 50),
            historical_post("3", "2024-03-01T00:00:00Z", 30),
        ];
        let aggregates = compute_aggregates(&posts);
        assert_eq!(
            aggregates.date_range,
            "2024-01-01T00:00:00Z to 2024-03-01T00:00:00Z"
        );
        assert_eq!(aggregates.sample_size, 3);
        assert!((aggregates.avg_likes - 30.0).abs() < f64::EPSILON);
        assert_eq!(aggregates.top_posts[0].id, "2");
    }

    #[test]
    fn fallback_thread_never_panics_even_with_empty_aggregates() {
        let aggregates = compute_aggregates(&[]);
        let posts = fallback_thread("acct1", &aggregates);
        assert_eq!(posts.len(), 4);
        assert_eq!(posts[0].category, "introduction");
        assert_eq!(posts[3].category, "conclusion");
    }
}
