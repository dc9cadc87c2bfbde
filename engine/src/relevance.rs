//! Subreddit relevance scoring: how many of a subreddit's hot-post titles
//! mention the topic. The concurrent variant fans candidate subreddits out
//! over a bounded worker pool; a failure for one candidate drops only that
//! candidate from the ranking.

use redlens_core::{ContentSource, RankedSubreddit, Subreddit};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const DEFAULT_MAX_WORKERS: usize = 5;

async fn score_subreddit(
    source: &dyn ContentSource,
    subreddit: &Subreddit,
    topic_lower: &str,
    hot_posts_limit: u32,
) -> Option<RankedSubreddit> {
    match source.get_hot_posts(&subreddit.name, hot_posts_limit).await {
        Ok(posts) => {
            let score = posts
                .iter()
                .filter(|post| post.title.to_lowercase().contains(topic_lower))
                .count() as u32;
            debug!("r/{} scored {} for topic match", subreddit.name, score);
            Some(RankedSubreddit {
                name: subreddit.name.clone(),
                description: subreddit.description.clone(),
                score,
            })
        }
        Err(e) => {
            warn!("Failed to score subreddit {}: {}", subreddit.name, e);
            None
        }
    }
}

/// Sequential scoring; candidates that fail to fetch are skipped.
pub async fn score_and_rank_subreddits(
    source: &dyn ContentSource,
    subreddits: &[Subreddit],
    topic: &str,
    hot_posts_limit: u32,
) -> Vec<RankedSubreddit> {
    let topic_lower = topic.to_lowercase();
    let mut ranked = Vec::new();

    for subreddit in subreddits {
        if let Some(scored) = score_subreddit(source, subreddit, &topic_lower, hot_posts_limit).await
        {
            ranked.push(scored);
        }
    }

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Concurrent scoring over a bounded worker pool. Per-task failures are
/// caught and that candidate is simply omitted from the ranked output.
pub async fn score_and_rank_subreddits_concurrent(
    source: Arc<dyn ContentSource>,
    subreddits: Vec<Subreddit>,
    topic: &str,
    hot_posts_limit: u32,
    max_workers: usize,
) -> Vec<RankedSubreddit> {
    if subreddits.is_empty() {
        return Vec::new();
    }

    let topic_lower = topic.to_lowercase();
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks: JoinSet<Option<RankedSubreddit>> = JoinSet::new();

    for subreddit in subreddits {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let topic_lower = topic_lower.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            score_subreddit(source.as_ref(), &subreddit, &topic_lower, hot_posts_limit).await
        });
    }

    let mut ranked = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(scored)) => ranked.push(scored),
            Ok(None) => {}
            Err(e) => warn!("Relevance scoring task panicked: {}", e),
        }
    }

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}
