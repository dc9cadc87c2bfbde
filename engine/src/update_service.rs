//! Orchestration of the update-check workflow: validate, fetch, classify,
//! persist, cache, and report. Every stage runs inside a monitor timing
//! region; the database work for one check either commits completely or not
//! at all.

use crate::change_detection::ChangeDetectionEngine;
use crate::relevance::{score_and_rank_subreddits_concurrent, DEFAULT_MAX_WORKERS};
use crate::validation::validate_input_string;
use caching::TieredCache;
use chrono::Utc;
use monitoring::PerformanceMonitor;
use redlens_core::{
    ContentSource, CoreError, Post, RankedSubreddit, RedditConfig, Scrape, Summarize,
    SummaryKind, UpdateCheckResult,
};
use std::sync::Arc;
use std::time::Instant;
use storage::StorageService;
use tracing::{info, warn};

const TOP_SUBREDDIT_RESULTS: usize = 3;

pub struct UpdateCheckService {
    source: Arc<dyn ContentSource>,
    summarizer: Arc<dyn Summarize>,
    scraper: Arc<dyn Scrape>,
    storage: Arc<StorageService>,
    engine: ChangeDetectionEngine,
    cache: Arc<TieredCache>,
    monitor: Arc<PerformanceMonitor>,
    reddit_config: RedditConfig,
}

impl UpdateCheckService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn ContentSource>,
        summarizer: Arc<dyn Summarize>,
        scraper: Arc<dyn Scrape>,
        storage: Arc<StorageService>,
        cache: Arc<TieredCache>,
        monitor: Arc<PerformanceMonitor>,
        reddit_config: RedditConfig,
    ) -> Self {
        let engine = ChangeDetectionEngine::new(Arc::clone(&storage));
        Self {
            source,
            summarizer,
            scraper,
            storage,
            engine,
            cache,
            monitor,
            reddit_config,
        }
    }

    /// Discover and rank subreddits relevant to a topic, returning the top
    /// candidates.
    pub async fn discover_subreddits(
        &self,
        topic: &str,
    ) -> Result<Vec<RankedSubreddit>, CoreError> {
        let topic = validate_input_string(topic, "topic")?;
        let _timer = self.monitor.measure_time("discover_subreddits");

        let subreddits = self
            .source
            .search_subreddits(&topic, self.reddit_config.hot_posts_limit)
            .await?;

        if subreddits.is_empty() {
            return Err(CoreError::NotFound {
                resource: format!("subreddits for topic '{}'", topic),
            });
        }

        let mut ranked = score_and_rank_subreddits_concurrent(
            Arc::clone(&self.source),
            subreddits,
            &topic,
            self.reddit_config.hot_posts_limit,
            DEFAULT_MAX_WORKERS,
        )
        .await;

        ranked.truncate(TOP_SUBREDDIT_RESULTS);
        Ok(ranked)
    }

    /// Run one update check for a subreddit/topic pair.
    ///
    /// The first check for a pair classifies every fetched post as new.
    /// Subsequent checks compare against stored snapshots and report
    /// engagement deltas. The fetched batch is persisted as snapshot rows
    /// tied to the newly created check run.
    pub async fn check_updates(
        &self,
        subreddit: &str,
        topic: &str,
    ) -> Result<UpdateCheckResult, CoreError> {
        let request_start = Instant::now();
        let subreddit = validate_input_string(subreddit, "subreddit")?;
        let topic = validate_input_string(topic, "topic")?;
        let check_time = Utc::now();

        info!("Starting update check for r/{} topic '{}'", subreddit, topic);

        let latest_check_run = {
            let _timer = self.monitor.measure_time("load_latest_check_run");
            self.storage.get_latest_check_run(&subreddit, &topic).await?
        };
        let is_first_check = latest_check_run.is_none();
        let last_check_time = latest_check_run.map(|run| run.timestamp);

        let current_posts = {
            let _timer = self.monitor.measure_time("fetch_relevant_posts");
            self.source.get_relevant_posts(&subreddit).await?
        };

        let check_run_id = self.storage.create_check_run(&subreddit, &topic).await?;

        let detection = {
            let _timer = self.monitor.measure_time("detect_changes");
            self.engine
                .detect_changes(&current_posts, last_check_time)
                .await?
        };

        // Persistence failure is fatal to the request; the snapshot batch
        // commits atomically or not at all.
        {
            let _timer = self.monitor.measure_time("persist_snapshots");
            self.storage
                .save_snapshots(&current_posts, check_run_id)
                .await?;
            self.monitor.record_database_query(None);
        }

        self.storage
            .update_check_run_counters(
                check_run_id,
                current_posts.len() as i64,
                detection.new_posts.len() as i64,
            )
            .await?;

        let summary = self
            .build_summary(&subreddit, is_first_check, &detection, &current_posts)
            .await;

        let result = UpdateCheckResult {
            subreddit: subreddit.clone(),
            topic: topic.clone(),
            check_time,
            last_check_time,
            new_posts: detection.new_posts,
            updated_posts: detection.updated_posts,
            summary,
            total_posts_found: current_posts.len(),
            is_first_check,
            check_run_id,
        };

        self.cache
            .set_check_run_results(&subreddit, &topic, &result)
            .await;
        self.cache.invalidate_subreddit(&subreddit).await;

        let elapsed_ms = request_start.elapsed().as_secs_f64() * 1000.0;
        self.monitor.record_request(elapsed_ms);

        info!(
            "Update check for r/{} completed in {:.0}ms: {} new, {} updated",
            subreddit,
            elapsed_ms,
            result.new_posts.len(),
            result.updated_posts.len()
        );

        Ok(result)
    }

    /// The most recent cached result for a pair, if one is still live in the
    /// tiered cache.
    pub async fn cached_result(
        &self,
        subreddit: &str,
        topic: &str,
    ) -> Option<UpdateCheckResult> {
        let hit = self.cache.get_check_run_results(subreddit, topic).await;
        self.monitor.record_cache_operation(hit.is_some());
        hit
    }

    /// Free-text summary for the check: counts plus, when something new
    /// appeared, an LLM digest of the most engaged new post. Summarization
    /// and scraping degrade to sentinels rather than failing the check.
    async fn build_summary(
        &self,
        subreddit: &str,
        is_first_check: bool,
        detection: &redlens_core::ChangeDetectionResult,
        current_posts: &[Post],
    ) -> String {
        let mut summary = if is_first_check {
            format!(
                "First check for r/{}: {} posts found, all classified as new.",
                subreddit,
                current_posts.len()
            )
        } else {
            format!(
                "{} new and {} updated posts out of {} fetched from r/{}.",
                detection.new_posts.len(),
                detection.updated_posts.len(),
                current_posts.len(),
                subreddit
            )
        };

        let top_new = detection
            .new_posts
            .iter()
            .max_by_key(|update| update.current_comments);
        let Some(top_new) = top_new else {
            return summary;
        };
        let Some(post) = current_posts.iter().find(|p| p.id == top_new.post_id) else {
            return summary;
        };

        let _timer = self.monitor.measure_time("summarize_highlight");
        let content = if post.is_self {
            post.selftext.clone()
        } else {
            self.scraper.scrape(&post.url).await
        };
        let digest = self.summarizer.summarize(&content, SummaryKind::Post).await;
        summary.push_str(&format!(" Highlight \"{}\": {}", post.title, digest));
        summary
    }

    /// Periodic cache maintenance; safe to call from a background schedule.
    pub fn sweep_cache(&self) -> usize {
        let removed = self.cache.cleanup_expired();
        if removed > 0 {
            warn!("Swept {} expired cache entries", removed);
        }
        removed
    }
}
