//! End-to-end update-check workflow against in-memory storage with fake
//! collaborators for the content source, summarizer, and scraper.

use async_trait::async_trait;
use caching::TieredCache;
use chrono::Utc;
use db_pool::DatabasePool;
use engine::UpdateCheckService;
use monitoring::PerformanceMonitor;
use redlens_core::{
    CacheConfig, Comment, ContentSource, CoreError, DatabaseConfig, MonitoringConfig, Post,
    RedditConfig, Scrape, Subreddit, Summarize, SummaryKind,
};
use std::sync::Arc;
use storage::StorageService;
use tokio::sync::Mutex;

struct ScriptedSource {
    batches: Mutex<Vec<Vec<Post>>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<Post>>) -> Self {
        Self {
            batches: Mutex::new(batches),
        }
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn search_subreddits(
        &self,
        _topic: &str,
        _limit: u32,
    ) -> Result<Vec<Subreddit>, CoreError> {
        Ok(vec![Subreddit {
            name: "python".to_string(),
            title: "Python".to_string(),
            description: "All things Python".to_string(),
            subscribers: Some(1_000_000),
        }])
    }

    async fn get_hot_posts(&self, _subreddit: &str, _limit: u32) -> Result<Vec<Post>, CoreError> {
        Ok(vec![])
    }

    async fn get_relevant_posts(&self, _subreddit: &str) -> Result<Vec<Post>, CoreError> {
        let mut batches = self.batches.lock().await;
        if batches.is_empty() {
            Ok(vec![])
        } else {
            Ok(batches.remove(0))
        }
    }

    async fn get_top_comments(
        &self,
        _post_id: &str,
        _limit: u32,
    ) -> Result<Vec<Comment>, CoreError> {
        Ok(vec![])
    }
}

struct FakeSummarizer;

#[async_trait]
impl Summarize for FakeSummarizer {
    async fn summarize(&self, _content: &str, _kind: SummaryKind) -> String {
        "canned summary".to_string()
    }
}

struct FakeScraper;

#[async_trait]
impl Scrape for FakeScraper {
    async fn scrape(&self, _url: &str) -> String {
        "scraped article text".to_string()
    }
}

fn post(id: &str, score: i64, num_comments: i64) -> Post {
    Post {
        id: id.to_string(),
        subreddit: "python".to_string(),
        title: format!("Post {}", id),
        author: Some("author".to_string()),
        url: format!("https://example.com/{}", id),
        permalink: format!("/r/python/comments/{}", id),
        selftext: "self text".to_string(),
        score,
        num_comments,
        created_utc: Utc::now(),
        is_self: true,
        over_18: false,
        spoiler: false,
        stickied: false,
    }
}

async fn service_with_batches(
    batches: Vec<Vec<Post>>,
) -> (UpdateCheckService, Arc<StorageService>) {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        pool_size: 1,
        max_overflow: 0,
        ..DatabaseConfig::default()
    };
    let pool = Arc::new(DatabasePool::connect(config, None).await.unwrap());
    let storage = Arc::new(StorageService::new(pool));
    storage.migrate().await.unwrap();

    let cache = Arc::new(TieredCache::new(CacheConfig::default(), None));
    let monitor = Arc::new(PerformanceMonitor::new(MonitoringConfig::default()));

    let service = UpdateCheckService::new(
        Arc::new(ScriptedSource::new(batches)),
        Arc::new(FakeSummarizer),
        Arc::new(FakeScraper),
        Arc::clone(&storage),
        cache,
        monitor,
        RedditConfig::default(),
    );

    (service, storage)
}

#[tokio::test]
async fn two_run_scenario_classifies_new_and_updated_posts() {
    let (service, storage) = service_with_batches(vec![
        vec![post("p1", 10, 2)],
        vec![post("p1", 12, 2), post("p2", 5, 0)],
    ])
    .await;

    // Check run 1: no prior state, everything is new.
    let first = service.check_updates("python", "ai").await.unwrap();
    assert!(first.is_first_check);
    assert_eq!(first.total_posts_found, 1);
    assert_eq!(first.new_posts.len(), 1);
    assert_eq!(first.new_posts[0].post_id, "p1");
    assert!(first.updated_posts.is_empty());
    assert!(first.last_check_time.is_none());

    // Check run 2: p1 gained score, p2 is brand new.
    let second = service.check_updates("python", "ai").await.unwrap();
    assert!(!second.is_first_check);
    assert!(second.last_check_time.is_some());
    assert!(second.check_run_id > first.check_run_id);
    assert_eq!(second.total_posts_found, 2);

    assert_eq!(second.new_posts.len(), 1);
    assert_eq!(second.new_posts[0].post_id, "p2");

    assert_eq!(second.updated_posts.len(), 1);
    let updated = &second.updated_posts[0];
    assert_eq!(updated.post_id, "p1");
    let delta = updated.engagement_delta.as_ref().unwrap();
    assert_eq!(delta.score_delta, 2);
    assert_eq!(delta.comments_delta, 0);

    // Counters were persisted on both runs.
    let run1 = storage.get_check_run(first.check_run_id).await.unwrap().unwrap();
    assert_eq!(run1.posts_found, 1);
    assert_eq!(run1.new_posts, 1);
    let run2 = storage.get_check_run(second.check_run_id).await.unwrap().unwrap();
    assert_eq!(run2.posts_found, 2);
    assert_eq!(run2.new_posts, 1);

    // Snapshots are append-only: both runs kept their own rows.
    assert_eq!(
        storage
            .get_snapshots_for_check_run(first.check_run_id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        storage
            .get_snapshots_for_check_run(second.check_run_id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn result_is_cached_after_a_check() {
    let (service, _storage) = service_with_batches(vec![vec![post("p1", 10, 2)]]).await;

    assert!(service.cached_result("python", "ai").await.is_none());

    let result = service.check_updates("python", "ai").await.unwrap();

    let cached = service.cached_result("python", "ai").await.unwrap();
    assert_eq!(cached.check_run_id, result.check_run_id);
    assert_eq!(cached.new_posts.len(), 1);
}

#[tokio::test]
async fn summary_mentions_the_new_post_highlight() {
    let (service, _storage) = service_with_batches(vec![vec![post("p1", 10, 2)]]).await;

    let result = service.check_updates("python", "ai").await.unwrap();
    assert!(result.summary.contains("First check for r/python"));
    assert!(result.summary.contains("canned summary"));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_io() {
    let (service, storage) = service_with_batches(vec![]).await;

    let err = service.check_updates("python'; DROP--", "ai").await;
    assert!(matches!(err, Err(CoreError::InvalidInput { .. })));

    // Nothing was written.
    assert!(storage
        .get_latest_check_run("python'; DROP--", "ai")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn discover_subreddits_returns_ranked_candidates() {
    let (service, _storage) = service_with_batches(vec![]).await;

    let ranked = service.discover_subreddits("python").await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].name, "python");
}
