use anyhow::Context;
use caching::TieredCache;
use db_pool::DatabasePool;
use engine::UpdateCheckService;
use monitoring::PerformanceMonitor;
use redlens_core::AppConfig;
use reddit_client::RedditApiClient;
use scraper::ArticleScraper;
use std::sync::Arc;
use storage::StorageService;
use summarizer::SummarizerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("REDLENS_LOG").unwrap_or_else(|_| "redlens=info,engine=info".to_string()),
        )
        .init();

    tracing::info!("Starting Redlens - Reddit update tracker");

    let mut args = std::env::args().skip(1);
    let subreddit = args.next().context("usage: redlens <subreddit> <topic>")?;
    let topic = args.next().context("usage: redlens <subreddit> <topic>")?;

    let config = AppConfig::from_env()?;

    let monitor = Arc::new(PerformanceMonitor::new(config.monitoring.clone()));
    monitor.start();

    let pool = Arc::new(DatabasePool::connect(config.database.clone(), Some(Arc::clone(&monitor))).await?);
    pool.start_monitoring();

    let storage = Arc::new(StorageService::new(Arc::clone(&pool)));
    storage.migrate().await?;

    let cache = Arc::new(TieredCache::new(config.cache.clone(), None));

    let access_token = std::env::var("REDLENS_REDDIT_ACCESS_TOKEN").unwrap_or_default();
    let source = Arc::new(RedditApiClient::new(config.reddit.clone(), access_token)?);
    let summarizer = Arc::new(SummarizerService::new(config.summarizer.clone())?);
    let article_scraper = Arc::new(ArticleScraper::new(&config.scraper)?);

    let service = UpdateCheckService::new(
        source,
        summarizer,
        article_scraper,
        Arc::clone(&storage),
        cache,
        Arc::clone(&monitor),
        config.reddit.clone(),
    );

    let result = service.check_updates(&subreddit, &topic).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    let summary = monitor.performance_summary();
    tracing::info!(
        "Request complete: {} requests, avg {:.1}ms, {} db queries",
        summary.total_requests,
        summary.average_response_time_ms,
        summary.database_queries
    );

    pool.close().await;
    monitor.stop().await;

    Ok(())
}
