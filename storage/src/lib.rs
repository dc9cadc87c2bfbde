//! Persistence for check runs and post snapshots over SQLite.
//!
//! Check-run identifiers are assigned monotonically by the database.
//! Snapshots are append-only: a post observed in a later check run becomes a
//! new row, never an in-place update, so engagement history is preserved.

pub mod models;

pub use models::{CheckRunPage, CheckRunRecord, PostSnapshot, SubredditStats, TrendingPost};

use chrono::{DateTime, Duration, Utc};
use db_pool::DatabasePool;
use redlens_core::{CheckRun, CoreError, DatabaseError, Post};
use sqlx::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS check_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subreddit TEXT NOT NULL,
        topic TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        posts_found INTEGER NOT NULL DEFAULT 0,
        new_posts INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_check_runs_pair
        ON check_runs (subreddit, topic, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id TEXT NOT NULL,
        subreddit TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT,
        url TEXT NOT NULL,
        permalink TEXT NOT NULL,
        selftext TEXT NOT NULL DEFAULT '',
        score INTEGER NOT NULL DEFAULT 0,
        num_comments INTEGER NOT NULL DEFAULT 0,
        created_utc TEXT NOT NULL,
        is_self INTEGER NOT NULL DEFAULT 0,
        over_18 INTEGER NOT NULL DEFAULT 0,
        spoiler INTEGER NOT NULL DEFAULT 0,
        stickied INTEGER NOT NULL DEFAULT 0,
        check_run_id INTEGER NOT NULL REFERENCES check_runs (id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_post_snapshots_post
        ON post_snapshots (post_id, check_run_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_post_snapshots_subreddit
        ON post_snapshots (subreddit, created_utc)
    "#,
];

pub struct StorageService {
    pool: Arc<DatabasePool>,
}

impl StorageService {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist. Runs at startup.
    pub async fn migrate(&self) -> Result<(), CoreError> {
        let mut session = self.pool.get_session().await?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *session.connection())
                .await
                .map_err(|e| {
                    CoreError::Database(DatabaseError::MigrationFailed {
                        reason: e.to_string(),
                    })
                })?;
        }
        info!("Database schema ready");
        Ok(())
    }

    /// Insert a new check run and return its monotonic identifier.
    pub async fn create_check_run(&self, subreddit: &str, topic: &str) -> Result<i64, CoreError> {
        let mut session = self.pool.get_session().await?;
        let result = sqlx::query(
            "INSERT INTO check_runs (subreddit, topic, timestamp, posts_found, new_posts) \
             VALUES (?, ?, ?, 0, 0)",
        )
        .bind(subreddit)
        .bind(topic)
        .bind(Utc::now())
        .execute(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        let id = result.last_insert_rowid();
        info!(
            "Created check run {} for subreddit '{}' with topic '{}'",
            id, subreddit, topic
        );
        Ok(id)
    }

    pub async fn get_check_run(&self, check_run_id: i64) -> Result<Option<CheckRun>, CoreError> {
        let mut session = self.pool.get_session().await?;
        let record = sqlx::query_as::<_, CheckRunRecord>(
            "SELECT id, subreddit, topic, timestamp, posts_found, new_posts \
             FROM check_runs WHERE id = ?",
        )
        .bind(check_run_id)
        .fetch_optional(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(record.map(CheckRun::from))
    }

    /// The most recent check run for a subreddit/topic pair, or `None` when
    /// this pair has never been checked.
    pub async fn get_latest_check_run(
        &self,
        subreddit: &str,
        topic: &str,
    ) -> Result<Option<CheckRun>, CoreError> {
        let mut session = self.pool.get_session().await?;
        let record = sqlx::query_as::<_, CheckRunRecord>(
            "SELECT id, subreddit, topic, timestamp, posts_found, new_posts \
             FROM check_runs WHERE subreddit = ? AND topic = ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(subreddit)
        .bind(topic)
        .fetch_optional(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        match &record {
            Some(run) => debug!(
                "Found latest check run {} for r/{} topic '{}'",
                run.id, subreddit, topic
            ),
            None => debug!("No check runs found for r/{} topic '{}'", subreddit, topic),
        }

        Ok(record.map(CheckRun::from))
    }

    pub async fn update_check_run_counters(
        &self,
        check_run_id: i64,
        posts_found: i64,
        new_posts: i64,
    ) -> Result<(), CoreError> {
        let mut session = self.pool.get_session().await?;
        let result = sqlx::query(
            "UPDATE check_runs SET posts_found = ?, new_posts = ? WHERE id = ?",
        )
        .bind(posts_found)
        .bind(new_posts)
        .bind(check_run_id)
        .execute(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        if result.rows_affected() == 0 {
            warn!("No check run {} to update counters for", check_run_id);
        }
        Ok(())
    }

    /// Persist one batch of posts as snapshot rows for a check run, all
    /// inside a single transaction. Either every row commits or none do.
    pub async fn save_snapshots(
        &self,
        posts: &[Post],
        check_run_id: i64,
    ) -> Result<u64, CoreError> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut session = self.pool.get_session().await?;
        let mut tx = session.connection().begin().await.map_err(|e| {
            CoreError::Database(DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;

        let mut saved = 0u64;
        for post in posts {
            sqlx::query(
                "INSERT INTO post_snapshots (post_id, subreddit, title, author, url, permalink, \
                 selftext, score, num_comments, created_utc, is_self, over_18, spoiler, stickied, \
                 check_run_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&post.id)
            .bind(&post.subreddit)
            .bind(&post.title)
            .bind(&post.author)
            .bind(&post.url)
            .bind(&post.permalink)
            .bind(&post.selftext)
            .bind(post.score)
            .bind(post.num_comments)
            .bind(post.created_utc)
            .bind(post.is_self)
            .bind(post.over_18)
            .bind(post.spoiler)
            .bind(post.stickied)
            .bind(check_run_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::Sql)?;
            saved += 1;
        }

        tx.commit().await.map_err(|e| {
            CoreError::Database(DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;

        info!("Saved {} snapshots for check run {}", saved, check_run_id);
        Ok(saved)
    }

    /// The most recent prior snapshot for a post id, across all check runs.
    /// Recency follows the monotonic check-run identifier.
    pub async fn latest_snapshot_for_post(
        &self,
        post_id: &str,
    ) -> Result<Option<PostSnapshot>, CoreError> {
        let mut session = self.pool.get_session().await?;
        let snapshot = sqlx::query_as::<_, PostSnapshot>(
            "SELECT * FROM post_snapshots WHERE post_id = ? \
             ORDER BY check_run_id DESC, id DESC LIMIT 1",
        )
        .bind(post_id)
        .fetch_optional(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(snapshot)
    }

    /// Latest snapshot per post id for a whole batch in one query, keyed by
    /// post id. Posts never seen before are simply absent from the map.
    pub async fn latest_snapshots_for_posts(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, PostSnapshot>, CoreError> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; post_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM post_snapshots \
             WHERE id IN (SELECT MAX(id) FROM post_snapshots WHERE post_id IN ({}) GROUP BY post_id)",
            placeholders
        );

        let mut query = sqlx::query_as::<_, PostSnapshot>(&sql);
        for post_id in post_ids {
            query = query.bind(post_id);
        }

        let mut session = self.pool.get_session().await?;
        let snapshots = query
            .fetch_all(&mut *session.connection())
            .await
            .map_err(DatabaseError::Sql)?;

        debug!(
            "Loaded {} prior snapshots for {} posts",
            snapshots.len(),
            post_ids.len()
        );

        Ok(snapshots
            .into_iter()
            .map(|snapshot| (snapshot.post_id.clone(), snapshot))
            .collect())
    }

    pub async fn get_snapshots_for_check_run(
        &self,
        check_run_id: i64,
    ) -> Result<Vec<PostSnapshot>, CoreError> {
        let mut session = self.pool.get_session().await?;
        let snapshots = sqlx::query_as::<_, PostSnapshot>(
            "SELECT * FROM post_snapshots WHERE check_run_id = ? ORDER BY id",
        )
        .bind(check_run_id)
        .fetch_all(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(snapshots)
    }

    /// Paginated check-run history for a subreddit, newest first, with
    /// optional date bounds.
    pub async fn get_check_run_history(
        &self,
        subreddit: &str,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        page: u32,
        limit: u32,
    ) -> Result<CheckRunPage, CoreError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut session = self.pool.get_session().await?;

        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM check_runs WHERE subreddit = ? \
             AND (? IS NULL OR timestamp >= ?) AND (? IS NULL OR timestamp <= ?)",
        )
        .bind(subreddit)
        .bind(start_date)
        .bind(start_date)
        .bind(end_date)
        .bind(end_date)
        .fetch_one(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        let records = sqlx::query_as::<_, CheckRunRecord>(
            "SELECT id, subreddit, topic, timestamp, posts_found, new_posts \
             FROM check_runs WHERE subreddit = ? \
             AND (? IS NULL OR timestamp >= ?) AND (? IS NULL OR timestamp <= ?) \
             ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(subreddit)
        .bind(start_date)
        .bind(start_date)
        .bind(end_date)
        .bind(end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(CheckRunPage {
            check_runs: records.into_iter().map(CheckRun::from).collect(),
            total_count,
            page,
            limit,
        })
    }

    /// Posts trending within the window, ranked by score velocity
    /// (score per hour of age). Only the latest snapshot per post counts.
    pub async fn get_trending_posts(
        &self,
        subreddit: &str,
        time_window_hours: i64,
        min_score: i64,
        limit: usize,
    ) -> Result<Vec<TrendingPost>, CoreError> {
        let cutoff = Utc::now() - Duration::hours(time_window_hours);

        let mut session = self.pool.get_session().await?;
        let snapshots = sqlx::query_as::<_, PostSnapshot>(
            "SELECT * FROM post_snapshots \
             WHERE id IN (SELECT MAX(id) FROM post_snapshots GROUP BY post_id) \
             AND subreddit = ? AND created_utc >= ? AND score >= ?",
        )
        .bind(subreddit)
        .bind(cutoff)
        .bind(min_score)
        .fetch_all(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        let now = Utc::now();
        let mut trending: Vec<TrendingPost> = snapshots
            .into_iter()
            .map(|snapshot| {
                let age_hours =
                    (now - snapshot.created_utc).num_seconds().max(0) as f64 / 3600.0;
                let trending_score = snapshot.score as f64 / age_hours.max(1.0);
                TrendingPost {
                    post_id: snapshot.post_id,
                    title: snapshot.title,
                    score: snapshot.score,
                    num_comments: snapshot.num_comments,
                    age_hours,
                    trending_score,
                }
            })
            .collect();

        trending.sort_by(|a, b| {
            b.trending_score
                .partial_cmp(&a.trending_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        trending.truncate(limit);

        debug!(
            "Found {} trending posts in r/{} over the last {}h",
            trending.len(),
            subreddit,
            time_window_hours
        );
        Ok(trending)
    }

    /// Aggregate per-subreddit statistics across all stored data.
    pub async fn get_subreddit_stats(&self, subreddit: &str) -> Result<SubredditStats, CoreError> {
        let mut session = self.pool.get_session().await?;

        let (total_check_runs, earliest_check, latest_check): (
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM check_runs WHERE subreddit = ?",
        )
        .bind(subreddit)
        .fetch_one(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        let (total_snapshots, distinct_posts, average_score, max_score): (
            i64,
            i64,
            Option<f64>,
            Option<i64>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT post_id), AVG(score), MAX(score) \
             FROM post_snapshots WHERE subreddit = ?",
        )
        .bind(subreddit)
        .fetch_one(&mut *session.connection())
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(SubredditStats {
            subreddit: subreddit.to_string(),
            total_check_runs,
            total_snapshots,
            distinct_posts,
            average_score: average_score.unwrap_or(0.0),
            max_score: max_score.unwrap_or(0),
            earliest_check,
            latest_check,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_pool::DatabasePool;
    use redlens_core::DatabaseConfig;

    async fn test_storage() -> StorageService {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let pool = Arc::new(DatabasePool::connect(config, None).await.unwrap());
        let storage = StorageService::new(pool);
        storage.migrate().await.unwrap();
        storage
    }

    fn sample_post(id: &str, score: i64, num_comments: i64) -> Post {
        Post {
            id: id.to_string(),
            subreddit: "python".to_string(),
            title: format!("Post {}", id),
            author: Some("author".to_string()),
            url: format!("https://example.com/{}", id),
            permalink: format!("/r/python/comments/{}", id),
            selftext: "body".to_string(),
            score,
            num_comments,
            created_utc: Utc::now(),
            is_self: true,
            over_18: false,
            spoiler: false,
            stickied: false,
        }
    }

    #[tokio::test]
    async fn test_check_run_ids_are_monotonic() {
        let storage = test_storage().await;

        let first = storage.create_check_run("python", "ai").await.unwrap();
        let second = storage.create_check_run("python", "ai").await.unwrap();
        let third = storage.create_check_run("rust", "web").await.unwrap();

        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_latest_check_run_is_scoped_to_pair() {
        let storage = test_storage().await;

        storage.create_check_run("python", "ai").await.unwrap();
        let latest_python = storage.create_check_run("python", "ai").await.unwrap();
        storage.create_check_run("rust", "ai").await.unwrap();

        let found = storage
            .get_latest_check_run("python", "ai")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, latest_python);

        assert!(storage
            .get_latest_check_run("python", "ml")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_check_run_counters() {
        let storage = test_storage().await;
        let id = storage.create_check_run("python", "ai").await.unwrap();

        storage.update_check_run_counters(id, 5, 2).await.unwrap();

        let run = storage.get_check_run(id).await.unwrap().unwrap();
        assert_eq!(run.posts_found, 5);
        assert_eq!(run.new_posts, 2);
    }

    #[tokio::test]
    async fn test_snapshots_are_append_only() {
        let storage = test_storage().await;

        let run1 = storage.create_check_run("python", "ai").await.unwrap();
        storage
            .save_snapshots(&[sample_post("p1", 10, 2)], run1)
            .await
            .unwrap();

        let run2 = storage.create_check_run("python", "ai").await.unwrap();
        storage
            .save_snapshots(&[sample_post("p1", 15, 3)], run2)
            .await
            .unwrap();

        // Both rows exist; the latest one wins for lookups.
        let latest = storage
            .latest_snapshot_for_post("p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.score, 15);
        assert_eq!(latest.check_run_id, run2);

        assert_eq!(
            storage.get_snapshots_for_check_run(run1).await.unwrap().len(),
            1
        );
        assert_eq!(
            storage.get_snapshots_for_check_run(run2).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_bulk_snapshot_lookup() {
        let storage = test_storage().await;
        let run = storage.create_check_run("python", "ai").await.unwrap();
        storage
            .save_snapshots(&[sample_post("p1", 10, 2), sample_post("p2", 5, 0)], run)
            .await
            .unwrap();

        let ids = vec!["p1".to_string(), "p2".to_string(), "unseen".to_string()];
        let snapshots = storage.latest_snapshots_for_posts(&ids).await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots.get("p1").unwrap().score, 10);
        assert!(!snapshots.contains_key("unseen"));
    }

    #[tokio::test]
    async fn test_check_run_history_pagination() {
        let storage = test_storage().await;
        for _ in 0..5 {
            storage.create_check_run("python", "ai").await.unwrap();
        }

        let page1 = storage
            .get_check_run_history("python", None, None, 1, 2)
            .await
            .unwrap();
        assert_eq!(page1.total_count, 5);
        assert_eq!(page1.check_runs.len(), 2);
        assert_eq!(page1.total_pages(), 3);

        let page3 = storage
            .get_check_run_history("python", None, None, 3, 2)
            .await
            .unwrap();
        assert_eq!(page3.check_runs.len(), 1);

        // Newest first
        assert!(page1.check_runs[0].id > page1.check_runs[1].id);
    }

    #[tokio::test]
    async fn test_trending_posts_ranked_by_velocity() {
        let storage = test_storage().await;
        let run = storage.create_check_run("python", "ai").await.unwrap();

        let mut old_post = sample_post("old", 100, 10);
        old_post.created_utc = Utc::now() - Duration::hours(20);
        let fresh_post = sample_post("fresh", 80, 5);
        let low_score = sample_post("low", 1, 0);

        storage
            .save_snapshots(&[old_post, fresh_post, low_score], run)
            .await
            .unwrap();

        let trending = storage
            .get_trending_posts("python", 24, 10, 10)
            .await
            .unwrap();

        assert_eq!(trending.len(), 2);
        // The fresh post has the higher score velocity.
        assert_eq!(trending[0].post_id, "fresh");
        assert_eq!(trending[1].post_id, "old");
    }

    #[tokio::test]
    async fn test_subreddit_stats() {
        let storage = test_storage().await;
        let run = storage.create_check_run("python", "ai").await.unwrap();
        storage
            .save_snapshots(&[sample_post("p1", 10, 2), sample_post("p2", 20, 4)], run)
            .await
            .unwrap();

        let stats = storage.get_subreddit_stats("python").await.unwrap();
        assert_eq!(stats.total_check_runs, 1);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.distinct_posts, 2);
        assert_eq!(stats.average_score, 15.0);
        assert_eq!(stats.max_score, 20);
        assert!(stats.earliest_check.is_some());

        let empty = storage.get_subreddit_stats("unknown").await.unwrap();
        assert_eq!(empty.total_check_runs, 0);
        assert_eq!(empty.average_score, 0.0);
        assert!(empty.earliest_check.is_none());
    }
}
