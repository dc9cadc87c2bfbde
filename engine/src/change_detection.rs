//! Classification of freshly fetched posts against prior stored state.
//!
//! A post is `new` when no snapshot of it exists yet, `updated` when any
//! prior snapshot differs in score or comment count, and silent otherwise.
//! Classification preserves the relative order of the input batch; no
//! additional sorting is imposed here.

use chrono::{DateTime, Utc};
use redlens_core::{
    ChangeDetectionResult, CoreError, EngagementDelta, Post, PostUpdate,
};
use std::sync::Arc;
use storage::{PostSnapshot, StorageService};
use tracing::{debug, info, warn};

pub struct ChangeDetectionEngine {
    storage: Arc<StorageService>,
}

impl ChangeDetectionEngine {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self { storage }
    }

    /// Classify `current_posts` against the stored snapshots.
    ///
    /// With no prior check (`last_check_time` absent) every post is new and
    /// carries no engagement delta. Otherwise a post is compared against its
    /// most recent prior snapshot by post id, across all check runs. A
    /// snapshot read failure aborts the whole check; a malformed single post
    /// is skipped and logged without failing the batch.
    pub async fn detect_changes(
        &self,
        current_posts: &[Post],
        last_check_time: Option<DateTime<Utc>>,
    ) -> Result<ChangeDetectionResult, CoreError> {
        if current_posts.is_empty() {
            return Ok(ChangeDetectionResult::default());
        }

        let now = Utc::now();

        if last_check_time.is_none() {
            let new_posts: Vec<PostUpdate> = current_posts
                .iter()
                .filter_map(|post| Self::classify_new(post, now))
                .collect();
            info!(
                "First check: classified all {} posts as new",
                new_posts.len()
            );
            return Ok(ChangeDetectionResult {
                new_posts,
                updated_posts: Vec::new(),
            });
        }

        let post_ids: Vec<String> = current_posts
            .iter()
            .filter(|post| !post.id.is_empty())
            .map(|post| post.id.clone())
            .collect();
        let prior_snapshots = self.storage.latest_snapshots_for_posts(&post_ids).await?;

        let mut new_posts = Vec::new();
        let mut updated_posts = Vec::new();

        for post in current_posts {
            if post.id.is_empty() {
                warn!("Post record missing post id, skipping");
                continue;
            }

            match prior_snapshots.get(&post.id) {
                None => {
                    if let Some(update) = Self::classify_new(post, now) {
                        debug!("Found new post: {} in r/{}", post.id, post.subreddit);
                        new_posts.push(update);
                    }
                }
                Some(snapshot) => {
                    if let Some(update) = Self::classify_updated(post, snapshot, now) {
                        updated_posts.push(update);
                    }
                }
            }
        }

        info!(
            "Change detection found {} new and {} updated posts",
            new_posts.len(),
            updated_posts.len()
        );

        Ok(ChangeDetectionResult {
            new_posts,
            updated_posts,
        })
    }

    fn classify_new(post: &Post, now: DateTime<Utc>) -> Option<PostUpdate> {
        if post.id.is_empty() {
            warn!("Post record missing post id, skipping");
            return None;
        }
        Some(PostUpdate {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            current_score: post.score,
            current_comments: post.num_comments,
            current_timestamp: now,
            is_new: true,
            engagement_delta: None,
        })
    }

    /// An update exists when score or comment count moved against the prior
    /// snapshot, whatever the snapshot's timestamp. Unchanged posts are
    /// reported in neither list.
    fn classify_updated(
        post: &Post,
        snapshot: &PostSnapshot,
        now: DateTime<Utc>,
    ) -> Option<PostUpdate> {
        let score_delta = post.score - snapshot.score;
        let comments_delta = post.num_comments - snapshot.num_comments;

        if score_delta == 0 && comments_delta == 0 {
            return None;
        }

        debug!(
            "Found updated post: {} (score {:+}, comments {:+})",
            post.id, score_delta, comments_delta
        );

        Some(PostUpdate {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            current_score: post.score,
            current_comments: post.num_comments,
            current_timestamp: now,
            is_new: false,
            engagement_delta: Some(EngagementDelta {
                score_delta,
                comments_delta,
                previous_score: snapshot.score,
                previous_comments: snapshot.num_comments,
            }),
        })
    }
}
