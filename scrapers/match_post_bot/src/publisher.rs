use std::{future::Future, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    blogger::{ApiError, BlogApi},
    retry::{RetryPolicy, Sleeper},
    types::PostRecord,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created(PostRecord),
    AlreadyExists,
    /// Rate limiting outlasted the retry budget.
    Skipped(String),
    Failed(String),
}

pub struct Publisher<A: BlogApi> {
    api: A,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<A: BlogApi> Publisher<A> {
    pub fn new(api: A, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { api, retry, sleeper }
    }

    #[cfg(test)]
    pub(crate) fn api(&self) -> &A {
        &self.api
    }

    /// Best-effort duplicate check. A failed search counts as "not found".
    pub async fn find_existing(&self, title: &str) -> Option<PostRecord> {
        match self.api.search_posts(title).await {
            Ok(posts) => posts
                .into_iter()
                .find(|post| post.title == title || post.title.contains(title)),
            Err(e) => {
                error!("Error checking if post exists for {:?}: {}", title, e);
                None
            }
        }
    }

    /// Searches for `title` and, only when nothing matches, awaits `content`
    /// and inserts the post, retrying rate-limited inserts with backoff.
    pub async fn create_post<C>(&self, title: &str, content: C) -> PublishOutcome
    where
        C: Future<Output = String>,
    {
        if let Some(existing) = self.find_existing(title).await {
            info!("Post with similar title already exists: {} ({})", title, existing.url);
            return PublishOutcome::AlreadyExists;
        }

        let content = content.await;
        info!("Creating post for: {}", title);
        let result = self
            .retry
            .run(
                self.sleeper.as_ref(),
                || self.api.insert_post(title, &content),
                ApiError::is_rate_limited,
            )
            .await;

        match result {
            Ok(post) => {
                info!("Post created: {}", post.url);
                PublishOutcome::Created(post)
            }
            Err(e) if e.is_rate_limited() => {
                warn!("Skipping {:?}: still rate limited after {} retries", title, self.retry.max_retries);
                PublishOutcome::Skipped(e.to_string())
            }
            Err(e) => {
                error!("Error creating post {:?}: {}", title, e);
                PublishOutcome::Failed(e.to_string())
            }
        }
    }

    /// Deletes a post; a post that is already gone counts as deleted.
    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        match self.api.delete_post(post_id).await {
            Err(ApiError::Status { status: 404, .. }) => {
                warn!("Post {} was already deleted", post_id);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>, ApiError> {
        self.api.get_post(post_id).await
    }
}
