//! Comment service
//!
//! A comment is always addressed through its post: lookups for editing or
//! deleting require both ids to match, so a URL naming the wrong post never
//! reaches another post's comment.

use crate::db::repositories::CommentRepository;
use crate::models::{Comment, CommentWithAuthor};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment {comment_id} not found on post {post_id}")]
    NotFound { post_id: i64, comment_id: i64 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>) -> Self {
        Self { repo }
    }

    /// Add a comment; the caller has already resolved the post for the author
    pub async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, CommentServiceError> {
        let text = validate_text(text)?;
        let comment = self
            .repo
            .create(post_id, author_id, text)
            .await
            .context("Failed to create comment")?;

        tracing::info!(comment_id = comment.id, post_id, author_id, "Comment created");
        Ok(comment)
    }

    /// Resolve `comment_id` only if it belongs to `post_id`
    pub async fn get_for_post(
        &self,
        post_id: i64,
        comment_id: i64,
    ) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_for_post(post_id, comment_id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound {
                post_id,
                comment_id,
            })
    }

    pub async fn list_for_post(
        &self,
        post_id: i64,
    ) -> Result<Vec<CommentWithAuthor>, CommentServiceError> {
        let comments = self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to list comments")?;

        Ok(comments)
    }

    pub async fn update_text(
        &self,
        comment: &Comment,
        text: &str,
    ) -> Result<Comment, CommentServiceError> {
        let text = validate_text(text)?;
        self.repo
            .update_text(comment.id, text)
            .await
            .context("Failed to update comment")?;

        tracing::info!(comment_id = comment.id, "Comment updated");
        Ok(Comment {
            text: text.to_string(),
            ..comment.clone()
        })
    }

    pub async fn delete(&self, comment: &Comment) -> Result<(), CommentServiceError> {
        self.repo
            .delete(comment.id)
            .await
            .context("Failed to delete comment")?;

        tracing::info!(comment_id = comment.id, post_id = comment.post_id, "Comment deleted");
        Ok(())
    }
}

fn validate_text(text: &str) -> Result<&str, CommentServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommentServiceError::ValidationError(
            "Comment text cannot be empty".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{migrated_pool, seed_post, seed_user, PostSeed};
    use crate::db::repositories::SqlxCommentRepository;

    #[tokio::test]
    async fn test_comment_must_match_post() {
        let pool = migrated_pool().await;
        let author = seed_user(&pool, "author").await;
        let post = seed_post(&pool, PostSeed::by(author.id)).await;
        let other = seed_post(&pool, PostSeed::by(author.id)).await;
        let service = CommentService::new(SqlxCommentRepository::boxed(pool));

        let comment = service.create(post.id, author.id, "Hello").await.unwrap();

        assert_eq!(service.get_for_post(post.id, comment.id).await.unwrap().id, comment.id);
        assert!(matches!(
            service.get_for_post(other.id, comment.id).await,
            Err(CommentServiceError::NotFound { post_id, comment_id })
                if post_id == other.id && comment_id == comment.id
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let pool = migrated_pool().await;
        let author = seed_user(&pool, "author").await;
        let post = seed_post(&pool, PostSeed::by(author.id)).await;
        let service = CommentService::new(SqlxCommentRepository::boxed(pool));

        assert!(matches!(
            service.create(post.id, author.id, "  \n").await,
            Err(CommentServiceError::ValidationError(_))
        ));
        assert!(service.list_for_post(post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let pool = migrated_pool().await;
        let author = seed_user(&pool, "author").await;
        let post = seed_post(&pool, PostSeed::by(author.id)).await;
        let service = CommentService::new(SqlxCommentRepository::boxed(pool));

        let comment = service.create(post.id, author.id, "frist").await.unwrap();
        let edited = service.update_text(&comment, " first ").await.unwrap();
        assert_eq!(edited.text, "first");
        assert_eq!(
            service.get_for_post(post.id, comment.id).await.unwrap().text,
            "first"
        );

        service.delete(&edited).await.unwrap();
        assert!(service.list_for_post(post.id).await.unwrap().is_empty());
    }
}
