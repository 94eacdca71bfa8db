//! Post service
//!
//! Wraps the post listing query and the detail resolution rules, and
//! validates what authors submit.
//!
//! Detail resolution is two-step: the post is first looked up without any
//! visibility restriction, and only when the requester is not its author is
//! it looked up again under the public visibility rule. Owners can preview
//! drafts and scheduled posts; everyone else gets a not-found for them.

use crate::db::repositories::{CategoryRepository, LocationRepository, PostRepository};
use crate::models::{
    Annotation, ListParams, ListingOptions, PagedResult, Post, PostInput, PostScope, PostView,
    User, Visibility,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

pub const TITLE_MAX_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(i64),

    /// A submitted field is invalid
    #[error("Validation error on {field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl PostServiceError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field,
            message: message.into(),
        }
    }
}

pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    location_repo: Arc<dyn LocationRepository>,
}

impl PostService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        location_repo: Arc<dyn LocationRepository>,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            location_repo,
        }
    }

    /// One page of a listing together with the total the paginator needs
    pub async fn list(
        &self,
        scope: PostScope,
        options: ListingOptions,
        params: &ListParams,
    ) -> Result<PagedResult<PostView>, PostServiceError> {
        let now = Utc::now();
        let items = self
            .post_repo
            .list(scope, options, now, params)
            .await
            .context("Failed to list posts")?;
        let total = self
            .post_repo
            .count(scope, options.visibility, now)
            .await
            .context("Failed to count posts")?;

        Ok(PagedResult::new(items, total, params))
    }

    /// Posts on a user's profile; the owner also sees drafts and scheduled posts
    pub async fn list_for_profile(
        &self,
        profile_user: &User,
        viewer: Option<&User>,
        params: &ListParams,
    ) -> Result<PagedResult<PostView>, PostServiceError> {
        let visibility = if viewer.map(|v| v.id) == Some(profile_user.id) {
            Visibility::All
        } else {
            Visibility::PublicOnly
        };
        let options = ListingOptions::new(visibility, Annotation::WithCommentCount);

        self.list(PostScope::Author(profile_user.id), options, params)
            .await
    }

    /// Resolve a post for its detail page as seen by `viewer`.
    ///
    /// Returns `None` when the post does not exist, or when it is not publicly
    /// visible and the viewer is not its author.
    pub async fn resolve_detail(
        &self,
        id: i64,
        viewer: Option<&User>,
    ) -> Result<Option<PostView>, PostServiceError> {
        let now = Utc::now();
        let view = match self
            .post_repo
            .find_view(id, Visibility::All, now)
            .await
            .context("Failed to get post")?
        {
            Some(view) => view,
            None => return Ok(None),
        };

        if viewer.map(|v| v.id) == Some(view.post.author_id) {
            return Ok(Some(view));
        }

        let public = self
            .post_repo
            .find_view(id, Visibility::PublicOnly, now)
            .await
            .context("Failed to get post")?;

        Ok(public)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Post>, PostServiceError> {
        let post = self
            .post_repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?;

        Ok(post)
    }

    pub async fn create(&self, author_id: i64, input: PostInput) -> Result<Post, PostServiceError> {
        let input = self.validate(input).await?;
        let post = self
            .post_repo
            .create(author_id, &input)
            .await
            .context("Failed to create post")?;

        tracing::info!(post_id = post.id, author_id, "Post created");
        Ok(post)
    }

    /// Replace every editable field of an existing post
    pub async fn update(&self, id: i64, input: PostInput) -> Result<Post, PostServiceError> {
        let input = self.validate(input).await?;
        let post = self
            .post_repo
            .update(id, &input)
            .await
            .context("Failed to update post")?
            .ok_or(PostServiceError::NotFound(id))?;

        tracing::info!(post_id = id, "Post updated");
        Ok(post)
    }

    /// Delete a post with its comments, returning the deleted row so the
    /// caller can clean up its image
    pub async fn delete(&self, id: i64) -> Result<Post, PostServiceError> {
        let post = self
            .post_repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound(id))?;

        if !self
            .post_repo
            .delete(id)
            .await
            .context("Failed to delete post")?
        {
            return Err(PostServiceError::NotFound(id));
        }

        tracing::info!(post_id = id, "Post deleted");
        Ok(post)
    }

    async fn validate(&self, mut input: PostInput) -> Result<PostInput, PostServiceError> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(PostServiceError::invalid("title", "This field is required"));
        }
        if input.title.chars().count() > TITLE_MAX_LEN {
            return Err(PostServiceError::invalid(
                "title",
                format!("Title must be at most {} characters", TITLE_MAX_LEN),
            ));
        }
        if input.text.trim().is_empty() {
            return Err(PostServiceError::invalid("text", "This field is required"));
        }

        if let Some(category_id) = input.category_id {
            let exists = self
                .category_repo
                .get_by_id(category_id)
                .await
                .context("Failed to check category")?
                .is_some();
            if !exists {
                return Err(PostServiceError::invalid("category", "Select a valid category"));
            }
        }

        if let Some(location_id) = input.location_id {
            let exists = self
                .location_repo
                .get_by_id(location_id)
                .await
                .context("Failed to check location")?
                .is_some();
            if !exists {
                return Err(PostServiceError::invalid("location", "Select a valid location"));
            }
        }

        Ok(input)
    }
}
