//! Authorship policy for post and comment mutations
//!
//! Edit and delete handlers call these on both the form (GET) and the
//! submission (POST). Login is enforced before any of this runs, so an
//! anonymous requester never learns whether the target exists.

use crate::api::error::PageError;
use crate::api::middleware::AppState;
use crate::models::{Comment, Post, User};

/// Permit the action only for the author; everyone else goes back to the post
pub fn ensure_author(requester: &User, author_id: i64, post_id: i64) -> Result<(), PageError> {
    if requester.id == author_id {
        return Ok(());
    }

    tracing::debug!(
        user_id = requester.id,
        author_id,
        post_id,
        "Mutation denied to non-author"
    );
    Err(PageError::PermissionDenied { post_id })
}

/// Resolve a post the requester is about to change
pub async fn authorize_post(
    state: &AppState,
    requester: &User,
    post_id: i64,
) -> Result<Post, PageError> {
    let post = state
        .post_service
        .get_by_id(post_id)
        .await?
        .ok_or(PageError::NotFound)?;

    ensure_author(requester, post.author_id, post.id)?;
    Ok(post)
}

/// Resolve a comment through its post, then check its authorship
pub async fn authorize_comment(
    state: &AppState,
    requester: &User,
    post_id: i64,
    comment_id: i64,
) -> Result<Comment, PageError> {
    let comment = state
        .comment_service
        .get_for_post(post_id, comment_id)
        .await?;

    ensure_author(requester, comment.author_id, comment.post_id)?;
    Ok(comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user(id: i64) -> User {
        let mut user = User::new(
            format!("user{}", id),
            format!("user{}@example.com", id),
            String::new(),
            String::new(),
            "hash".to_string(),
            UserRole::Author,
        );
        user.id = id;
        user
    }

    #[test]
    fn test_author_is_permitted() {
        assert!(ensure_author(&user(1), 1, 10).is_ok());
    }

    #[test]
    fn test_non_author_is_sent_to_post() {
        assert!(matches!(
            ensure_author(&user(2), 1, 10),
            Err(PageError::PermissionDenied { post_id: 10 })
        ));
    }
}
