//! Comment pages
//!
//! - POST /posts/{id}/comment/                           - Add a comment
//! - GET/POST /posts/{id}/edit_comment/{comment_id}/     - Edit own comment
//! - GET/POST /posts/{id}/delete_comment/{comment_id}/   - Delete own comment

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::access;
use crate::api::common::{ValidPath, Viewer};
use crate::api::error::PageError;
use crate::api::forms::FormErrors;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::services::CommentServiceError;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

fn post_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

/// POST /posts/{id}/comment/
///
/// The post is resolved the same way as its detail page, so nobody can
/// comment on a post they are not allowed to see.
pub async fn add_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath(post_id): ValidPath<i64>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let post = state
        .post_service
        .resolve_detail(post_id, Some(&user))
        .await?
        .ok_or(PageError::NotFound)?;

    match state
        .comment_service
        .create(post.post.id, user.id, &form.text)
        .await
    {
        Ok(_) => Ok(Redirect::to(&post_url(post_id)).into_response()),
        Err(CommentServiceError::ValidationError(message)) => {
            let mut errors = FormErrors::default();
            errors.add("text", message);
            Ok(render_comment_form(&state, &viewer, "create", post_id, &form, &errors)?
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/edit_comment/{comment_id}/
pub async fn edit_form(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath((post_id, comment_id)): ValidPath<(i64, i64)>,
) -> Result<Html<String>, PageError> {
    let comment = access::authorize_comment(&state, &user, post_id, comment_id).await?;

    let form = CommentForm { text: comment.text };
    render_comment_form(&state, &viewer, "edit", post_id, &form, &FormErrors::default())
}

/// POST /posts/{id}/edit_comment/{comment_id}/
pub async fn edit_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath((post_id, comment_id)): ValidPath<(i64, i64)>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let comment = access::authorize_comment(&state, &user, post_id, comment_id).await?;

    match state.comment_service.update_text(&comment, &form.text).await {
        Ok(_) => Ok(Redirect::to(&post_url(post_id)).into_response()),
        Err(CommentServiceError::ValidationError(message)) => {
            let mut errors = FormErrors::default();
            errors.add("text", message);
            Ok(render_comment_form(&state, &viewer, "edit", post_id, &form, &errors)?
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/delete_comment/{comment_id}/ - Confirmation page
pub async fn delete_form(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath((post_id, comment_id)): ValidPath<(i64, i64)>,
) -> Result<Html<String>, PageError> {
    let comment = access::authorize_comment(&state, &user, post_id, comment_id).await?;

    let mut context = TeraContext::new();
    context.insert("mode", "delete");
    context.insert("post_id", &post_id);
    context.insert("comment", &comment);
    viewer.render(&state, "blog/comment.html", &context)
}

/// POST /posts/{id}/delete_comment/{comment_id}/
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidPath((post_id, comment_id)): ValidPath<(i64, i64)>,
) -> Result<Redirect, PageError> {
    let comment = access::authorize_comment(&state, &user, post_id, comment_id).await?;
    state.comment_service.delete(&comment).await?;

    Ok(Redirect::to(&post_url(post_id)))
}

fn render_comment_form(
    state: &AppState,
    viewer: &Viewer,
    mode: &str,
    post_id: i64,
    form: &CommentForm,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("mode", mode);
    context.insert("post_id", &post_id);
    context.insert("form", &errors.view(form));
    context.insert("form_action", &viewer.path);
    viewer.render(state, "blog/comment.html", &context)
}
