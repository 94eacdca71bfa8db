//! Post pages
//!
//! - GET /                       - Latest visible posts
//! - GET /category/{slug}/       - Visible posts of a published category
//! - GET /profile/{username}/    - A user's posts (all of them for the owner)
//! - GET /posts/{id}/            - Post detail with comments
//! - GET/POST /posts/create/     - New post
//! - GET/POST /posts/{id}/edit/  - Edit own post
//! - GET/POST /posts/{id}/delete/ - Delete own post

use axum::{
    extract::{Multipart, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::access;
use crate::api::common::{ensure_page_exists, PageQuery, Paginator, ValidPath, Viewer};
use crate::api::error::PageError;
use crate::api::forms::{FormErrors, PostFormValues, PostSubmission};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::models::{ListingOptions, PagedResult, Post, PostScope, PostView};
use crate::services::{MediaError, PostServiceError};

/// GET / - Latest visible posts
pub async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let params = query.list_params(state.config.site.posts_per_page)?;
    let page = state
        .post_service
        .list(PostScope::All, ListingOptions::public_with_counts(), &params)
        .await?;

    render_listing(&state, &viewer, "blog/index.html", TeraContext::new(), &page)
}

/// GET /category/{slug}/ - Posts of one published category
pub async fn category_posts(
    State(state): State<AppState>,
    viewer: Viewer,
    ValidPath(slug): ValidPath<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let category = state
        .category_service
        .get_published_by_slug(&slug)
        .await?
        .ok_or(PageError::NotFound)?;

    let params = query.list_params(state.config.site.posts_per_page)?;
    let page = state
        .post_service
        .list(
            PostScope::Category(category.id),
            ListingOptions::public_with_counts(),
            &params,
        )
        .await?;

    let mut context = TeraContext::new();
    context.insert("category", &category);
    render_listing(&state, &viewer, "blog/category.html", context, &page)
}

/// GET /profile/{username}/ - A user's page
pub async fn profile(
    State(state): State<AppState>,
    viewer: Viewer,
    ValidPath(username): ValidPath<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let profile_user = state
        .user_service
        .get_by_username(&username)
        .await?
        .ok_or(PageError::NotFound)?;

    let params = query.list_params(state.config.site.posts_per_page)?;
    let page = state
        .post_service
        .list_for_profile(&profile_user, viewer.user(), &params)
        .await?;

    let mut context = TeraContext::new();
    context.insert(
        "profile",
        &json!({
            "id": profile_user.id,
            "username": profile_user.username,
            "display_name": profile_user.display_name(),
            "created_at": profile_user.created_at,
        }),
    );
    context.insert("is_owner", &viewer.is(profile_user.id));
    render_listing(&state, &viewer, "blog/profile.html", context, &page)
}

fn render_listing(
    state: &AppState,
    viewer: &Viewer,
    template: &str,
    mut context: TeraContext,
    page: &PagedResult<PostView>,
) -> Result<Html<String>, PageError> {
    ensure_page_exists(page)?;
    context.insert("page", page);
    context.insert("paginator", &Paginator::from(page));
    viewer.render(state, template, &context)
}

/// GET /posts/{id}/ - Post detail.
///
/// Authors see their own drafts and scheduled posts; everyone else gets a
/// 404 for anything not publicly visible.
pub async fn detail(
    State(state): State<AppState>,
    viewer: Viewer,
    ValidPath(id): ValidPath<i64>,
) -> Result<Html<String>, PageError> {
    let post = state
        .post_service
        .resolve_detail(id, viewer.user())
        .await?
        .ok_or(PageError::NotFound)?;
    let comments = state.comment_service.list_for_post(id).await?;

    let errors = FormErrors::default();
    let values = json!({ "text": "" });

    let mut context = TeraContext::new();
    context.insert("is_owner", &viewer.is(post.post.author_id));
    context.insert("post", &post);
    context.insert("comments", &comments);
    context.insert("form", &errors.view(&values));
    viewer.render(&state, "blog/detail.html", &context)
}

/// GET /posts/create/
pub async fn create_form(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    viewer: Viewer,
) -> Result<Html<String>, PageError> {
    render_post_form(
        &state,
        &viewer,
        "create",
        &PostFormValues::blank(),
        &FormErrors::default(),
    )
    .await
}

/// POST /posts/create/ - On success, go to the author's profile
pub async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let submission = PostSubmission::read(multipart).await;

    match save_submission(&state, SaveTarget::Create { author_id: user.id }, submission).await? {
        Ok(_) => Ok(Redirect::to(&format!(
            "/profile/{}/",
            urlencoding::encode(&user.username)
        ))
        .into_response()),
        Err(rejected) => Ok(render_post_form(
            &state,
            &viewer,
            "create",
            &rejected.values,
            &rejected.errors,
        )
        .await?
        .into_response()),
    }
}

/// GET /posts/{id}/edit/
pub async fn edit_form(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath(id): ValidPath<i64>,
) -> Result<Html<String>, PageError> {
    let post = access::authorize_post(&state, &user, id).await?;

    render_post_form(
        &state,
        &viewer,
        "edit",
        &PostFormValues::from_post(&post),
        &FormErrors::default(),
    )
    .await
}

/// POST /posts/{id}/edit/ - On success, go to the post
pub async fn edit_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath(id): ValidPath<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let post = access::authorize_post(&state, &user, id).await?;

    let mut submission = PostSubmission::read(multipart).await;
    submission.values.image = post.image.clone();

    match save_submission(&state, SaveTarget::Edit(&post), submission).await? {
        Ok(saved) => Ok(Redirect::to(&format!("/posts/{}/", saved.id)).into_response()),
        Err(rejected) => Ok(render_post_form(
            &state,
            &viewer,
            "edit",
            &rejected.values,
            &rejected.errors,
        )
        .await?
        .into_response()),
    }
}

/// GET /posts/{id}/delete/ - Confirmation page
pub async fn delete_form(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    ValidPath(id): ValidPath<i64>,
) -> Result<Html<String>, PageError> {
    let post = access::authorize_post(&state, &user, id).await?;

    let values = PostFormValues::from_post(&post);
    let errors = FormErrors::default();

    let mut context = TeraContext::new();
    context.insert("mode", "delete");
    context.insert("post_id", &post.id);
    context.insert("form", &errors.view(&values));
    viewer.render(&state, "blog/create.html", &context)
}

/// POST /posts/{id}/delete/ - Remove the post, its comments and its image
pub async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidPath(id): ValidPath<i64>,
) -> Result<Redirect, PageError> {
    let post = access::authorize_post(&state, &user, id).await?;
    let deleted = state.post_service.delete(post.id).await?;

    if let Some(image) = deleted.image {
        remove_image(&state, &image).await;
    }

    Ok(Redirect::to("/"))
}

enum SaveTarget<'a> {
    Create { author_id: i64 },
    Edit(&'a Post),
}

impl SaveTarget<'_> {
    fn current_image(&self) -> Option<String> {
        match self {
            SaveTarget::Create { .. } => None,
            SaveTarget::Edit(post) => post.image.clone(),
        }
    }
}

/// Validate and persist a submission.
///
/// The outer error is a server fault; the inner `Err` hands the submission
/// back with its field errors so the form can be shown again.
async fn save_submission(
    state: &AppState,
    target: SaveTarget<'_>,
    mut submission: PostSubmission,
) -> Result<Result<Post, PostSubmission>, PageError> {
    let pub_date = submission.pub_date();
    let pub_date = match pub_date {
        Some(pub_date) if submission.errors.is_empty() => pub_date,
        _ => return Ok(Err(submission)),
    };

    let previous_image = target.current_image();
    let mut stored_image = None;
    if let Some(upload) = submission.upload.take() {
        match state
            .media
            .store_post_image(&upload.content_type, &upload.data)
            .await
        {
            Ok(path) => stored_image = Some(path),
            Err(MediaError::InternalError(e)) => return Err(PageError::Internal(e)),
            Err(e) => {
                submission.errors.add("image", e.to_string());
                return Ok(Err(submission));
            }
        }
    }

    let image = match (&stored_image, submission.clear_image) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => None,
        (None, false) => previous_image.clone(),
    };
    let input = submission.values.to_input(pub_date, image.clone());

    let result = match target {
        SaveTarget::Create { author_id } => state.post_service.create(author_id, input).await,
        SaveTarget::Edit(post) => state.post_service.update(post.id, input).await,
    };

    match result {
        Ok(post) => {
            if let Some(old) = previous_image {
                if image.as_deref() != Some(old.as_str()) {
                    remove_image(state, &old).await;
                }
            }
            Ok(Ok(post))
        }
        Err(e) => {
            if let Some(path) = &stored_image {
                remove_image(state, path).await;
            }
            match e {
                PostServiceError::ValidationError { field, message } => {
                    submission.errors.add(field, message);
                    Ok(Err(submission))
                }
                other => Err(other.into()),
            }
        }
    }
}

/// Image files are not worth failing a request over once the row is saved
async fn remove_image(state: &AppState, path: &str) {
    if let Err(e) = state.media.remove(path).await {
        tracing::warn!(image = %path, "Failed to remove image: {}", e);
    }
}

async fn render_post_form(
    state: &AppState,
    viewer: &Viewer,
    mode: &str,
    values: &PostFormValues,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let categories = state.category_service.list().await?;
    let locations = state.location_service.list().await?;

    let mut context = TeraContext::new();
    context.insert("mode", mode);
    context.insert("form", &errors.view(values));
    context.insert("categories", &categories);
    context.insert("locations", &locations);
    viewer.render(state, "blog/create.html", &context)
}
