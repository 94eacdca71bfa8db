//! HTTP layer - page handlers, the admin API and routing
//!
//! The blog is served as server-rendered pages. Paths keep their trailing
//! slash. Posts and comments can only be changed by a logged-in author; the
//! JSON API under `/admin/api` manages categories and locations for admins.

pub mod access;
pub mod admin;
pub mod auth;
pub mod comments;
pub mod common;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod profile;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use error::PageError;
pub use middleware::{ApiError, AppState};

/// Room left in a request body for the text fields next to an image
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Routes that need a logged-in user
fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/posts/create/", get(posts::create_form).post(posts::create_post))
        .route("/posts/{id}/edit/", get(posts::edit_form).post(posts::edit_post))
        .route(
            "/posts/{id}/delete/",
            get(posts::delete_form).post(posts::delete_post),
        )
        .route("/posts/{id}/comment/", post(comments::add_comment))
        .route(
            "/posts/{id}/edit_comment/{comment_id}/",
            get(comments::edit_form).post(comments::edit_comment),
        )
        .route(
            "/posts/{id}/delete_comment/{comment_id}/",
            get(comments::delete_form).post(comments::delete_comment),
        )
        .route(
            "/profile_edit/",
            get(profile::edit_form).post(profile::edit_profile),
        )
        .route_layer(axum_middleware::from_fn(middleware::login_required))
}

/// Routes anyone may visit
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(posts::index))
        .route("/category/{slug}/", get(posts::category_posts))
        .route("/profile/{username}/", get(posts::profile))
        .route("/posts/{id}/", get(posts::detail))
        .route(
            "/auth/registration/",
            get(auth::registration_form).post(auth::register),
        )
        .route("/auth/login/", get(auth::login_form).post(auth::login))
        .route("/auth/logout/", post(auth::logout))
        .route("/pages/about/", get(pages::about))
        .route("/pages/rules/", get(pages::rules))
}

/// The admin JSON API (admin role required)
fn admin_api(cors_origins: &[String]) -> Router<AppState> {
    let router = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for the admin API - only when origins are configured
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true),
    )
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .media
        .max_file_size
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .merge(public_routes())
        .merge(protected_routes())
        .nest("/admin/api", admin_api(&state.config.server.cors_origins))
        .nest_service("/media", ServeDir::new(state.media.root()))
        .fallback(error::not_found)
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            error::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_context,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
