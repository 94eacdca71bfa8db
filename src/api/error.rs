//! Error handling for the HTML pages
//!
//! Handlers return [`PageError`]. Redirecting variants turn into a `303 See
//! Other`; the others produce a bare status carrying an [`ErrorPage`] marker
//! that [`render_error_pages`] replaces with the matching template, so that
//! error pages get the same navigation (current user, site name) as any
//! other page.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, CurrentUser};
use crate::models::User;
use crate::services::{
    CategoryServiceError, CommentServiceError, LocationServiceError, PostServiceError,
    UserServiceError,
};
use crate::theme::{StandardTemplateVars, ThemeEngine};

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// Missing, or hidden from the requester
    #[error("Not found")]
    NotFound,

    /// An authenticated requester tried to change someone else's content
    #[error("Permission denied on post {post_id}")]
    PermissionDenied { post_id: i64 },

    #[error("Login required for {next}")]
    Unauthenticated { next: String },

    #[error("CSRF verification failed")]
    Csrf,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Which error template replaces a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPage {
    NotFound,
    ServerError,
    CsrfFailure,
}

impl ErrorPage {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorPage::NotFound => StatusCode::NOT_FOUND,
            ErrorPage::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorPage::CsrfFailure => StatusCode::FORBIDDEN,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            ErrorPage::NotFound => "pages/404.html",
            ErrorPage::ServerError => "pages/500.html",
            ErrorPage::CsrfFailure => "pages/403csrf.html",
        }
    }

    fn fallback_text(self) -> (&'static str, &'static str) {
        match self {
            ErrorPage::NotFound => ("Page not found", "The page you are looking for does not exist."),
            ErrorPage::ServerError => ("Server error", "Something went wrong on our side."),
            ErrorPage::CsrfFailure => ("Request rejected", "Cross-site form submission rejected."),
        }
    }

    fn into_marker(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::NotFound => ErrorPage::NotFound.into_marker(),
            PageError::PermissionDenied { post_id } => {
                Redirect::to(&format!("/posts/{}/", post_id)).into_response()
            }
            PageError::Unauthenticated { next } => Redirect::to(&login_url(&next)).into_response(),
            PageError::Csrf => ErrorPage::CsrfFailure.into_marker(),
            PageError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ErrorPage::ServerError.into_marker()
            }
        }
    }
}

/// Login page that sends the user back to `next` afterwards
pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next))
}

/// Fallback for unknown routes
pub async fn not_found() -> PageError {
    PageError::NotFound
}

/// Replace marked error responses with their rendered template
pub async fn render_error_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .and_then(|current| current.0.clone());
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    match response.extensions().get::<ErrorPage>().copied() {
        Some(page) => render_error_page(&state, page, user.as_ref(), &path),
        None => response,
    }
}

fn render_error_page(
    state: &AppState,
    page: ErrorPage,
    user: Option<&User>,
    path: &str,
) -> Response {
    let vars = StandardTemplateVars::new(state.config.site.name.clone(), path).with_user(user);
    let html = state
        .theme_engine
        .render_with_standard_vars(page.template(), &TeraContext::new(), &vars)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to render {}: {:#}", page.template(), e);
            let (title, message) = page.fallback_text();
            ThemeEngine::simple_error_page(title, message)
        });

    (page.status(), Html(html)).into_response()
}

impl From<PostServiceError> for PageError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(_) => PageError::NotFound,
            PostServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<CommentServiceError> for PageError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound { .. } => PageError::NotFound,
            CommentServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<CategoryServiceError> for PageError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => PageError::NotFound,
            CategoryServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<LocationServiceError> for PageError {
    fn from(e: LocationServiceError) -> Self {
        match e {
            LocationServiceError::NotFound(_) => PageError::NotFound,
            LocationServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_not_found_is_marked() {
        let response = PageError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.extensions().get::<ErrorPage>(),
            Some(&ErrorPage::NotFound)
        );
    }

    #[test]
    fn test_permission_denied_redirects_to_post() {
        let response = PageError::PermissionDenied { post_id: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/posts/42/");
        assert!(response.extensions().get::<ErrorPage>().is_none());
    }

    #[test]
    fn test_unauthenticated_redirects_to_login_with_next() {
        let response = PageError::Unauthenticated {
            next: "/posts/1/edit/?x=1".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/auth/login/?next=%2Fposts%2F1%2Fedit%2F%3Fx%3D1"
        );
    }

    #[test]
    fn test_internal_and_csrf_statuses() {
        let internal = PageError::Internal(anyhow::anyhow!("db down")).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            internal.extensions().get::<ErrorPage>(),
            Some(&ErrorPage::ServerError)
        );

        let csrf = PageError::Csrf.into_response();
        assert_eq!(csrf.status(), StatusCode::FORBIDDEN);
        assert_eq!(csrf.extensions().get::<ErrorPage>().map(|p| p.template()), Some("pages/403csrf.html"));
    }

    #[test]
    fn test_service_errors_map_to_not_found() {
        assert!(matches!(
            PageError::from(PostServiceError::NotFound(1)),
            PageError::NotFound
        ));
        assert!(matches!(
            PageError::from(CommentServiceError::NotFound {
                post_id: 1,
                comment_id: 2
            }),
            PageError::NotFound
        ));
    }
}
