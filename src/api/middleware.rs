//! Request middleware and shared state
//!
//! - `auth_context` resolves the session cookie once per request and stores
//!   the result as [`CurrentUser`] in the request extensions
//! - `login_required` guards the page routes that mutate content
//! - `require_auth` / `require_admin` guard the JSON administration API
//! - `csrf_guard` rejects unsafe requests coming from another site

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::api::error::PageError;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxLocationRepository, SqlxPostRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CategoryService, CommentService, LocationService, MediaStorage, PostService, UserService,
};
use crate::theme::ThemeEngine;

/// Name of the cookie holding the session token
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub comment_service: Arc<CommentService>,
    pub category_service: Arc<CategoryService>,
    pub location_service: Arc<LocationService>,
    pub media: Arc<MediaStorage>,
    pub theme_engine: Arc<ThemeEngine>,
}

impl AppState {
    /// Wire repositories and services over `pool` and load the templates.
    /// Fails on a configuration that does not pass [`Config::validate`].
    pub fn new(pool: DynDatabasePool, config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let theme_engine = ThemeEngine::new(config.templates.override_path.as_deref())?;

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let location_repo = SqlxLocationRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool);

        let user_service = UserService::with_session_expiration(
            user_repo,
            session_repo,
            config.site.session_days,
        );
        let post_service =
            PostService::new(post_repo, category_repo.clone(), location_repo.clone());

        Ok(Self {
            user_service: Arc::new(user_service),
            post_service: Arc::new(post_service),
            comment_service: Arc::new(CommentService::new(comment_repo)),
            category_service: Arc::new(CategoryService::new(category_repo)),
            location_service: Arc::new(LocationService::new(location_repo)),
            media: Arc::new(MediaStorage::new(config.media.clone())),
            theme_engine: Arc::new(theme_engine),
            config: Arc::new(config),
        })
    }
}

/// The requester as resolved from the session cookie; `None` when anonymous
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// A requester that must be logged in.
///
/// Anonymous requests are rejected with a redirect to the login page that
/// returns to the requested path afterwards.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        match parts.extensions.get::<CurrentUser>() {
            Some(CurrentUser(Some(user))) => Ok(AuthenticatedUser(user.clone())),
            _ => Err(PageError::Unauthenticated {
                next: requested_path(&parts.uri),
            }),
        }
    }
}

/// Path plus query string, as handed to the login page in `next`
pub fn requested_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

/// Extract session token from the `Authorization` header or the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_str) = cookie_header.to_str() else {
            continue;
        };
        for cookie in cookie_str.split(';') {
            if let Some((name, value)) = cookie.trim().split_once('=') {
                if name == SESSION_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value for a fresh session
pub fn session_cookie(token: &str, days: i64) -> Result<HeaderValue, PageError> {
    let max_age = days
        .checked_mul(24 * 60 * 60)
        .filter(|seconds| *seconds > 0)
        .ok_or_else(|| {
            PageError::Internal(anyhow::anyhow!("Session lifetime out of range: {} days", days))
        })?;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    );
    HeaderValue::from_str(&cookie)
        .map_err(|e| PageError::Internal(anyhow::anyhow!("Invalid session cookie: {}", e)))
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Resolve the requester for every request
pub async fn auth_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut user = None;
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(found) => user = found,
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Redirect anonymous requests to the login page
pub async fn login_required(request: Request, next: Next) -> Result<Response, PageError> {
    let signed_in = matches!(
        request.extensions().get::<CurrentUser>(),
        Some(CurrentUser(Some(_)))
    );
    if !signed_in {
        return Err(PageError::Unauthenticated {
            next: requested_path(request.uri()),
        });
    }

    Ok(next.run(request).await)
}

/// Authentication middleware for the JSON API
pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user = match request.extensions().get::<CurrentUser>() {
        Some(CurrentUser(Some(user))) => user.clone(),
        _ => return Err(ApiError::unauthorized("Authentication required")),
    };

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        tracing::debug!(user_id = user.0.id, "Admin API denied");
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Reject unsafe requests sent by another site.
///
/// Origins listed in `server.cors_origins` are trusted.
pub async fn csrf_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, PageError> {
    if is_unsafe(request.method())
        && is_cross_site(request.headers(), &state.config.server.cors_origins)
    {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Cross-site request rejected"
        );
        return Err(PageError::Csrf);
    }

    Ok(next.run(request).await)
}

fn is_unsafe(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

fn is_cross_site(headers: &HeaderMap, trusted_origins: &[String]) -> bool {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());

    if let Some(origin) = origin {
        if trusted_origins.iter().any(|trusted| trusted == origin) {
            return false;
        }
    }

    let fetch_site = headers.get("sec-fetch-site").and_then(|v| v.to_str().ok());
    if fetch_site.map_or(false, |site| site.eq_ignore_ascii_case("cross-site")) {
        return true;
    }

    match origin {
        Some(origin) => {
            let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
            match (origin_authority(origin), host) {
                (Some(authority), Some(host)) => !authority.eq_ignore_ascii_case(host),
                _ => true,
            }
        }
        None => false,
    }
}

/// `host[:port]` part of an `Origin` header; `None` for `null` or malformed values
fn origin_authority(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split('/').next()?;
    (!authority.is_empty()).then_some(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[("cookie", "theme=dark; session=abc-123")]);
        assert_eq!(extract_session_token(&map), Some("abc-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            ("authorization", "Bearer bearer-token"),
            ("cookie", "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_ignores_similar_names() {
        assert!(extract_session_token(&headers(&[("cookie", "xsession=abc")])).is_none());
        assert!(extract_session_token(&headers(&[("cookie", "session=")])).is_none());
        assert!(extract_session_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_session_cookie_format() {
        let cookie = session_cookie("tok", 7).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800"
        );
        assert!(clear_session_cookie().to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_session_cookie_rejects_out_of_range_lifetime() {
        assert!(matches!(
            session_cookie("tok", i64::MAX),
            Err(PageError::Internal(_))
        ));
        assert!(session_cookie("tok", 0).is_err());
        let longest = session_cookie("tok", crate::config::MAX_SESSION_DAYS).unwrap();
        assert!(longest.to_str().unwrap().ends_with("Max-Age=315360000"));
    }

    #[test]
    fn test_cross_site_detection() {
        let same = headers(&[("origin", "http://localhost:8000"), ("host", "localhost:8000")]);
        assert!(!is_cross_site(&same, &[]));

        let other = headers(&[("origin", "http://evil.example"), ("host", "localhost:8000")]);
        assert!(is_cross_site(&other, &[]));
        assert!(!is_cross_site(&other, &["http://evil.example".to_string()]));

        let null_origin = headers(&[("origin", "null"), ("host", "localhost")]);
        assert!(is_cross_site(&null_origin, &[]));

        let fetch = headers(&[("sec-fetch-site", "cross-site")]);
        assert!(is_cross_site(&fetch, &[]));

        let same_site = headers(&[("sec-fetch-site", "same-origin")]);
        assert!(!is_cross_site(&same_site, &[]));

        assert!(!is_cross_site(&HeaderMap::new(), &[]));
    }

    #[test]
    fn test_unsafe_methods() {
        assert!(is_unsafe(&Method::POST));
        assert!(is_unsafe(&Method::DELETE));
        assert!(!is_unsafe(&Method::GET));
        assert!(!is_unsafe(&Method::HEAD));
    }

    #[test]
    fn test_requested_path_keeps_query() {
        let uri: Uri = "/posts/3/edit/?page=2".parse().unwrap();
        assert_eq!(requested_path(&uri), "/posts/3/edit/?page=2");
    }

    #[test]
    fn test_api_error_codes() {
        assert_eq!(
            ApiError::conflict("dup").into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::validation_error("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::internal_error("boom").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
