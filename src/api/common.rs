//! Shared page utilities: the requester view, rendering, pagination and
//! path parameters.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    response::Html,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::Infallible;
use tera::Context as TeraContext;

use crate::api::error::PageError;
use crate::api::middleware::{AppState, CurrentUser};
use crate::models::{ListParams, PagedResult, User};
use crate::theme::StandardTemplateVars;

/// Who is asking, and for which path.
///
/// Every page handler takes a `Viewer` so that the rendered page knows the
/// logged-in user and the path its forms post back to.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: Option<User>,
    pub path: String,
}

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether the requester is the user with `user_id`
    pub fn is(&self, user_id: i64) -> bool {
        self.user.as_ref().map_or(false, |u| u.id == user_id)
    }

    /// Render `template` with the standard variables for this requester
    pub fn render(
        &self,
        state: &AppState,
        template: &str,
        context: &TeraContext,
    ) -> Result<Html<String>, PageError> {
        let vars = StandardTemplateVars::new(state.config.site.name.clone(), self.path.clone())
            .with_user(self.user());
        let html = state
            .theme_engine
            .render_with_standard_vars(template, context, &vars)?;
        Ok(Html(html))
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(Self {
            user,
            path: parts.uri.path().to_string(),
        })
    }
}

/// A path parameter; anything that does not parse (a non-numeric id, say)
/// is a 404 rather than a 400.
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ValidPath(value)),
            Err(rejection) => {
                tracing::debug!("Rejected path parameters: {}", rejection);
                Err(PageError::NotFound)
            }
        }
    }
}

/// `?page=N` on the listing pages
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

impl PageQuery {
    /// Listing parameters for the requested page; a page that is not a
    /// positive integer does not exist
    pub fn list_params(&self, per_page: u32) -> Result<ListParams, PageError> {
        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<u32>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(PageError::NotFound),
            },
        };
        Ok(ListParams::new(page, per_page))
    }
}

/// Pages past the last one are not found; page 1 of an empty listing is fine
pub fn ensure_page_exists<T>(page: &PagedResult<T>) -> Result<(), PageError> {
    if page.page > 1 && page.is_empty() {
        return Err(PageError::NotFound);
    }
    Ok(())
}

/// Paginator links as the templates see them
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    pub page: u32,
    pub total_pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: u32,
    pub next_page: u32,
}

impl<T> From<&PagedResult<T>> for Paginator {
    fn from(result: &PagedResult<T>) -> Self {
        Self {
            page: result.page,
            total_pages: result.total_pages(),
            has_prev: result.has_prev(),
            has_next: result.has_next(),
            prev_page: result.page.saturating_sub(1),
            next_page: result.page + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
        }
    }

    #[test]
    fn test_page_query_parsing() {
        assert_eq!(query(None).list_params(10).unwrap().page, 1);
        assert_eq!(query(Some("")).list_params(10).unwrap().page, 1);
        assert_eq!(query(Some("3")).list_params(10).unwrap().page, 3);
        assert_eq!(query(Some("3")).list_params(10).unwrap().per_page, 10);
        assert!(matches!(
            query(Some("abc")).list_params(10),
            Err(PageError::NotFound)
        ));
        assert!(matches!(
            query(Some("0")).list_params(10),
            Err(PageError::NotFound)
        ));
        assert!(matches!(
            query(Some("-1")).list_params(10),
            Err(PageError::NotFound)
        ));
    }

    #[test]
    fn test_page_past_the_end_is_not_found() {
        let first: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::new(1, 10));
        assert!(ensure_page_exists(&first).is_ok());

        let beyond: PagedResult<i32> = PagedResult::new(vec![], 12, &ListParams::new(3, 10));
        assert!(matches!(ensure_page_exists(&beyond), Err(PageError::NotFound)));
    }

    #[test]
    fn test_paginator_from_result() {
        let result = PagedResult::new(vec![1, 2], 12, &ListParams::new(2, 5));
        let paginator = Paginator::from(&result);
        assert_eq!(paginator.total_pages, 3);
        assert!(paginator.has_prev);
        assert!(paginator.has_next);
        assert_eq!(paginator.prev_page, 1);
        assert_eq!(paginator.next_page, 3);
    }
}
