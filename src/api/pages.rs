//! Static pages
//!
//! - GET /pages/about/
//! - GET /pages/rules/

use axum::{extract::State, response::Html};
use tera::Context as TeraContext;

use crate::api::common::Viewer;
use crate::api::error::PageError;
use crate::api::middleware::AppState;

pub async fn about(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Html<String>, PageError> {
    viewer.render(&state, "pages/about.html", &TeraContext::new())
}

pub async fn rules(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Html<String>, PageError> {
    viewer.render(&state, "pages/rules.html", &TeraContext::new())
}
