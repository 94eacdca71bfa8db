//! Account pages
//!
//! - GET/POST /auth/registration/ - Sign up
//! - GET/POST /auth/login/        - Log in, then return to `next`
//! - POST /auth/logout/           - Log out

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::common::Viewer;
use crate::api::error::PageError;
use crate::api::forms::FormErrors;
use crate::api::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, AppState,
};
use crate::models::CreateUserInput;
use crate::services::UserServiceError;

/// Request body for registration
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// What the registration form shows again; passwords are never echoed
#[derive(Debug, Default, Serialize)]
struct RegistrationValues<'a> {
    username: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

impl<'a> From<&'a RegistrationForm> for RegistrationValues<'a> {
    fn from(form: &'a RegistrationForm) -> Self {
        Self {
            username: &form.username,
            email: &form.email,
            first_name: &form.first_name,
            last_name: &form.last_name,
        }
    }
}

/// GET /auth/registration/
pub async fn registration_form(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Html<String>, PageError> {
    render_registration(
        &state,
        &viewer,
        &RegistrationValues::default(),
        &FormErrors::default(),
    )
}

/// POST /auth/registration/ - On success, go to the index
pub async fn register(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, PageError> {
    let mut errors = FormErrors::default();

    if form.password1 != form.password2 {
        errors.add("password2", "The two password fields didn't match.");
    } else {
        let input = CreateUserInput {
            username: form.username.clone(),
            email: form.email.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            password: form.password1.clone(),
            role: None,
        };

        match state.user_service.register(input).await {
            Ok(_) => return Ok(Redirect::to("/").into_response()),
            Err(UserServiceError::ValidationError { field, message })
            | Err(UserServiceError::UserExists { field, message }) => {
                errors.add(registration_field(field), message);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(render_registration(&state, &viewer, &RegistrationValues::from(&form), &errors)?
        .into_response())
}

/// The service names the password `password`; the form calls it `password1`
fn registration_field(field: &str) -> &str {
    match field {
        "password" => "password1",
        other => other,
    }
}

fn render_registration(
    state: &AppState,
    viewer: &Viewer,
    values: &RegistrationValues<'_>,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", &errors.view(values));
    viewer.render(state, "registration/registration_form.html", &context)
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub next: Option<String>,
}

/// Request body for login
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: String,
}

#[derive(Debug, Serialize)]
struct LoginValues<'a> {
    username: &'a str,
}

/// GET /auth/login/
pub async fn login_form(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<LoginQuery>,
) -> Result<Html<String>, PageError> {
    let next = query.next.unwrap_or_default();
    render_login(
        &state,
        &viewer,
        &LoginValues { username: "" },
        &next,
        &FormErrors::default(),
    )
}

/// POST /auth/login/ - Set the session cookie and go to `next`
pub async fn login(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    match state
        .user_service
        .login(form.username.trim(), &form.password)
        .await
    {
        Ok(session) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::SET_COOKIE,
                session_cookie(&session.id, state.config.site.session_days)?,
            );
            let target = safe_next(&form.next).unwrap_or("/");
            Ok((headers, Redirect::to(target)).into_response())
        }
        Err(UserServiceError::AuthenticationError(message)) => {
            let mut errors = FormErrors::default();
            errors.add_non_field(message);
            let values = LoginValues {
                username: &form.username,
            };
            Ok(render_login(&state, &viewer, &values, &form.next, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `next` is honoured only as a local absolute path
pub fn safe_next(next: &str) -> Option<&str> {
    let local = next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control);
    local.then_some(next)
}

fn render_login(
    state: &AppState,
    viewer: &Viewer,
    values: &LoginValues<'_>,
    next: &str,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", &errors.view(values));
    context.insert("next", next);
    viewer.render(state, "registration/login.html", &context)
}

/// POST /auth/logout/ - Drop the session (if any) and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<Response, PageError> {
    if let Some(token) = extract_session_token(&request_headers) {
        state.user_service.logout(&token).await?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, clear_session_cookie());

    Ok((headers, Redirect::to("/")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_local_paths() {
        assert_eq!(safe_next("/posts/create/"), Some("/posts/create/"));
        assert_eq!(safe_next("/?page=2"), Some("/?page=2"));
    }

    #[test]
    fn test_safe_next_rejects_other_hosts() {
        assert_eq!(safe_next(""), None);
        assert_eq!(safe_next("//evil.example/"), None);
        assert_eq!(safe_next("https://evil.example/"), None);
        assert_eq!(safe_next("/\\evil.example"), None);
        assert_eq!(safe_next("posts/"), None);
    }

    #[test]
    fn test_registration_field_names() {
        assert_eq!(registration_field("password"), "password1");
        assert_eq!(registration_field("email"), "email");
    }
}
