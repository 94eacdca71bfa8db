//! GET/POST /profile_edit/ - The requester edits their own account

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::common::Viewer;
use crate::api::error::PageError;
use crate::api::forms::FormErrors;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::models::{UpdateProfileInput, User};
use crate::services::UserServiceError;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl From<&User> for ProfileForm {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

pub async fn edit_form(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
) -> Result<Html<String>, PageError> {
    render_profile_form(&state, &viewer, &ProfileForm::from(&user), &FormErrors::default())
}

/// On success, go to the (possibly renamed) profile page
pub async fn edit_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    viewer: Viewer,
    Form(form): Form<ProfileForm>,
) -> Result<Response, PageError> {
    let input = UpdateProfileInput {
        username: form.username.clone(),
        email: form.email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
    };

    match state.user_service.update_profile(&user, input).await {
        Ok(saved) => Ok(Redirect::to(&format!(
            "/profile/{}/",
            urlencoding::encode(&saved.username)
        ))
        .into_response()),
        Err(UserServiceError::ValidationError { field, message })
        | Err(UserServiceError::UserExists { field, message }) => {
            let mut errors = FormErrors::default();
            errors.add(field, message);
            Ok(render_profile_form(&state, &viewer, &form, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_profile_form(
    state: &AppState,
    viewer: &Viewer,
    form: &ProfileForm,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", &errors.view(form));
    viewer.render(state, "blog/user.html", &context)
}
