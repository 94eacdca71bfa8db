//! Administration API
//!
//! JSON endpoints for the catalogues authors pick from:
//! - GET/POST   /admin/api/categories
//! - GET/PUT/DELETE /admin/api/categories/{id}
//! - GET/POST   /admin/api/locations
//! - GET/PUT/DELETE /admin/api/locations/{id}
//! - DELETE     /admin/api/users/{id}
//!
//! Every route requires an admin session; see `require_auth` and
//! `require_admin`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Category, CreateCategoryInput, CreateLocationInput, Location, UpdateCategoryInput,
    UpdateLocationInput,
};
use crate::services::{CategoryServiceError, LocationServiceError, UserServiceError};

/// Build the admin API router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/locations", get(list_locations).post(create_location))
        .route(
            "/locations/{id}",
            get(get_location)
                .put(update_location)
                .delete(delete_location),
        )
        .route("/users/{id}", delete(delete_user))
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::DuplicateSlug(slug) => {
                ApiError::conflict(format!("Category slug already exists: {}", slug))
            }
            CategoryServiceError::NotFound(id) => {
                ApiError::not_found(format!("Category not found: {}", id))
            }
            CategoryServiceError::ValidationError(message) => ApiError::validation_error(message),
            CategoryServiceError::InternalError(e) => {
                tracing::error!("Category API failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<LocationServiceError> for ApiError {
    fn from(e: LocationServiceError) -> Self {
        match e {
            LocationServiceError::NotFound(id) => {
                ApiError::not_found(format!("Location not found: {}", id))
            }
            LocationServiceError::ValidationError(message) => ApiError::validation_error(message),
            LocationServiceError::InternalError(e) => {
                tracing::error!("Location API failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User not found: {}", id)),
            UserServiceError::SelfDelete => ApiError::forbidden("You cannot delete your own account"),
            UserServiceError::InternalError(e) => {
                tracing::error!("User API failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
            other => ApiError::validation_error(other.to_string()),
        }
    }
}

/// GET /admin/api/categories - All categories, unpublished included
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

/// POST /admin/api/categories
async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    tracing::info!(admin_id = admin.id, category_id = category.id, "Category created via admin API");

    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /admin/api/categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    state
        .category_service
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| CategoryServiceError::NotFound(id).into())
}

/// PUT /admin/api/categories/{id} - Partial update
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, body).await?))
}

/// DELETE /admin/api/categories/{id} - Posts keep existing without a category
async fn delete_category(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    tracing::info!(admin_id = admin.id, category_id = id, "Category deleted via admin API");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/api/locations
async fn list_locations(State(state): State<AppState>) -> Result<Json<Vec<Location>>, ApiError> {
    Ok(Json(state.location_service.list().await?))
}

/// POST /admin/api/locations
async fn create_location(
    State(state): State<AppState>,
    Json(body): Json<CreateLocationInput>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    let location = state.location_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

/// GET /admin/api/locations/{id}
async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Location>, ApiError> {
    state
        .location_service
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| LocationServiceError::NotFound(id).into())
}

/// PUT /admin/api/locations/{id}
async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLocationInput>,
) -> Result<Json<Location>, ApiError> {
    Ok(Json(state.location_service.update(id, body).await?))
}

/// DELETE /admin/api/locations/{id} - Posts keep existing without a location
async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.location_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/api/users/{id} - Remove an account and everything it owns
async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let images = state.user_service.delete(&admin, id).await?;

    for image in images {
        if let Err(e) = state.media.remove(&image).await {
            tracing::warn!(image = %image, "Failed to remove image: {}", e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
