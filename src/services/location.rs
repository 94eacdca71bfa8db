//! Location service

use crate::db::repositories::LocationRepository;
use crate::models::{CreateLocationInput, Location, UpdateLocationInput};
use anyhow::Context;
use std::sync::Arc;

pub const NAME_MAX_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LocationServiceError {
    #[error("Location not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct LocationService {
    repo: Arc<dyn LocationRepository>,
}

impl LocationService {
    pub fn new(repo: Arc<dyn LocationRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: CreateLocationInput) -> Result<Location, LocationServiceError> {
        let input = CreateLocationInput {
            name: validate_name(&input.name)?,
            is_published: input.is_published,
        };

        let location = self
            .repo
            .create(&input)
            .await
            .context("Failed to create location")?;

        tracing::info!(location_id = location.id, "Location created");
        Ok(location)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Location>, LocationServiceError> {
        let location = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get location")?;

        Ok(location)
    }

    pub async fn list(&self) -> Result<Vec<Location>, LocationServiceError> {
        let locations = self.repo.list().await.context("Failed to list locations")?;
        Ok(locations)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateLocationInput,
    ) -> Result<Location, LocationServiceError> {
        let mut location = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get location")?
            .ok_or(LocationServiceError::NotFound(id))?;

        if let Some(name) = input.name {
            location.name = validate_name(&name)?;
        }
        if let Some(is_published) = input.is_published {
            location.is_published = is_published;
        }

        let updated = self
            .repo
            .update(&location)
            .await
            .context("Failed to update location")?;

        tracing::info!(location_id = id, "Location updated");
        Ok(updated)
    }

    /// Delete a location; posts that referenced it lose the reference
    pub async fn delete(&self, id: i64) -> Result<(), LocationServiceError> {
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete location")?
        {
            return Err(LocationServiceError::NotFound(id));
        }

        tracing::info!(location_id = id, "Location deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String, LocationServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LocationServiceError::ValidationError(
            "Location name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(LocationServiceError::ValidationError(format!(
            "Location name must be at most {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(name.to_string())
}
