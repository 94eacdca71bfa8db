//! Category service
//!
//! Categories are managed by administrators. A category's slug is the public
//! URL key (`/category/{slug}/`), so it must be unique and URL-safe.
//! Unpublished categories hide every post filed under them.

use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, UpdateCategoryInput};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub const TITLE_MAX_LEN: usize = 256;
pub const SLUG_MAX_LEN: usize = 64;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid regex literal"));

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let input = CreateCategoryInput {
            title: input.title.trim().to_string(),
            description: input.description,
            slug: input.slug.trim().to_string(),
            is_published: input.is_published,
        };
        validate_title(&input.title)?;
        validate_slug(&input.slug)?;

        if self
            .repo
            .exists_by_slug(&input.slug)
            .await
            .context("Failed to check category slug")?
        {
            return Err(CategoryServiceError::DuplicateSlug(input.slug));
        }

        let category = self
            .repo
            .create(&input)
            .await
            .context("Failed to create category")?;

        tracing::info!(category_id = category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?;

        Ok(category)
    }

    /// Resolve a category for its public page; unpublished ones resolve to `None`
    pub async fn get_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?;

        Ok(category.filter(|c| c.is_published))
    }

    /// Every category, unpublished ones included
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        Ok(categories)
    }

    /// Apply the fields present in `input`
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            category.title = title;
        }

        if let Some(slug) = input.slug {
            let slug = slug.trim().to_string();
            validate_slug(&slug)?;
            if slug != category.slug
                && self
                    .repo
                    .exists_by_slug(&slug)
                    .await
                    .context("Failed to check category slug")?
            {
                return Err(CategoryServiceError::DuplicateSlug(slug));
            }
            category.slug = slug;
        }

        if let Some(description) = input.description {
            category.description = description;
        }
        if let Some(is_published) = input.is_published {
            category.is_published = is_published;
        }

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        tracing::info!(category_id = id, "Category updated");
        Ok(updated)
    }

    /// Delete a category; its posts stay, uncategorised
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;

        if !deleted {
            return Err(CategoryServiceError::NotFound(id));
        }

        tracing::info!(category_id = id, "Category deleted");
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), CategoryServiceError> {
    if title.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category title must be at most {} characters",
            TITLE_MAX_LEN
        )));
    }
    Ok(())
}

/// Slugs may contain only Latin letters, digits, hyphens and underscores
pub fn validate_slug(slug: &str) -> Result<(), CategoryServiceError> {
    if slug.is_empty() || slug.len() > SLUG_MAX_LEN || !SLUG_RE.is_match(slug) {
        return Err(CategoryServiceError::ValidationError(format!(
            "Slug must be 1-{} characters of latin letters, digits, hyphens and underscores",
            SLUG_MAX_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxCategoryRepository;
    use proptest::prelude::*;

    async fn setup_test_service() -> CategoryService {
        let pool = migrated_pool().await;
        CategoryService::new(SqlxCategoryRepository::boxed(pool))
    }

    fn input(title: &str, slug: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            title: title.to_string(),
            description: String::new(),
            slug: slug.to_string(),
            is_published: true,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_slug() {
        let service = setup_test_service().await;
        service.create(input("Travel", "travel")).await.unwrap();

        let result = service.create(input("Trips", "travel")).await;
        assert!(matches!(result, Err(CategoryServiceError::DuplicateSlug(s)) if s == "travel"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_slug_and_title() {
        let service = setup_test_service().await;

        assert!(matches!(
            service.create(input("Travel", "травел")).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(input("  ", "travel")).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_unpublished_category_is_hidden_by_slug() {
        let service = setup_test_service().await;
        let category = service.create(input("Travel", "travel")).await.unwrap();
        assert!(service.get_published_by_slug("travel").await.unwrap().is_some());

        service
            .update(
                category.id,
                UpdateCategoryInput {
                    is_published: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service.get_published_by_slug("travel").await.unwrap().is_none());
        assert!(service.get_published_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_slug_conflict_and_keep_own_slug() {
        let service = setup_test_service().await;
        let travel = service.create(input("Travel", "travel")).await.unwrap();
        service.create(input("Food", "food")).await.unwrap();

        let conflict = service
            .update(
                travel.id,
                UpdateCategoryInput {
                    slug: Some("food".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(conflict, Err(CategoryServiceError::DuplicateSlug(_))));

        let same = service
            .update(
                travel.id,
                UpdateCategoryInput {
                    title: Some("Journeys".to_string()),
                    slug: Some("travel".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.title, "Journeys");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let service = setup_test_service().await;
        assert!(matches!(
            service.delete(42).await,
            Err(CategoryServiceError::NotFound(42))
        ));
    }

    proptest! {
        #[test]
        fn prop_valid_slugs_accepted(slug in "[-a-zA-Z0-9_]{1,64}") {
            prop_assert!(validate_slug(&slug).is_ok());
        }

        #[test]
        fn prop_slugs_with_other_chars_rejected(
            prefix in "[a-z]{0,5}",
            bad in "[ /?#%.!]",
            suffix in "[a-z]{0,5}",
        ) {
            let slug = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(validate_slug(&slug).is_err());
        }
    }
}
