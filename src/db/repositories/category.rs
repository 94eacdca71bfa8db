//! Category repository
//!
//! Deleting a category detaches its posts (their `category_id` becomes NULL)
//! instead of deleting them.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Category, CreateCategoryInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories, published or not, ordered by title
    async fn list(&self) -> Result<Vec<Category>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category, detaching its posts. Returns false if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    title: String,
    description: String,
    slug: String,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            slug: row.slug,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

const SELECT_CATEGORY: &str =
    "SELECT id, title, description, slug, is_published, created_at FROM categories";

const INSERT_CATEGORY: &str = r#"
    INSERT INTO categories (title, description, slug, is_published, created_at)
    VALUES (?, ?, ?, ?, ?)
"#;

const UPDATE_CATEGORY: &str = r#"
    UPDATE categories SET title = ?, description = ?, slug = ?, is_published = ?
    WHERE id = ?
"#;

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_category_sqlite(self.pool.sqlite()?, input, now).await?
            }
            DatabaseDriver::Mysql => create_category_mysql(self.pool.mysql()?, input, now).await?,
        };

        Ok(Category {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            slug: input.slug.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", SELECT_CATEGORY);
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to get category by ID")?;

        Ok(row.map(Category::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE slug = ?", SELECT_CATEGORY);
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to get category by slug")?;

        Ok(row.map(Category::from))
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY title, id", SELECT_CATEGORY);
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to list categories")?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(UPDATE_CATEGORY)
                    .bind(&category.title)
                    .bind(&category.description)
                    .bind(&category.slug)
                    .bind(category.is_published)
                    .bind(category.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(UPDATE_CATEGORY)
                    .bind(&category.title)
                    .bind(&category.description)
                    .bind(&category.slug)
                    .bind(category.is_published)
                    .bind(category.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to update category")?;

        Ok(category.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_category_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_category_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(
    pool: &SqlitePool,
    input: &CreateCategoryInput,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(INSERT_CATEGORY)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.slug)
        .bind(input.is_published)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(result.last_insert_rowid())
}

async fn delete_category_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE posts SET category_id = NULL WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach posts from category")?;
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete category")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(
    pool: &MySqlPool,
    input: &CreateCategoryInput,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(INSERT_CATEGORY)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.slug)
        .bind(input.is_published)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(result.last_insert_id() as i64)
}

async fn delete_category_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE posts SET category_id = NULL WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach posts from category")?;
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete category")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{
        migrated_pool, seed_category, seed_post, seed_user, PostSeed,
    };

    #[tokio::test]
    async fn test_create_and_get_by_slug() {
        let pool = migrated_pool().await;
        let repo = SqlxCategoryRepository::new(pool);

        let created = repo
            .create(&CreateCategoryInput {
                title: "Travel".to_string(),
                description: "Trips".to_string(),
                slug: "travel".to_string(),
                is_published: false,
            })
            .await
            .unwrap();

        let found = repo.get_by_slug("travel").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(!found.is_published);
        assert!(repo.exists_by_slug("travel").await.unwrap());
        assert!(!repo.exists_by_slug("food").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let pool = migrated_pool().await;
        let mut zoo = seed_category(&pool, "zoo", true).await;
        seed_category(&pool, "art", true).await;
        let repo = SqlxCategoryRepository::new(pool);

        zoo.title = "Animals".to_string();
        zoo.is_published = false;
        repo.update(&zoo).await.unwrap();

        let titles: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Animals", "art"]);
        assert!(!repo.get_by_id(zoo.id).await.unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn test_delete_detaches_posts() {
        let pool = migrated_pool().await;
        let author = seed_user(&pool, "author").await;
        let category = seed_category(&pool, "travel", true).await;
        let post = seed_post(&pool, PostSeed::by(author.id).in_category(category.id)).await;

        let repo = SqlxCategoryRepository::new(pool.clone());
        assert!(repo.delete(category.id).await.unwrap());
        assert!(!repo.delete(category.id).await.unwrap());

        let category_id: Option<i64> =
            sqlx::query_scalar("SELECT category_id FROM posts WHERE id = ?")
                .bind(post.id)
                .fetch_one(pool.sqlite().unwrap())
                .await
                .unwrap();
        assert_eq!(category_id, None);
    }
}
