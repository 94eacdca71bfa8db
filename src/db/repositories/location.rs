//! Location repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateLocationInput, Location};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn create(&self, input: &CreateLocationInput) -> Result<Location>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>>;

    /// All locations ordered by name
    async fn list(&self) -> Result<Vec<Location>>;

    async fn update(&self, location: &Location) -> Result<Location>;

    /// Delete a location; posts keep existing with `location_id` set to NULL
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxLocationRepository {
    pool: DynDatabasePool,
}

impl SqlxLocationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LocationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    name: String,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

const SELECT_LOCATION: &str = "SELECT id, name, is_published, created_at FROM locations";
const INSERT_LOCATION: &str =
    "INSERT INTO locations (name, is_published, created_at) VALUES (?, ?, ?)";
const UPDATE_LOCATION: &str = "UPDATE locations SET name = ?, is_published = ? WHERE id = ?";

#[async_trait]
impl LocationRepository for SqlxLocationRepository {
    async fn create(&self, input: &CreateLocationInput) -> Result<Location> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_LOCATION)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_LOCATION)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create location")?;

        Ok(Location {
            id,
            name: input.name.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>> {
        let sql = format!("{} WHERE id = ?", SELECT_LOCATION);
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, LocationRow>(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, LocationRow>(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to get location by ID")?;

        Ok(row.map(Location::from))
    }

    async fn list(&self) -> Result<Vec<Location>> {
        let sql = format!("{} ORDER BY name, id", SELECT_LOCATION);
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, LocationRow>(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, LocationRow>(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to list locations")?;

        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn update(&self, location: &Location) -> Result<Location> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(UPDATE_LOCATION)
                .bind(&location.name)
                .bind(location.is_published)
                .bind(location.id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(UPDATE_LOCATION)
                .bind(&location.name)
                .bind(location.is_published)
                .bind(location.id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update location")?;

        Ok(location.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_location_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_location_mysql(self.pool.mysql()?, id).await,
        }
    }
}

async fn delete_location_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE posts SET location_id = NULL WHERE location_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach posts from location")?;
    let result = sqlx::query("DELETE FROM locations WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete location")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

async fn delete_location_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE posts SET location_id = NULL WHERE location_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach posts from location")?;
    let result = sqlx::query("DELETE FROM locations WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete location")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{
        migrated_pool, seed_location, seed_post, seed_user, PostSeed,
    };

    #[tokio::test]
    async fn test_create_update_list() {
        let pool = migrated_pool().await;
        let repo = SqlxLocationRepository::new(pool);

        let mut location = repo
            .create(&CreateLocationInput {
                name: "Planet Earth".to_string(),
                is_published: true,
            })
            .await
            .unwrap();
        location.name = "Moon".to_string();
        location.is_published = false;
        repo.update(&location).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Moon");
        assert!(!all[0].is_published);
    }

    #[tokio::test]
    async fn test_delete_detaches_posts() {
        let pool = migrated_pool().await;
        let author = seed_user(&pool, "author").await;
        let location = seed_location(&pool, "Tbilisi").await;
        let post = seed_post(&pool, PostSeed::by(author.id).at_location(location.id)).await;

        let repo = SqlxLocationRepository::new(pool.clone());
        assert!(repo.delete(location.id).await.unwrap());
        assert!(repo.get_by_id(location.id).await.unwrap().is_none());

        let location_id: Option<i64> =
            sqlx::query_scalar("SELECT location_id FROM posts WHERE id = ?")
                .bind(post.id)
                .fetch_one(pool.sqlite().unwrap())
                .await
                .unwrap();
        assert_eq!(location_id, None);
    }
}
