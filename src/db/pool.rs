//! Connection pools for the SQLite and MySQL backends.
//!
//! Repositories receive a [`DynDatabasePool`], branch on its driver and borrow
//! the concrete sqlx pool through `sqlite()` or `mysql()`. The backend is
//! chosen by `database.driver` in the configuration.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;

/// Borrowed sqlx pool of whichever backend is connected
#[derive(Debug, Clone, Copy)]
pub enum Connection<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn connection(&self) -> Connection<'_>;

    /// Run a statement that returns no rows; yields the affected row count
    async fn execute(&self, statement: &str) -> Result<u64> {
        let affected = match self.connection() {
            Connection::Sqlite(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
            Connection::Mysql(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute: {}", statement))
    }
}

impl dyn DatabasePool {
    pub fn driver(&self) -> DatabaseDriver {
        match self.connection() {
            Connection::Sqlite(_) => DatabaseDriver::Sqlite,
            Connection::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    /// The SQLite pool, or an error when the connection is MySQL
    pub fn sqlite(&self) -> Result<&SqlitePool> {
        match self.connection() {
            Connection::Sqlite(pool) => Ok(pool),
            Connection::Mysql(_) => bail!("SQLite pool requested from a MySQL connection"),
        }
    }

    /// The MySQL pool, or an error when the connection is SQLite
    pub fn mysql(&self) -> Result<&MySqlPool> {
        match self.connection() {
            Connection::Mysql(pool) => Ok(pool),
            Connection::Sqlite(_) => bail!("MySQL pool requested from a SQLite connection"),
        }
    }
}

/// Shared handle to whichever pool the configuration selected
pub type DynDatabasePool = Arc<dyn DatabasePool>;

pub struct SqliteDatabase(SqlitePool);

impl SqliteDatabase {
    /// Open `url`: `:memory:`, a `sqlite:` URL or a plain file path.
    ///
    /// Foreign keys are enforced on every pooled connection, not just the
    /// first one.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = sqlite_options(url)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;
        Ok(Self(pool))
    }
}

impl DatabasePool for SqliteDatabase {
    fn connection(&self) -> Connection<'_> {
        Connection::Sqlite(&self.0)
    }
}

pub struct MysqlDatabase(MySqlPool);

impl MysqlDatabase {
    /// Open `url`; the `mysql://` scheme may be omitted
    pub async fn connect(url: &str) -> Result<Self> {
        let options = if url.starts_with("mysql://") {
            MySqlConnectOptions::from_str(url)
        } else {
            MySqlConnectOptions::from_str(&format!("mysql://{}", url))
        }
        .context("Invalid MySQL database URL")?;

        // The URL may carry a password, so it stays out of the error
        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to MySQL database")?;
        Ok(Self(pool))
    }
}

impl DatabasePool for MysqlDatabase {
    fn connection(&self) -> Connection<'_> {
        Connection::Mysql(&self.0)
    }
}

fn is_in_memory(url: &str) -> bool {
    matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:")
}

/// File behind a SQLite URL, without scheme or query string
fn sqlite_file_path(url: &str) -> &Path {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    Path::new(path.split_once('?').map_or(path, |(path, _)| path))
}

fn sqlite_options(url: &str) -> Result<SqliteConnectOptions> {
    let options = if is_in_memory(url) {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        let path = sqlite_file_path(url);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid SQLite database URL: {}", url))?
        } else {
            SqliteConnectOptions::new().filename(path)
        }
    };

    Ok(options.create_if_missing(true).foreign_keys(true))
}

/// Connect to the database described by `config`.
///
/// File-backed SQLite databases are created on first use, together with any
/// missing parent directories.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::connect(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::connect(&config.url).await?),
    };
    tracing::debug!(driver = ?config.driver, "Database pool ready");
    Ok(pool)
}

/// In-memory SQLite pool, used throughout the test suites
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}
