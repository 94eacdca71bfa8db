//! Persistence for the blog.
//!
//! SQLite is the default backend; MySQL is selected with `database.driver: mysql`.
//! Schema changes live in [`migrations`] and all queries go through the
//! repositories in [`repositories`].

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Connection, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
