//! Comment repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentWithAuthor, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment>;

    /// Fetch a comment only if it belongs to `post_id`
    async fn get_for_post(&self, post_id: i64, comment_id: i64) -> Result<Option<Comment>>;

    /// Comments on a post with their authors, oldest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>>;

    async fn update_text(&self, id: i64, text: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    text: String,
    post_id: i64,
    author_id: i64,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            post_id: row.post_id,
            author_id: row.author_id,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentWithAuthorRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    author_username: String,
    author_first_name: String,
    author_last_name: String,
}

impl From<CommentWithAuthorRow> for CommentWithAuthor {
    fn from(row: CommentWithAuthorRow) -> Self {
        let author = UserSummary {
            id: row.comment.author_id,
            username: row.author_username,
            first_name: row.author_first_name,
            last_name: row.author_last_name,
        };
        Self {
            comment: row.comment.into(),
            author,
        }
    }
}

const INSERT_COMMENT: &str = r#"
    INSERT INTO comments (text, post_id, author_id, is_published, created_at)
    VALUES (?, ?, ?, ?, ?)
"#;

const SELECT_FOR_POST: &str = r#"
    SELECT id, text, post_id, author_id, is_published, created_at
    FROM comments WHERE id = ? AND post_id = ?
"#;

const LIST_FOR_POST: &str = r#"
    SELECT cm.id, cm.text, cm.post_id, cm.author_id, cm.is_published, cm.created_at,
           u.username AS author_username, u.first_name AS author_first_name,
           u.last_name AS author_last_name
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
    WHERE cm.post_id = ?
    ORDER BY cm.created_at ASC, cm.id ASC
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_COMMENT)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(true)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_COMMENT)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(true)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create comment")?;

        Ok(Comment {
            id,
            text: text.to_string(),
            post_id,
            author_id,
            is_published: true,
            created_at: now,
        })
    }

    async fn get_for_post(&self, post_id: i64, comment_id: i64) -> Result<Option<Comment>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CommentRow>(SELECT_FOR_POST)
                    .bind(comment_id)
                    .bind(post_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CommentRow>(SELECT_FOR_POST)
                    .bind(comment_id)
                    .bind(post_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to get comment")?;

        Ok(row.map(Comment::from))
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CommentWithAuthorRow>(LIST_FOR_POST)
                    .bind(post_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CommentWithAuthorRow>(LIST_FOR_POST)
                    .bind(post_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to list comments")?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<()> {
        let sql = "UPDATE comments SET text = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(text)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(text)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update comment")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected() > 0),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to delete comment")
    }
}
