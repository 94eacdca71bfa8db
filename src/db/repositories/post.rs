//! Post repository
//!
//! Besides plain CRUD this module owns the listing query used by every page
//! that shows posts. A listing is described by a [`PostScope`] (which posts to
//! start from) and [`ListingOptions`] (whether to apply the public visibility
//! rule and whether to count comments). Author, location and category are
//! joined into the same query so rendering a page never issues per-row
//! lookups.
//!
//! The visibility rule is evaluated in SQL against an explicit `now`:
//!
//! ```text
//! p.is_published AND p.pub_date <= now AND (no category OR category published)
//! ```

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Annotation, Category, ListParams, ListingOptions, Location, Post, PostInput, PostScope,
    PostView, UserSummary, Visibility,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, author_id: i64, input: &PostInput) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Resolve a single post with its relations.
    ///
    /// With [`Visibility::PublicOnly`] a post that is not publicly visible at
    /// `now` resolves to `None`.
    async fn find_view(
        &self,
        id: i64,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<Option<PostView>>;

    /// One page of a post listing, newest `pub_date` first
    async fn list(
        &self,
        scope: PostScope,
        options: ListingOptions,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<Vec<PostView>>;

    /// Total size of the listing `list` pages through
    async fn count(
        &self,
        scope: PostScope,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<i64>;

    /// Replace every editable field. Returns `None` if the post does not exist.
    async fn update(&self, id: i64, input: &PostInput) -> Result<Option<Post>>;

    /// Delete a post and its comments. Returns false if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

// ============================================================================
// Listing query construction
// ============================================================================

/// What a listing query selects before visibility is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subject {
    Scope(PostScope),
    Single(i64),
}

impl Subject {
    /// Condition restricting the subject, with the id it binds
    fn condition(self) -> Option<(&'static str, i64)> {
        match self {
            Subject::Scope(PostScope::All) => None,
            Subject::Scope(PostScope::Category(id)) => Some(("p.category_id = ?", id)),
            Subject::Scope(PostScope::Author(id)) => Some(("p.author_id = ?", id)),
            Subject::Single(id) => Some(("p.id = ?", id)),
        }
    }
}

const PUBLIC_CONDITION: &str =
    "p.is_published = 1 AND p.pub_date <= ? AND (c.id IS NULL OR c.is_published = 1)";

const COMMENT_COUNT: &str = "(SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id)";

/// SQL plus the values it expects, in bind order
#[derive(Debug, Clone, PartialEq)]
struct ListingQuery {
    sql: String,
    subject_id: Option<i64>,
    binds_now: bool,
    paginated: bool,
}

impl ListingQuery {
    fn where_clause(subject: Subject, visibility: Visibility) -> (String, Option<i64>, bool) {
        let mut conditions = Vec::new();
        let subject_id = subject.condition().map(|(condition, id)| {
            conditions.push(condition);
            id
        });
        let binds_now = visibility == Visibility::PublicOnly;
        if binds_now {
            conditions.push(PUBLIC_CONDITION);
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, subject_id, binds_now)
    }

    /// Full select with relations, ordered newest first
    fn select(subject: Subject, options: ListingOptions, paginated: bool) -> Self {
        let (where_clause, subject_id, binds_now) =
            Self::where_clause(subject, options.visibility);
        let comment_count = match options.annotate {
            Annotation::WithCommentCount => COMMENT_COUNT,
            Annotation::Bare => "NULL",
        };

        let mut sql = format!(
            r#"SELECT p.id, p.title, p.text, p.image, p.pub_date, p.is_published, p.created_at,
                p.author_id, p.location_id, p.category_id,
                u.username AS author_username, u.first_name AS author_first_name,
                u.last_name AS author_last_name,
                l.name AS location_name, l.is_published AS location_is_published,
                l.created_at AS location_created_at,
                c.title AS category_title, c.description AS category_description,
                c.slug AS category_slug, c.is_published AS category_is_published,
                c.created_at AS category_created_at,
                {comment_count} AS comment_count
            FROM posts p
            JOIN users u ON u.id = p.author_id
            LEFT JOIN locations l ON l.id = p.location_id
            LEFT JOIN categories c ON c.id = p.category_id{where_clause}
            ORDER BY p.pub_date DESC, p.id DESC"#
        );
        if paginated {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        Self {
            sql,
            subject_id,
            binds_now,
            paginated,
        }
    }

    fn count(scope: PostScope, visibility: Visibility) -> Self {
        let (where_clause, subject_id, binds_now) =
            Self::where_clause(Subject::Scope(scope), visibility);
        Self {
            sql: format!(
                "SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id{}",
                where_clause
            ),
            subject_id,
            binds_now,
            paginated: false,
        }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    title: String,
    text: String,
    image: Option<String>,
    pub_date: DateTime<Utc>,
    is_published: bool,
    created_at: DateTime<Utc>,
    author_id: i64,
    location_id: Option<i64>,
    category_id: Option<i64>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            text: row.text,
            image: row.image,
            pub_date: row.pub_date,
            is_published: row.is_published,
            created_at: row.created_at,
            author_id: row.author_id,
            location_id: row.location_id,
            category_id: row.category_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostViewRow {
    #[sqlx(flatten)]
    post: PostRow,
    author_username: String,
    author_first_name: String,
    author_last_name: String,
    location_name: Option<String>,
    location_is_published: Option<bool>,
    location_created_at: Option<DateTime<Utc>>,
    category_title: Option<String>,
    category_description: Option<String>,
    category_slug: Option<String>,
    category_is_published: Option<bool>,
    category_created_at: Option<DateTime<Utc>>,
    comment_count: Option<i64>,
}

impl From<PostViewRow> for PostView {
    fn from(row: PostViewRow) -> Self {
        let author = UserSummary {
            id: row.post.author_id,
            username: row.author_username,
            first_name: row.author_first_name,
            last_name: row.author_last_name,
        };

        let location = match (
            row.post.location_id,
            row.location_name,
            row.location_is_published,
            row.location_created_at,
        ) {
            (Some(id), Some(name), Some(is_published), Some(created_at)) => Some(Location {
                id,
                name,
                is_published,
                created_at,
            }),
            _ => None,
        };

        let category = match (
            row.post.category_id,
            row.category_title,
            row.category_slug,
            row.category_is_published,
            row.category_created_at,
        ) {
            (Some(id), Some(title), Some(slug), Some(is_published), Some(created_at)) => {
                Some(Category {
                    id,
                    title,
                    description: row.category_description.unwrap_or_default(),
                    slug,
                    is_published,
                    created_at,
                })
            }
            _ => None,
        };

        let post: Post = row.post.into();
        Self {
            is_scheduled: post.pub_date > Utc::now(),
            post,
            author,
            location,
            category,
            comment_count: row.comment_count,
        }
    }
}

const SELECT_POST: &str = r#"
    SELECT id, title, text, image, pub_date, is_published, created_at,
           author_id, location_id, category_id
    FROM posts WHERE id = ?
"#;

const INSERT_POST: &str = r#"
    INSERT INTO posts (title, text, image, pub_date, is_published, created_at,
                       author_id, location_id, category_id)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET title = ?, text = ?, image = ?, pub_date = ?, is_published = ?,
        location_id = ?, category_id = ?
    WHERE id = ?
"#;

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, author_id: i64, input: &PostInput) -> Result<Post> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_post_sqlite(self.pool.sqlite()?, author_id, input, now).await?
            }
            DatabaseDriver::Mysql => {
                create_post_mysql(self.pool.mysql()?, author_id, input, now).await?
            }
        };

        Ok(Post {
            id,
            title: input.title.clone(),
            text: input.text.clone(),
            image: input.image.clone(),
            pub_date: input.pub_date,
            is_published: input.is_published,
            created_at: now,
            author_id,
            location_id: input.location_id,
            category_id: input.category_id,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, PostRow>(SELECT_POST)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, PostRow>(SELECT_POST)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to get post by ID")?;

        Ok(row.map(Post::from))
    }

    async fn find_view(
        &self,
        id: i64,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<Option<PostView>> {
        let options = ListingOptions::new(visibility, Annotation::Bare);
        let query = ListingQuery::select(Subject::Single(id), options, false);
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_views_sqlite(self.pool.sqlite()?, &query, now, None).await?
            }
            DatabaseDriver::Mysql => {
                fetch_views_mysql(self.pool.mysql()?, &query, now, None).await?
            }
        };

        Ok(rows.into_iter().next())
    }

    async fn list(
        &self,
        scope: PostScope,
        options: ListingOptions,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<Vec<PostView>> {
        let query = ListingQuery::select(Subject::Scope(scope), options, true);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_views_sqlite(self.pool.sqlite()?, &query, now, Some(params)).await
            }
            DatabaseDriver::Mysql => {
                fetch_views_mysql(self.pool.mysql()?, &query, now, Some(params)).await
            }
        }
    }

    async fn count(
        &self,
        scope: PostScope,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let query = ListingQuery::count(scope, visibility);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut q = sqlx::query_scalar::<_, i64>(&query.sql);
                if let Some(id) = query.subject_id {
                    q = q.bind(id);
                }
                if query.binds_now {
                    q = q.bind(now);
                }
                q.fetch_one(self.pool.sqlite()?).await
            }
            DatabaseDriver::Mysql => {
                let mut q = sqlx::query_scalar::<_, i64>(&query.sql);
                if let Some(id) = query.subject_id {
                    q = q.bind(id);
                }
                if query.binds_now {
                    q = q.bind(now);
                }
                q.fetch_one(self.pool.mysql()?).await
            }
        }
        .context("Failed to count posts")
    }

    async fn update(&self, id: i64, input: &PostInput) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(UPDATE_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(&input.image)
                .bind(input.pub_date)
                .bind(input.is_published)
                .bind(input.location_id)
                .bind(input.category_id)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(UPDATE_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(&input.image)
                .bind(input.pub_date)
                .bind(input.is_published)
                .bind(input.location_id)
                .bind(input.category_id)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update post")?;

        // Row counts are unreliable here (MySQL reports 0 for unchanged rows).
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_post_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_post_mysql(self.pool.mysql()?, id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(
    pool: &SqlitePool,
    author_id: i64,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(INSERT_POST)
        .bind(&input.title)
        .bind(&input.text)
        .bind(&input.image)
        .bind(input.pub_date)
        .bind(input.is_published)
        .bind(now)
        .bind(author_id)
        .bind(input.location_id)
        .bind(input.category_id)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(result.last_insert_rowid())
}

async fn fetch_views_sqlite(
    pool: &SqlitePool,
    query: &ListingQuery,
    now: DateTime<Utc>,
    params: Option<&ListParams>,
) -> Result<Vec<PostView>> {
    let mut q = sqlx::query_as::<_, PostViewRow>(&query.sql);
    if let Some(id) = query.subject_id {
        q = q.bind(id);
    }
    if query.binds_now {
        q = q.bind(now);
    }
    if let (true, Some(params)) = (query.paginated, params) {
        q = q.bind(params.limit()).bind(params.offset());
    }

    let rows = q.fetch_all(pool).await.context("Failed to list posts")?;
    Ok(rows.into_iter().map(PostView::from).collect())
}

async fn delete_post_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM comments WHERE post_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post comments")?;
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(
    pool: &MySqlPool,
    author_id: i64,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(INSERT_POST)
        .bind(&input.title)
        .bind(&input.text)
        .bind(&input.image)
        .bind(input.pub_date)
        .bind(input.is_published)
        .bind(now)
        .bind(author_id)
        .bind(input.location_id)
        .bind(input.category_id)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(result.last_insert_id() as i64)
}

async fn fetch_views_mysql(
    pool: &MySqlPool,
    query: &ListingQuery,
    now: DateTime<Utc>,
    params: Option<&ListParams>,
) -> Result<Vec<PostView>> {
    let mut q = sqlx::query_as::<_, PostViewRow>(&query.sql);
    if let Some(id) = query.subject_id {
        q = q.bind(id);
    }
    if query.binds_now {
        q = q.bind(now);
    }
    if let (true, Some(params)) = (query.paginated, params) {
        q = q.bind(params.limit()).bind(params.offset());
    }

    let rows = q.fetch_all(pool).await.context("Failed to list posts")?;
    Ok(rows.into_iter().map(PostView::from).collect())
}

async fn delete_post_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM comments WHERE post_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post comments")?;
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post")?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}
