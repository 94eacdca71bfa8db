//! Database repositories
//!
//! One repository per entity. Each exposes a trait used by the services and
//! an `Sqlx*Repository` implementation for SQLite and MySQL.

pub mod category;
pub mod comment;
pub mod location;
pub mod post;
pub mod session;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use location::{LocationRepository, SqlxLocationRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Fixtures shared by the repository and service tests
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{
        Category, Comment, CreateCategoryInput, CreateLocationInput, Location, Post, PostInput,
        User, UserRole,
    };
    use chrono::{Duration, Utc};

    pub async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    pub async fn seed_user(pool: &DynDatabasePool, username: &str) -> User {
        let user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            String::new(),
            String::new(),
            "not-a-real-hash".to_string(),
            UserRole::Author,
        );
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to seed user")
    }

    pub async fn seed_category(pool: &DynDatabasePool, slug: &str, is_published: bool) -> Category {
        SqlxCategoryRepository::new(pool.clone())
            .create(&CreateCategoryInput {
                title: slug.to_string(),
                description: format!("All about {}", slug),
                slug: slug.to_string(),
                is_published,
            })
            .await
            .expect("Failed to seed category")
    }

    pub async fn seed_location(pool: &DynDatabasePool, name: &str) -> Location {
        SqlxLocationRepository::new(pool.clone())
            .create(&CreateLocationInput {
                name: name.to_string(),
                is_published: true,
            })
            .await
            .expect("Failed to seed location")
    }

    pub async fn seed_comment(pool: &DynDatabasePool, post_id: i64, author_id: i64) -> Comment {
        SqlxCommentRepository::new(pool.clone())
            .create(post_id, author_id, "A comment")
            .await
            .expect("Failed to seed comment")
    }

    /// Builder for test posts; defaults to a published post dated an hour ago
    pub struct PostSeed {
        author_id: i64,
        offset: Duration,
        is_published: bool,
        category_id: Option<i64>,
        location_id: Option<i64>,
    }

    impl PostSeed {
        pub fn by(author_id: i64) -> Self {
            Self {
                author_id,
                offset: Duration::hours(-1),
                is_published: true,
                category_id: None,
                location_id: None,
            }
        }

        /// Publication date relative to the moment the post is seeded
        pub fn dated(mut self, offset: Duration) -> Self {
            self.offset = offset;
            self
        }

        pub fn unpublished(mut self) -> Self {
            self.is_published = false;
            self
        }

        pub fn in_category(mut self, category_id: i64) -> Self {
            self.category_id = Some(category_id);
            self
        }

        pub fn at_location(mut self, location_id: i64) -> Self {
            self.location_id = Some(location_id);
            self
        }
    }

    pub async fn seed_post(pool: &DynDatabasePool, seed: PostSeed) -> Post {
        let input = PostInput {
            title: "Seeded post".to_string(),
            text: "Seeded text".to_string(),
            pub_date: Utc::now() + seed.offset,
            is_published: seed.is_published,
            location_id: seed.location_id,
            category_id: seed.category_id,
            image: None,
        };
        SqlxPostRepository::new(pool.clone())
            .create(seed.author_id, &input)
            .await
            .expect("Failed to seed post")
    }
}
