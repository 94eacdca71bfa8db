//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{summarize, Category, Location, UserSummary};

/// A blog post as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// Path of the stored image relative to the media directory
    pub image: Option<String>,
    /// Publication time; posts dated in the future stay hidden until then
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&summarize(&self.title))
    }
}

/// Everything an author submits through the post form
#[derive(Debug, Clone, PartialEq)]
pub struct PostInput {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    pub image: Option<String>,
}

/// A post with its author, location and category resolved.
///
/// `comment_count` is only filled by listings that ask for it.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
    pub location: Option<Location>,
    pub category: Option<Category>,
    pub comment_count: Option<i64>,
    /// `pub_date` was still ahead when the view was loaded
    pub is_scheduled: bool,
}

impl PostView {
    /// Whether anyone, not only the author, may see this post at `now`
    pub fn is_publicly_visible(&self, now: DateTime<Utc>) -> bool {
        self.post.is_published
            && self.post.pub_date <= now
            && self.category.as_ref().map_or(true, |c| c.is_published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn view(is_published: bool, offset: Duration, category_published: Option<bool>) -> PostView {
        let now = Utc::now();
        PostView {
            post: Post {
                id: 1,
                title: "Title".to_string(),
                text: "Text".to_string(),
                image: None,
                pub_date: now + offset,
                is_published,
                created_at: now,
                author_id: 1,
                location_id: None,
                category_id: category_published.map(|_| 1),
            },
            author: UserSummary {
                id: 1,
                username: "author".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
            location: None,
            category: category_published.map(|is_published| Category {
                id: 1,
                title: "Cat".to_string(),
                description: String::new(),
                slug: "cat".to_string(),
                is_published,
                created_at: now,
            }),
            comment_count: None,
            is_scheduled: offset > Duration::zero(),
        }
    }

    #[test]
    fn test_public_visibility_rules() {
        let now = Utc::now() + Duration::seconds(1);
        assert!(view(true, Duration::days(-1), None).is_publicly_visible(now));
        assert!(view(true, Duration::days(-1), Some(true)).is_publicly_visible(now));
        assert!(!view(false, Duration::days(-1), Some(true)).is_publicly_visible(now));
        assert!(!view(true, Duration::days(1), Some(true)).is_publicly_visible(now));
        assert!(!view(true, Duration::days(-1), Some(false)).is_publicly_visible(now));
    }

    #[test]
    fn test_view_serializes_flat() {
        let json = serde_json::to_value(view(true, Duration::zero(), None)).unwrap();
        assert_eq!(json["title"], "Title");
        assert_eq!(json["author"]["username"], "author");
        assert!(json["comment_count"].is_null());
        assert_eq!(json["is_scheduled"], false);
    }
}
