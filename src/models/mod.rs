//! Data models
//!
//! Entities persisted by the repositories (User, Session, Category, Location,
//! Post, Comment), the joined views rendered by the pages, and the listing
//! parameters shared by every post listing.

mod category;
mod comment;
mod listing;
mod location;
mod post;
mod session;
mod user;

pub use category::{Category, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{Comment, CommentWithAuthor};
pub use listing::{
    Annotation, ListParams, ListingOptions, PagedResult, PostScope, Visibility, MAX_PER_PAGE,
};
pub use location::{CreateLocationInput, Location, UpdateLocationInput};
pub use post::{Post, PostInput, PostView};
pub use session::Session;
pub use user::{CreateUserInput, UpdateProfileInput, User, UserRole, UserSummary};

/// Number of characters kept by the `Display` summaries of every entity
pub const SUMMARY_LEN: usize = 20;

/// Shorten `text` to [`SUMMARY_LEN`] characters, marking the cut with `...`.
pub fn summarize(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_short_text_unchanged() {
        assert_eq!(summarize("Hello"), "Hello");
        assert_eq!(summarize(""), "");
        let exact = "a".repeat(SUMMARY_LEN);
        assert_eq!(summarize(&exact), exact);
    }

    #[test]
    fn test_summarize_cuts_on_char_boundary() {
        let text = "Путешествие по горам Кавказа";
        let summary = summarize(text);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), SUMMARY_LEN + 3);
    }
}
