//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, the visibility rules for single posts and profiles, and
//! account/session handling.

pub mod category;
pub mod comment;
pub mod location;
pub mod media;
pub mod password;
pub mod post;
pub mod user;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use location::{LocationService, LocationServiceError};
pub use media::{MediaError, MediaStorage};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use user::{UserService, UserServiceError};
