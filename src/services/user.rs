//! User service
//!
//! Registration, login sessions and profile editing.
//!
//! The first account registered on an empty database becomes the
//! administrator; every later account is an author. Sessions are random UUID
//! tokens stored in the database and carried in the `session` cookie.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, UpdateProfileInput, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in days
pub const DEFAULT_SESSION_DAYS: i64 = 7;

pub const USERNAME_MAX_LEN: usize = 150;
pub const NAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex literal"));

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown username or wrong password
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// A submitted field is invalid
    #[error("Validation error on {field}: {message}")]
    ValidationError { field: &'static str, message: String },

    /// Username or email already belongs to another account
    #[error("{message}")]
    UserExists { field: &'static str, message: String },

    #[error("User not found: {0}")]
    NotFound(i64),

    /// An administrator tried to remove their own account
    #[error("You cannot delete your own account")]
    SelfDelete,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field,
            message: message.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new account.
    ///
    /// `input.role` forces a role; otherwise the first account becomes admin.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        validate_username(&username)?;
        validate_email(&email)?;
        validate_names(&input.first_name, &input.last_name)?;
        if input.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(UserServiceError::invalid(
                "password",
                format!("Password must be at least {} characters", PASSWORD_MIN_LEN),
            ));
        }

        self.ensure_username_free(&username, None).await?;
        self.ensure_email_free(&email, None).await?;

        let role = match input.role {
            Some(role) => role,
            None if self.is_first_user().await? => UserRole::Admin,
            None => UserRole::Author,
        };

        let password_hash = hash_password(&input.password)?;
        let user = User::new(
            username,
            email,
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            password_hash,
            role,
        );

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, username = %created.username, role = %created.role, "User registered");
        Ok(created)
    }

    /// Check credentials and open a new session
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Please enter a correct username and password".to_string(),
            )
        };

        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(username = %user.username, "Login rejected: wrong password");
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok(session)
    }

    /// Invalidate a session token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Resolve the user behind a session token.
    ///
    /// Unknown and expired tokens resolve to `None`; an expired session is
    /// removed on the way.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;

        Ok(user)
    }

    /// Change the requester's own username, email and names
    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        validate_username(&username)?;
        validate_email(&email)?;
        validate_names(&input.first_name, &input.last_name)?;

        self.ensure_username_free(&username, Some(user.id)).await?;
        self.ensure_email_free(&email, Some(user.id)).await?;

        let mut updated = user.clone();
        updated.username = username;
        updated.email = email;
        updated.first_name = input.first_name.trim().to_string();
        updated.last_name = input.last_name.trim().to_string();

        let saved = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user")?;

        tracing::info!(user_id = saved.id, "Profile updated");
        Ok(saved)
    }

    /// Remove an account with its sessions, posts and comments, including
    /// comments other people left on those posts.
    ///
    /// Returns the image paths of the removed posts so the caller can clean
    /// up the files.
    pub async fn delete(&self, acting: &User, id: i64) -> Result<Vec<String>, UserServiceError> {
        if acting.id == id {
            return Err(UserServiceError::SelfDelete);
        }

        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))?;

        let images = self
            .user_repo
            .delete(user.id)
            .await
            .context("Failed to delete user")?;

        tracing::info!(
            user_id = user.id,
            deleted_by = acting.id,
            images = images.len(),
            "User deleted"
        );
        Ok(images)
    }

    /// Purge expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;

        Ok(count == 0)
    }

    async fn ensure_username_free(
        &self,
        username: &str,
        owner: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;

        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists {
                field: "username",
                message: "A user with that username already exists".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<i64>) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;

        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists {
                field: "email",
                message: "A user with that email already exists".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let expires_at = Duration::try_days(self.session_expiration_days)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .with_context(|| {
                format!(
                    "Session lifetime out of range: {} days",
                    self.session_expiration_days
                )
            })?;
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at,
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::invalid("username", "This field is required"));
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(UserServiceError::invalid(
            "username",
            format!("Username must be at most {} characters", USERNAME_MAX_LEN),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(UserServiceError::invalid(
            "username",
            "Username may contain only letters, digits and @/./+/-/_",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::invalid("email", "This field is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(UserServiceError::invalid("email", "Enter a valid email address")),
    }
}

fn validate_names(first_name: &str, last_name: &str) -> Result<(), UserServiceError> {
    if first_name.trim().chars().count() > NAME_MAX_LEN {
        return Err(UserServiceError::invalid("first_name", "First name is too long"));
    }
    if last_name.trim().chars().count() > NAME_MAX_LEN {
        return Err(UserServiceError::invalid("last_name", "Last name is too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::DynDatabasePool;

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    fn input(username: &str, password: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: password.to_string(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let (_pool, service) = setup_test_service().await;

        let first = service.register(input("first", "password123")).await.unwrap();
        let second = service.register(input("second", "password123")).await.unwrap();

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::Author);
        assert!(first.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        let short = service.register(input("ada", "short")).await;
        assert!(matches!(
            short,
            Err(UserServiceError::ValidationError { field: "password", .. })
        ));

        let bad_name = service.register(input("ada lovelace", "password123")).await;
        assert!(matches!(
            bad_name,
            Err(UserServiceError::ValidationError { field: "username", .. })
        ));

        let mut bad_email = input("ada", "password123");
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            service.register(bad_email).await,
            Err(UserServiceError::ValidationError { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("ada", "password123")).await.unwrap();

        let same_name = service.register(input("ada", "password123")).await;
        assert!(matches!(
            same_name,
            Err(UserServiceError::UserExists { field: "username", .. })
        ));

        let mut same_email = input("grace", "password123");
        same_email.email = "ada@example.com".to_string();
        assert!(matches!(
            service.register(same_email).await,
            Err(UserServiceError::UserExists { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_login_and_session_lifecycle() {
        let (_pool, service) = setup_test_service().await;
        let user = service.register(input("ada", "password123")).await.unwrap();

        let session = service.login("ada", "password123").await.unwrap();
        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_wrong_credentials() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("ada", "password123")).await.unwrap();

        assert!(matches!(
            service.login("ada", "wrong-password").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login("nobody", "password123").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (pool, _) = setup_test_service().await;
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            -1,
        );
        service.register(input("ada", "password123")).await.unwrap();

        let session = service.login("ada", "password123").await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (_pool, service) = setup_test_service().await;
        let ada = service.register(input("ada", "password123")).await.unwrap();
        service.register(input("grace", "password123")).await.unwrap();

        let taken = service
            .update_profile(
                &ada,
                UpdateProfileInput {
                    username: "grace".to_string(),
                    email: "ada@example.com".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            taken,
            Err(UserServiceError::UserExists { field: "username", .. })
        ));

        let renamed = service
            .update_profile(
                &ada,
                UpdateProfileInput {
                    username: "countess".to_string(),
                    email: "ada@example.com".to_string(),
                    first_name: "Augusta".to_string(),
                    last_name: "King".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "countess");
        assert_eq!(renamed.first_name, "Augusta");
        assert!(service.get_by_username("ada").await.unwrap().is_none());
        assert!(service.get_by_username("countess").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (_pool, service) = setup_test_service().await;
        let admin = service.register(input("admin", "password123")).await.unwrap();
        let author = service.register(input("author", "password123")).await.unwrap();
        let session = service.login("author", "password123").await.unwrap();

        assert!(matches!(
            service.delete(&admin, admin.id).await,
            Err(UserServiceError::SelfDelete)
        ));
        assert!(matches!(
            service.delete(&admin, 999).await,
            Err(UserServiceError::NotFound(999))
        ));

        let images = service.delete(&admin, author.id).await.unwrap();
        assert!(images.is_empty());
        assert!(service.get_by_username("author").await.unwrap().is_none());
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_session_lifetime_fails_login() {
        let pool = migrated_pool().await;
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
            i64::MAX,
        );
        service.register(input("ada", "password123")).await.unwrap();

        assert!(matches!(
            service.login("ada", "password123").await,
            Err(UserServiceError::InternalError(_))
        ));
    }
}
