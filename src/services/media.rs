//! Media storage
//!
//! Post images live under the configured media directory as
//! `posts/<uuid>.<ext>`. The stored path (relative to the media root) is what
//! the `posts.image` column holds, and the file is served at `/media/<path>`.

use crate::config::MediaConfig;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const POST_IMAGE_DIR: &str = "posts";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Image is too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid media path: {0}")]
    InvalidPath(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MediaStorage {
    config: MediaConfig,
}

impl MediaStorage {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Validate and write an uploaded post image, returning its stored path
    pub async fn store_post_image(
        &self,
        content_type: &str,
        data: &[u8],
    ) -> Result<String, MediaError> {
        if !self.config.is_type_allowed(content_type) {
            return Err(MediaError::UnsupportedType(content_type.to_string()));
        }

        let size = data.len() as u64;
        if size > self.config.max_file_size {
            return Err(MediaError::TooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        let dir = self.config.path.join(POST_IMAGE_DIR);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create media directory {:?}: {}", dir, e))?;

        let file_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            self.config.get_extension(content_type)
        );
        let file_path = dir.join(&file_name);
        fs::write(&file_path, data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save image {:?}: {}", file_path, e))?;

        let stored = format!("{}/{}", POST_IMAGE_DIR, file_name);
        tracing::debug!(path = %stored, size, "Stored post image");
        Ok(stored)
    }

    /// Remove a stored file; a file that is already gone is not an error
    pub async fn remove(&self, stored: &str) -> Result<(), MediaError> {
        let path = self.resolve(stored)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to remove {:?}: {}", path, e).into()),
        }
    }

    /// Map a stored path to a file under the media root
    fn resolve(&self, stored: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(stored);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if stored.is_empty() || !is_plain {
            return Err(MediaError::InvalidPath(stored.to_string()));
        }
        Ok(self.config.path.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> MediaStorage {
        MediaStorage::new(MediaConfig {
            path: dir.path().to_path_buf(),
            max_file_size: 16,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_store_and_remove_image() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let stored = storage.store_post_image("image/png", b"\x89PNG").await.unwrap();
        assert!(stored.starts_with("posts/"));
        assert!(stored.ends_with(".png"));
        assert!(dir.path().join(&stored).exists());

        storage.remove(&stored).await.unwrap();
        assert!(!dir.path().join(&stored).exists());
        storage.remove(&stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_type_and_size() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(matches!(
            storage.store_post_image("text/html", b"<p>").await,
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            storage.store_post_image("image/jpeg", &[0u8; 17]).await,
            Err(MediaError::TooLarge { size: 17, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_remove_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(matches!(
            storage.remove("../config.yml").await,
            Err(MediaError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.remove("/etc/passwd").await,
            Err(MediaError::InvalidPath(_))
        ));
    }
}
