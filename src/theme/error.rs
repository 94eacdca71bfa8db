//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// A template named in the embedded set could not be read
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Template parsing or rendering failed
    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
