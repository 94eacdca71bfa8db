//! HTML form handling
//!
//! Field errors are collected in [`FormErrors`] and rendered next to the
//! fields; a form with errors is shown again with the submitted values and a
//! 200 status.

use axum::body::Bytes;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Post, PostInput};

/// Accepted `pub_date` layouts; `datetime-local` inputs send the first two
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Context value for the templates: `{ values, errors, non_field_errors }`
    pub fn view<'a, T: Serialize>(&'a self, values: &'a T) -> FormView<'a, T> {
        FormView {
            values,
            errors: &self.fields,
            non_field_errors: &self.non_field,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FormView<'a, T> {
    pub values: &'a T,
    pub errors: &'a BTreeMap<String, Vec<String>>,
    pub non_field_errors: &'a [String],
}

/// Render a timestamp the way a `datetime-local` input expects it
pub fn format_datetime_local(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M").to_string()
}

/// Parse a `datetime-local` value; it carries no zone and is taken as UTC
pub fn parse_datetime_local(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Values shown in the post form
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostFormValues {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub is_published: bool,
    pub location: Option<i64>,
    pub category: Option<i64>,
    /// Stored image of the post being edited
    pub image: Option<String>,
}

impl PostFormValues {
    /// An empty form: published, dated now
    pub fn blank() -> Self {
        Self {
            pub_date: format_datetime_local(Utc::now()),
            is_published: true,
            ..Default::default()
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: format_datetime_local(post.pub_date),
            is_published: post.is_published,
            location: post.location_id,
            category: post.category_id,
            image: post.image.clone(),
        }
    }

    pub fn to_input(&self, pub_date: DateTime<Utc>, image: Option<String>) -> PostInput {
        PostInput {
            title: self.title.clone(),
            text: self.text.clone(),
            pub_date,
            is_published: self.is_published,
            location_id: self.location,
            category_id: self.category,
            image,
        }
    }
}

/// An image file sent with the post form
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub data: Bytes,
}

/// A decoded multipart post form
#[derive(Debug, Default)]
pub struct PostSubmission {
    pub values: PostFormValues,
    pub upload: Option<ImageUpload>,
    pub clear_image: bool,
    pub errors: FormErrors,
}

impl PostSubmission {
    /// Read every field of the form. Unreadable bodies are reported as a
    /// form error instead of failing the request.
    pub async fn read(mut multipart: Multipart) -> Self {
        let mut submission = Self::default();

        loop {
            match multipart.next_field().await {
                Ok(Some(field)) => {
                    if let Err(e) = submission.read_field(field).await {
                        tracing::debug!("Failed to read form field: {}", e);
                        submission.reject_body(&e);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Failed to read multipart body: {}", e);
                    submission.reject_body(&e);
                    break;
                }
            }
        }

        submission
    }

    async fn read_field(&mut self, field: Field<'_>) -> Result<(), MultipartError> {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "title" => self.values.title = field.text().await?,
            "text" => self.values.text = field.text().await?,
            "pub_date" => self.values.pub_date = field.text().await?,
            "is_published" => {
                field.text().await?;
                self.values.is_published = true;
            }
            "clear_image" => {
                field.text().await?;
                self.clear_image = true;
            }
            "location" => {
                let raw = field.text().await?;
                self.values.location = self.parse_choice("location", &raw);
            }
            "category" => {
                let raw = field.text().await?;
                self.values.category = self.parse_choice("category", &raw);
            }
            "image" => {
                let has_file_name = field.file_name().map_or(false, |n| !n.is_empty());
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                if has_file_name || !data.is_empty() {
                    self.upload = Some(ImageUpload { content_type, data });
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn parse_choice(&mut self, field: &str, raw: &str) -> Option<i64> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                self.errors
                    .add(field, "Select a valid choice. That choice is not one of the available choices.");
                None
            }
        }
    }

    fn reject_body(&mut self, error: &MultipartError) {
        if error.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
            self.errors.add("image", "The uploaded file is too large.");
        } else {
            self.errors
                .add_non_field("The submitted form could not be read. Please try again.");
        }
    }

    /// The publication date, recording a field error when it is missing or malformed
    pub fn pub_date(&mut self) -> Option<DateTime<Utc>> {
        if self.values.pub_date.trim().is_empty() {
            self.errors.add("pub_date", "This field is required.");
            return None;
        }
        let parsed = parse_datetime_local(&self.values.pub_date);
        if parsed.is_none() {
            self.errors.add("pub_date", "Enter a valid date/time.");
        }
        parsed
    }
}
